// SPDX-License-Identifier: Apache-2.0

use flowtree_model::{diff_documents, DiffPath, Document};
use flowtree_plugin::PluginHost;

use crate::error::EngineError;
use crate::explode::{explode, ExplodeOptions};
use crate::rebuild::{rebuild, RebuildOptions};

#[derive(Debug)]
pub struct VerifyReport {
    pub equal: bool,
    /// Minimal location of the first divergence when unequal.
    pub diff: Option<DiffPath>,
    /// Nodes the explode itself flagged as not round-tripping.
    pub unstable: Vec<String>,
}

/// Round-trip harness: explode into a scratch directory, rebuild, compare
/// fingerprints. Comparison is against the document as pre-explode plugins
/// left it, so id normalization is not reported as inequality; neither is
/// anything a formatter did to the files, since the fingerprint only sees
/// canonical JSON.
pub fn verify_round_trip(
    document: &Document,
    host: &PluginHost,
) -> Result<VerifyReport, EngineError> {
    let scratch = tempfile::tempdir()?;
    let mut exploded = document.clone();
    let report = explode(&mut exploded, scratch.path(), host, &ExplodeOptions::default())?;
    let outcome = rebuild(
        scratch.path(),
        host,
        &RebuildOptions {
            continued_from_explode: true,
            ..RebuildOptions::default()
        },
    )?;
    let diff = diff_documents(&exploded, &outcome.document);
    Ok(VerifyReport {
        equal: diff.is_none(),
        diff,
        unstable: report.unstable,
    })
}
