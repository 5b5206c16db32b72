// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use flowtree_model::{
    fingerprint_node, is_structural_field, Document, Node,
};
use flowtree_plugin::{ClaimConflict, ClaimSet, PluginFailure, PluginHost, Stage};
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::fsutil::create_backup;
use crate::parallel::{effective_workers, map_indexed};
use crate::rebuild::rebuild_node_from_files;
use crate::skeleton::{node_directory, Skeleton, SkeletonEntry};
use crate::treeops::{self, OrphanPolicy};

#[derive(Debug, Clone, Default)]
pub struct ExplodeOptions {
    pub orphans: OrphanPolicy,
    /// `None` picks a pool from the core count; `Some(1)` forces sequential.
    pub max_workers: Option<usize>,
    /// Back up `document_path` before touching anything.
    pub backup: bool,
    /// On-disk home of the document, handed to post-explode plugins.
    pub document_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ExplodeReport {
    pub node_count: usize,
    pub pre_modified: bool,
    pub post_modified: bool,
    /// Plugins whose pre/post hooks reported a modification, most recent
    /// last. Oscillation diagnostics name these.
    pub modified_by: Vec<String>,
    /// Nodes whose on-disk form does not round-trip back to the original
    /// yet. Not errors; watch mode uploads until the stored document
    /// converges.
    pub unstable: Vec<String>,
    pub conflicts: Vec<ClaimConflict>,
    pub failures: Vec<PluginFailure>,
    pub orphaned: Vec<PathBuf>,
}

impl ExplodeReport {
    /// True when the tree no longer matches the document byte-for-byte and a
    /// rebuild/upload is needed for the stored document to converge.
    #[must_use]
    pub fn needs_push(&self) -> bool {
        self.pre_modified || self.post_modified || !self.unstable.is_empty()
    }
}

struct NodeOutcome {
    id: String,
    entry: SkeletonEntry,
    unstable: bool,
    conflicts: Vec<ClaimConflict>,
    failures: Vec<PluginFailure>,
}

/// Decompose `document` into per-node files under `tree`.
///
/// Pre-explode plugins run first and may rewrite the document in place (the
/// caller sees the rewritten form). Per-node work fans out over a bounded
/// pool past the parallel threshold; each worker owns its node's claim set,
/// writes the claimed files and the residual, and immediately rebuilds the
/// node from disk to verify it round-trips.
pub fn explode(
    document: &mut Document,
    tree: &Path,
    host: &PluginHost,
    opts: &ExplodeOptions,
) -> Result<ExplodeReport, EngineError> {
    document.validate()?;
    let mut report = ExplodeReport {
        node_count: document.len(),
        ..ExplodeReport::default()
    };

    if opts.backup {
        if let Some(path) = &opts.document_path {
            create_backup(path)?;
        }
    }

    for plugin in host.stage(Stage::PreExplode) {
        let name = plugin.spec().name;
        match plugin.pre_explode(document) {
            Ok(true) => {
                report.pre_modified = true;
                report.modified_by.push(name.to_string());
            }
            Ok(false) => {}
            Err(e) => report.failures.push(PluginFailure {
                plugin: name.to_string(),
                node: None,
                message: e.to_string(),
            }),
        }
    }
    if report.pre_modified {
        // Id rewrites may have changed the set of valid file stems.
        document.validate()?;
    }

    std::fs::create_dir_all(tree)?;
    let partitions = document.partition_container_ids();
    for container in &partitions {
        std::fs::create_dir_all(tree.join(container))?;
    }

    let workers = effective_workers(document.len(), opts.max_workers);
    debug!(nodes = document.len(), workers, "exploding nodes");
    let outcomes = map_indexed(document.nodes(), workers, |idx, node| {
        explode_one(idx, node, tree, host, &partitions)
    });

    let mut skeleton = Skeleton::new();
    skeleton.container_order = document
        .iter()
        .filter(|n| n.is_partition_container())
        .filter_map(|n| n.id().map(ToOwned::to_owned))
        .collect();
    for outcome in outcomes {
        let outcome = outcome?;
        if outcome.unstable {
            report.unstable.push(outcome.id.clone());
        }
        report.conflicts.extend(outcome.conflicts);
        report.failures.extend(outcome.failures);
        skeleton.insert(outcome.id, outcome.entry);
    }
    skeleton.save(tree)?;

    for plugin in host.stage(Stage::PostExplode) {
        let name = plugin.spec().name;
        match plugin.post_explode(tree, opts.document_path.as_deref()) {
            Ok(true) => {
                report.post_modified = true;
                report.modified_by.push(name.to_string());
            }
            Ok(false) => {}
            Err(e) => report.failures.push(PluginFailure {
                plugin: name.to_string(),
                node: None,
                message: e.to_string(),
            }),
        }
    }

    let orphans = treeops::find_orphaned(tree, &skeleton)?;
    if !orphans.is_empty() {
        match opts.orphans {
            OrphanPolicy::Quarantine => {
                treeops::quarantine(tree, &orphans)?;
            }
            OrphanPolicy::Delete => treeops::delete_files(&orphans)?,
        }
        report.orphaned = orphans;
    }

    if !report.unstable.is_empty() {
        warn!(
            count = report.unstable.len(),
            "nodes changed during round-trip and will trigger an upload"
        );
    }
    info!(
        nodes = report.node_count,
        unstable = report.unstable.len(),
        "explode complete"
    );
    Ok(report)
}

fn explode_one(
    idx: usize,
    node: &Node,
    tree: &Path,
    host: &PluginHost,
    partitions: &BTreeSet<String>,
) -> Result<NodeOutcome, EngineError> {
    // Validation already guaranteed the id; stay defensive for direct calls.
    let id = node
        .id()
        .ok_or_else(|| EngineError::new(crate::error::EngineErrorCode::Config, "node without id"))?
        .to_string();
    let node_dir = node_directory(tree, node.z(), partitions);

    let mut claims = ClaimSet::new();
    let mut conflicts = Vec::new();
    let mut failures = Vec::new();
    let mut files = Vec::new();

    for plugin in host.explode_stage() {
        let name = plugin.spec().name;
        if !plugin.handles_node(node) {
            continue;
        }
        let fields = plugin.claimed_fields(node);
        if let Err(conflict) = claims.try_claim(name, &fields) {
            conflicts.push(conflict);
            continue;
        }
        match plugin.explode_node(node, &node_dir) {
            Ok(created) => files.extend(created),
            Err(e) => failures.push(PluginFailure {
                plugin: name.to_string(),
                node: Some(id.clone()),
                message: e.to_string(),
            }),
        }
    }

    // Residual: everything that is neither structural nor claimed.
    let mut residual = Map::new();
    let mut structural = Map::new();
    for (field, value) in node.fields() {
        match field.as_str() {
            "id" | "type" | "z" => {}
            name if is_structural_field(name) => {
                structural.insert(field.clone(), value.clone());
            }
            name if claims.contains(name) => {}
            _ => {
                residual.insert(field.clone(), value.clone());
            }
        }
    }
    if !residual.is_empty() {
        let body = serde_json::to_string(&residual)
            .map_err(|e| EngineError::new(crate::error::EngineErrorCode::Internal, e.to_string()))?;
        let filename = format!("{id}.json");
        std::fs::write(node_dir.join(&filename), format!("{body}\n"))?;
        files.push(filename);
    }

    let mut entry = SkeletonEntry {
        node_type: node.node_type().unwrap_or_default().to_string(),
        z: node.z().map(ToOwned::to_owned),
        order: idx as u64,
        structural,
        files,
        stable: true,
    };

    // Immediate per-node verification: rebuild from what just hit the disk
    // and compare fingerprints.
    let unstable = match rebuild_node_from_files(&id, &node_dir, &entry, host) {
        Ok((rebuilt, _, _)) => {
            fingerprint_node(&rebuilt)? != fingerprint_node(node)?
        }
        Err(e) => {
            warn!(id = %id, "round-trip verification failed: {e}");
            true
        }
    };
    if unstable {
        debug!(id = %id, "node does not round-trip yet");
        entry.stable = false;
    }

    Ok(NodeOutcome {
        id,
        entry,
        unstable,
        conflicts,
        failures,
    })
}
