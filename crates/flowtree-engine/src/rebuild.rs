// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use flowtree_model::{Document, Node};
use flowtree_plugin::{ClaimConflict, ClaimSet, PluginFailure, PluginHost, Stage};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineErrorCode};
use crate::fsutil::{atomic_write, create_backup, read_limited};
use crate::parallel::{effective_workers, map_indexed};
use crate::skeleton::{Skeleton, SkeletonEntry};
use crate::treeops::{self, NewFilePolicy};

#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// True when this rebuild directly follows an explode of the same tree,
    /// letting pre-rebuild plugins skip redundant work.
    pub continued_from_explode: bool,
    /// Drop skeleton nodes whose files vanished instead of failing.
    pub tolerant: bool,
    pub new_files: NewFilePolicy,
    /// Where to write the document; post-rebuild plugins only run when set.
    pub document_path: Option<PathBuf>,
    pub backup: bool,
    pub max_workers: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RebuildOutcome {
    pub document: Document,
    /// Editor-added nodes folded into the document.
    pub added: Vec<String>,
    /// Skeleton nodes dropped under the tolerant flag.
    pub dropped: Vec<String>,
    pub quarantined: Vec<PathBuf>,
    pub conflicts: Vec<ClaimConflict>,
    pub failures: Vec<PluginFailure>,
}

/// Reassemble the document from `tree`.
///
/// The skeleton is authoritative for membership, ordering, and wiring;
/// per-node content comes from the residuals and the plugins' claimed files.
/// Given an identical tree and plugin set the output is byte-identical.
pub fn rebuild(
    tree: &Path,
    host: &PluginHost,
    opts: &RebuildOptions,
) -> Result<RebuildOutcome, EngineError> {
    let mut skeleton = Skeleton::load(tree)?;
    let mut outcome = RebuildOutcome::default();

    reconcile_new_files(tree, &mut skeleton, host, opts, &mut outcome)?;

    for plugin in host.stage(Stage::PreRebuild) {
        if let Err(e) = plugin.pre_rebuild(tree, opts.continued_from_explode) {
            outcome.failures.push(PluginFailure {
                plugin: plugin.spec().name.to_string(),
                node: None,
                message: e.to_string(),
            });
        }
    }

    let ordered: Vec<(String, SkeletonEntry)> = skeleton
        .ordered()
        .into_iter()
        .map(|(id, entry)| (id.to_string(), entry.clone()))
        .collect();

    let workers = effective_workers(ordered.len(), opts.max_workers);
    debug!(nodes = ordered.len(), workers, "rebuilding nodes");
    let rebuilt = map_indexed(&ordered, workers, |_, (id, entry)| {
        rebuild_entry(id, entry, tree, &skeleton, host, opts.tolerant)
    });

    let mut nodes = Vec::with_capacity(ordered.len());
    for result in rebuilt {
        match result? {
            EntryResult::Node(node, conflicts, failures) => {
                outcome.conflicts.extend(conflicts);
                outcome.failures.extend(failures);
                nodes.push(node);
            }
            EntryResult::Dropped(id) => {
                warn!(id = %id, "skeleton node has no files on disk, dropped");
                outcome.dropped.push(id);
            }
        }
    }
    outcome.document = Document::new(nodes);
    outcome.document.validate()?;

    if let Some(path) = &opts.document_path {
        if opts.backup {
            create_backup(path)?;
        }
        let body = outcome.document.to_compact_json()?;
        atomic_write(path, format!("{body}\n").as_bytes())?;

        for plugin in host.stage(Stage::PostRebuild) {
            if let Err(e) = plugin.post_rebuild(path) {
                outcome.failures.push(PluginFailure {
                    plugin: plugin.spec().name.to_string(),
                    node: None,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        nodes = outcome.document.len(),
        added = outcome.added.len(),
        dropped = outcome.dropped.len(),
        "rebuild complete"
    );
    Ok(outcome)
}

enum EntryResult {
    Node(Node, Vec<ClaimConflict>, Vec<PluginFailure>),
    Dropped(String),
}

fn rebuild_entry(
    id: &str,
    entry: &SkeletonEntry,
    tree: &Path,
    skeleton: &Skeleton,
    host: &PluginHost,
    tolerant: bool,
) -> Result<EntryResult, EngineError> {
    let node_dir = skeleton.directory_for(tree, entry);
    if !entry.files.is_empty() {
        let any_present = entry.files.iter().any(|f| node_dir.join(f).exists());
        if !any_present {
            if tolerant {
                return Ok(EntryResult::Dropped(id.to_string()));
            }
            return Err(EngineError::new(
                EngineErrorCode::NodeFilesMissing,
                format!(
                    "node {id} lost all of its files under {}",
                    node_dir.display()
                ),
            ));
        }
    }
    let (node, conflicts, failures) = rebuild_node_from_files(id, &node_dir, entry, host)?;
    Ok(EntryResult::Node(node, conflicts, failures))
}

/// Rebuild one node from its directory: residual first, then the plugins'
/// claimed fields (first claim wins per field), then the skeleton's
/// structural fields on top. Shared with the explode engine's immediate
/// verification pass.
pub fn rebuild_node_from_files(
    id: &str,
    node_dir: &Path,
    entry: &SkeletonEntry,
    host: &PluginHost,
) -> Result<(Node, Vec<ClaimConflict>, Vec<PluginFailure>), EngineError> {
    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::String(id.to_string()));
    fields.insert("type".to_string(), Value::String(entry.node_type.clone()));
    if let Some(z) = &entry.z {
        fields.insert("z".to_string(), Value::String(z.clone()));
    }
    for (name, value) in &entry.structural {
        fields.insert(name.clone(), value.clone());
    }

    let residual_path = node_dir.join(format!("{id}.json"));
    if residual_path.exists() {
        let raw = read_limited(&residual_path)?;
        let residual: Map<String, Value> = serde_json::from_slice(&raw).map_err(|e| {
            EngineError::new(
                EngineErrorCode::Config,
                format!("{} is not a JSON object: {e}", residual_path.display()),
            )
        })?;
        for (name, value) in residual {
            fields.insert(name, value);
        }
    }

    let mut node = Node::new(fields);
    let mut claims = ClaimSet::new();
    let mut conflicts = Vec::new();
    let mut failures = Vec::new();

    for plugin in host.explode_stage() {
        let name = plugin.spec().name;
        let data = match plugin.rebuild_node(id, node_dir, &node) {
            Ok(data) => data,
            Err(e) => {
                failures.push(PluginFailure {
                    plugin: name.to_string(),
                    node: Some(id.to_string()),
                    message: e.to_string(),
                });
                continue;
            }
        };
        for (field, value) in data {
            match claims.try_claim_one(name, &field) {
                Ok(()) => {
                    node.insert(field, value);
                }
                Err(conflict) => conflicts.push(conflict),
            }
        }
    }

    // Structural truth always comes from the skeleton, even if a plugin
    // touched an overlapping field.
    node.insert("id", Value::String(id.to_string()));
    node.insert("type", Value::String(entry.node_type.clone()));
    if let Some(z) = &entry.z {
        node.insert("z", Value::String(z.clone()));
    }
    for (name, value) in &entry.structural {
        node.insert(name.clone(), value.clone());
    }

    Ok((node, conflicts, failures))
}

fn reconcile_new_files(
    tree: &Path,
    skeleton: &mut Skeleton,
    host: &PluginHost,
    opts: &RebuildOptions,
    outcome: &mut RebuildOutcome,
) -> Result<(), EngineError> {
    let new_files = treeops::find_new_definition_files(tree, skeleton, host)?;
    if new_files.is_empty() {
        return Ok(());
    }
    match opts.new_files {
        NewFilePolicy::Delete => {
            for file in &new_files {
                treeops::delete_with_siblings(file)?;
            }
            Ok(())
        }
        NewFilePolicy::Quarantine => {
            outcome.quarantined = treeops::quarantine(tree, &new_files)?;
            Ok(())
        }
        NewFilePolicy::Incorporate => {
            let partitions = skeleton.partition_ids();
            let mut next_order = skeleton.next_order();
            let mut position = (100_i64, 100_i64);
            let mut unidentified = Vec::new();
            for file in &new_files {
                match treeops::node_from_new_file(tree, file, host, position, &partitions)? {
                    Some(node) => {
                        let Some(id) = node.id().map(ToOwned::to_owned) else {
                            unidentified.push(file.clone());
                            continue;
                        };
                        let mut structural = Map::new();
                        for (name, value) in node.fields() {
                            if flowtree_model::is_structural_field(name) {
                                structural.insert(name.clone(), value.clone());
                            }
                        }
                        let filename = file
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or_default()
                            .to_string();
                        skeleton.insert(
                            id.clone(),
                            SkeletonEntry {
                                node_type: node.node_type().unwrap_or_default().to_string(),
                                z: node.z().map(ToOwned::to_owned),
                                order: next_order,
                                structural,
                                files: vec![filename],
                                stable: true,
                            },
                        );
                        next_order += 1;
                        position.1 += 50;
                        outcome.added.push(id);
                    }
                    None => unidentified.push(file.clone()),
                }
            }
            if !unidentified.is_empty() {
                outcome
                    .quarantined
                    .extend(treeops::quarantine(tree, &unidentified)?);
            }
            Ok(())
        }
    }
}
