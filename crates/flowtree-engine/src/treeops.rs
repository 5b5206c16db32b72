// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flowtree_plugin::PluginHost;
use flowtree_model::Node;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{EngineError, EngineErrorCode};
use crate::fsutil::{ensure_within, read_limited, walk_files};
use crate::skeleton::{Skeleton, SKELETON_FILENAME};

/// Quarantine subtree for files the engines no longer account for.
pub const ORPHAN_DIR: &str = ".orphaned";

/// What to do with files whose node disappeared from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    #[default]
    Quarantine,
    Delete,
}

/// What to do with editor-added definition files the skeleton does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewFilePolicy {
    /// Infer a node and fold it into the document.
    #[default]
    Incorporate,
    Quarantine,
    Delete,
}

fn in_quarantine(tree: &Path, path: &Path) -> bool {
    path.strip_prefix(tree)
        .map(|rel| rel.components().any(|c| c.as_os_str() == ORPHAN_DIR))
        .unwrap_or(false)
}

fn is_skeleton(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(SKELETON_FILENAME)
}

/// Files on disk that no skeleton entry accounts for.
pub fn find_orphaned(tree: &Path, skeleton: &Skeleton) -> Result<Vec<PathBuf>, EngineError> {
    let expected = skeleton.expected_files(tree);
    Ok(walk_files(tree)?
        .into_iter()
        .filter(|path| !in_quarantine(tree, path))
        .filter(|path| !is_skeleton(path))
        .filter(|path| !expected.contains(path))
        .collect())
}

/// Move files under `.orphaned/`, preserving their relative layout; a
/// timestamp suffix disambiguates collisions with earlier quarantines.
pub fn quarantine(tree: &Path, files: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError> {
    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let rel = file.strip_prefix(tree).map_err(|_| {
            EngineError::new(
                EngineErrorCode::Internal,
                format!("{} is outside the tree", file.display()),
            )
        })?;
        let mut dest = tree.join(ORPHAN_DIR).join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            let epoch = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let name = dest
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("orphan")
                .to_string();
            dest = dest.with_file_name(format!("{name}.{epoch}"));
        }
        std::fs::rename(file, &dest)?;
        moved.push(dest);
    }
    if !moved.is_empty() {
        warn!(count = moved.len(), "quarantined files under {ORPHAN_DIR}/");
    }
    Ok(moved)
}

pub fn delete_files(files: &[PathBuf]) -> Result<(), EngineError> {
    for file in files {
        std::fs::remove_file(file)?;
    }
    Ok(())
}

/// Delete a definition file and every sibling sharing its stem.
pub fn delete_with_siblings(path: &Path) -> Result<(), EngineError> {
    let Some(stem) = definition_stem(path) else {
        return Ok(());
    };
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?.path();
        let matches = entry
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&format!("{stem}.")));
        if entry.is_file() && matches {
            std::fs::remove_file(entry)?;
        }
    }
    Ok(())
}

/// Stem a definition filename down to the node id: everything before the
/// final `.json`.
fn definition_stem(path: &Path) -> Option<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(".json"))
}

/// Definition files (`*.json`) with no skeleton entry and no plugin claiming
/// them as metadata: candidates for editor-added nodes.
pub fn find_new_definition_files(
    tree: &Path,
    skeleton: &Skeleton,
    host: &PluginHost,
) -> Result<Vec<PathBuf>, EngineError> {
    Ok(walk_files(tree)?
        .into_iter()
        .filter(|path| !in_quarantine(tree, path))
        .filter(|path| !is_skeleton(path))
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.ends_with(".json") && !host.is_metadata_file(name)
        })
        .filter(|path| {
            definition_stem(path).is_some_and(|stem| skeleton.entry(stem).is_none())
        })
        .collect())
}

/// Build a node from an editor-added definition file. Returns `None` when no
/// plugin can name its type and the file itself does not declare one; the
/// caller quarantines those.
pub fn node_from_new_file(
    tree: &Path,
    path: &Path,
    host: &PluginHost,
    position: (i64, i64),
    partitions: &BTreeSet<String>,
) -> Result<Option<Node>, EngineError> {
    ensure_within(tree, path)?;
    let raw = read_limited(path)?;
    let fields: Map<String, Value> = serde_json::from_slice(&raw).map_err(|e| {
        EngineError::new(
            EngineErrorCode::Config,
            format!("{} is not a JSON object: {e}", path.display()),
        )
    })?;
    let mut node = Node::new(fields);

    let stem = definition_stem(path)
        .ok_or_else(|| {
            EngineError::new(
                EngineErrorCode::Internal,
                format!("{} has no usable stem", path.display()),
            )
        })?
        .to_string();
    // The stem is the node's address on disk; a disagreeing embedded id
    // would detach the file from its own node, so the stem wins.
    if node.id().is_some_and(|id| id != stem) {
        warn!(file = %path.display(), "embedded id differs from filename, using filename");
    }
    node.insert("id", Value::String(stem.clone()));

    if node.node_type().is_none() {
        let dir = path.parent().unwrap_or(tree);
        match host.infer_node_type(dir, &stem) {
            Some(inferred) => {
                node.insert("type", Value::String(inferred));
            }
            None => {
                warn!(file = %path.display(), "no plugin could infer a type for new file");
                return Ok(None);
            }
        }
    }

    if node.z().is_none() {
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str());
        if let Some(parent) = parent.filter(|p| partitions.contains(*p)) {
            node.insert("z", Value::String(parent.to_string()));
        }
    }

    if node.get("x").is_none() {
        node.insert("x", Value::from(position.0));
    }
    if node.get("y").is_none() {
        node.insert("y", Value::from(position.1));
    }
    if node.get("wires").is_none() {
        let outputs = node
            .get("outputs")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .min(64) as usize;
        let empty: Vec<Value> = (0..outputs).map(|_| Value::Array(Vec::new())).collect();
        node.insert("wires", Value::Array(empty));
    }

    info!(id = %stem, "incorporating editor-added node");
    Ok(Some(node))
}
