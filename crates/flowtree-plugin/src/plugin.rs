// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::{Document, Node};
use serde_json::{Map, Value};

use crate::error::PluginError;
use crate::stage::Stage;

pub type PluginResult<T> = Result<T, PluginError>;

/// Self-description of a plugin. Ordering across the host is
/// `(priority, name)`, lowest priority first, names breaking ties
/// lexicographically for determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginSpec {
    pub name: &'static str,
    pub stage: Stage,
    pub priority: i32,
}

impl PluginSpec {
    #[must_use]
    pub const fn new(name: &'static str, stage: Stage, priority: i32) -> Self {
        Self {
            name,
            stage,
            priority,
        }
    }
}

/// A transformation plugin. Every hook defaults to a no-op so a plugin only
/// implements the stage it declares in its spec.
///
/// Explode-stage contract:
/// - `claimed_fields` must name exactly the fields `explode_node` will
///   materialize for this node; fields present but empty are left to the
///   residual so the round trip stays exact.
/// - `explode_node` writes sibling files next to the residual and returns the
///   filenames it created, relative to `node_dir`.
/// - `rebuild_node` reads those files back and returns the fields to merge;
///   the host arbitrates per-field, first claim wins.
pub trait FlowPlugin: Send + Sync {
    fn spec(&self) -> PluginSpec;

    fn handles_node(&self, _node: &Node) -> bool {
        false
    }

    fn claimed_fields(&self, _node: &Node) -> Vec<String> {
        Vec::new()
    }

    fn explode_node(&self, _node: &Node, _node_dir: &Path) -> PluginResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn rebuild_node(
        &self,
        _id: &str,
        _node_dir: &Path,
        _node: &Node,
    ) -> PluginResult<Map<String, Value>> {
        Ok(Map::new())
    }

    /// Inspect a node directory the skeleton does not know about and name its
    /// type, or decline with `None`.
    fn infer_node_type(&self, _node_dir: &Path, _id: &str) -> Option<String> {
        None
    }

    /// True when `filename` is one of this plugin's sibling files rather than
    /// a primary node definition.
    fn is_metadata_file(&self, _filename: &str) -> bool {
        false
    }

    fn pre_explode(&self, _document: &mut Document) -> PluginResult<bool> {
        Ok(false)
    }

    fn post_explode(&self, _tree: &Path, _document_path: Option<&Path>) -> PluginResult<bool> {
        Ok(false)
    }

    fn pre_rebuild(&self, _tree: &Path, _continued_from_explode: bool) -> PluginResult<bool> {
        Ok(false)
    }

    fn post_rebuild(&self, _document_path: &Path) -> PluginResult<bool> {
        Ok(false)
    }
}
