// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineErrorCode};
use crate::fsutil::atomic_write;

pub const SKELETON_FILENAME: &str = ".flow-skeleton.json";
pub const SKELETON_VERSION: u32 = 1;

/// Structural record for one node: enough to put rebuilt content back at the
/// right place with the right wiring, and nothing more. Content never lives
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonEntry {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<String>,
    /// Index of the node in the original document. Induces sibling order
    /// within each container and reproduces interleaved layouts exactly.
    pub order: u64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub structural: Map<String, Value>,
    /// Files the explode wrote for this node (residual and claimed), used
    /// for exact orphan accounting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// False when the immediate post-explode verification found the node
    /// does not round-trip yet.
    #[serde(default = "default_stable")]
    pub stable: bool,
}

const fn default_stable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Skeleton {
    pub version: u32,
    /// Partition containers (tabs/subflows) in document order.
    pub container_order: Vec<String>,
    pub nodes: BTreeMap<String, SkeletonEntry>,
}

impl Skeleton {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: SKELETON_VERSION,
            container_order: Vec::new(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn load(tree: &Path) -> Result<Self, EngineError> {
        let path = tree.join(SKELETON_FILENAME);
        if !path.exists() {
            return Err(EngineError::new(
                EngineErrorCode::SkeletonMissing,
                format!("no {SKELETON_FILENAME} under {}", tree.display()),
            ));
        }
        let raw = std::fs::read(&path)?;
        let skeleton: Self = serde_json::from_slice(&raw).map_err(|e| {
            EngineError::new(
                EngineErrorCode::Config,
                format!("malformed {SKELETON_FILENAME}: {e}"),
            )
        })?;
        if skeleton.version != SKELETON_VERSION {
            return Err(EngineError::new(
                EngineErrorCode::Config,
                format!("unsupported skeleton version {}", skeleton.version),
            ));
        }
        Ok(skeleton)
    }

    pub fn save(&self, tree: &Path) -> Result<(), EngineError> {
        let bytes = serde_json::to_string(self)
            .map_err(|e| EngineError::new(EngineErrorCode::Internal, e.to_string()))?;
        atomic_write(&tree.join(SKELETON_FILENAME), format!("{bytes}\n").as_bytes())
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&SkeletonEntry> {
        self.nodes.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: SkeletonEntry) {
        self.nodes.insert(id.into(), entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<SkeletonEntry> {
        self.nodes.remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn container_order(&self) -> &[String] {
        &self.container_order
    }

    #[must_use]
    pub fn partition_ids(&self) -> BTreeSet<String> {
        self.container_order.iter().cloned().collect()
    }

    /// Entries in a container (or at the root for `None`), in sibling order.
    #[must_use]
    pub fn nodes_in(&self, container: Option<&str>) -> Vec<(&str, &SkeletonEntry)> {
        let partitions = self.partition_ids();
        let mut entries: Vec<(&str, &SkeletonEntry)> = self
            .nodes
            .iter()
            .filter(|(_, entry)| {
                let effective = entry
                    .z
                    .as_deref()
                    .filter(|z| partitions.contains(*z));
                effective == container
            })
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();
        entries.sort_by_key(|(_, entry)| entry.order);
        entries
    }

    /// All entries in document order.
    #[must_use]
    pub fn ordered(&self) -> Vec<(&str, &SkeletonEntry)> {
        let mut entries: Vec<(&str, &SkeletonEntry)> = self
            .nodes
            .iter()
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();
        entries.sort_by(|a, b| a.1.order.cmp(&b.1.order).then(a.0.cmp(b.0)));
        entries
    }

    #[must_use]
    pub fn next_order(&self) -> u64 {
        self.nodes
            .values()
            .map(|entry| entry.order + 1)
            .max()
            .unwrap_or(0)
    }

    /// Directory the entry's files live in.
    #[must_use]
    pub fn directory_for(&self, tree: &Path, entry: &SkeletonEntry) -> PathBuf {
        node_directory(tree, entry.z.as_deref(), &self.partition_ids())
    }

    /// Every file any entry accounts for, as absolute paths.
    #[must_use]
    pub fn expected_files(&self, tree: &Path) -> BTreeSet<PathBuf> {
        let mut expected = BTreeSet::new();
        for entry in self.nodes.values() {
            let dir = self.directory_for(tree, entry);
            for file in &entry.files {
                expected.insert(dir.join(file));
            }
        }
        expected
    }
}

/// Where a node's files belong: under its container's directory when the
/// container partitions the tree, at the root otherwise (config nodes, and
/// nodes whose `z` names a container that does not exist).
#[must_use]
pub fn node_directory(tree: &Path, z: Option<&str>, partitions: &BTreeSet<String>) -> PathBuf {
    match z {
        Some(z) if partitions.contains(z) => tree.join(z),
        _ => tree.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(node_type: &str, z: Option<&str>, order: u64) -> SkeletonEntry {
        SkeletonEntry {
            node_type: node_type.to_string(),
            z: z.map(ToOwned::to_owned),
            order,
            structural: Map::new(),
            files: Vec::new(),
            stable: true,
        }
    }

    fn sample() -> Skeleton {
        let mut skeleton = Skeleton::new();
        skeleton.container_order = vec!["tab_a".to_string()];
        skeleton.insert("tab_a", entry("tab", None, 0));
        skeleton.insert("n2", entry("debug", Some("tab_a"), 2));
        skeleton.insert("n1", entry("function", Some("tab_a"), 1));
        skeleton.insert("cfg", entry("mqtt-broker", None, 3));
        skeleton
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut skeleton = sample();
        skeleton
            .nodes
            .get_mut("n1")
            .expect("n1")
            .structural
            .insert("wires".to_string(), json!([["n2"]]));
        skeleton.save(dir.path()).expect("save");

        let loaded = Skeleton::load(dir.path()).expect("load");
        assert_eq!(loaded, skeleton);
    }

    #[test]
    fn load_without_file_is_skeleton_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Skeleton::load(dir.path()).expect_err("must fail");
        assert_eq!(err.code.as_str(), "skeleton_missing");
    }

    #[test]
    fn sibling_order_is_induced_from_document_order() {
        let skeleton = sample();
        let in_tab: Vec<&str> = skeleton
            .nodes_in(Some("tab_a"))
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(in_tab, vec!["n1", "n2"]);
        let at_root: Vec<&str> = skeleton
            .nodes_in(None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(at_root, vec!["tab_a", "cfg"]);
    }

    #[test]
    fn directory_resolution_falls_back_to_root() {
        let partitions = BTreeSet::from(["tab_a".to_string()]);
        let tree = Path::new("/tree");
        assert_eq!(
            node_directory(tree, Some("tab_a"), &partitions),
            PathBuf::from("/tree/tab_a")
        );
        assert_eq!(
            node_directory(tree, Some("missing"), &partitions),
            PathBuf::from("/tree")
        );
        assert_eq!(node_directory(tree, None, &partitions), PathBuf::from("/tree"));
    }

    #[test]
    fn next_order_appends_after_the_last_node() {
        assert_eq!(sample().next_order(), 4);
        assert_eq!(Skeleton::new().next_order(), 0);
    }
}
