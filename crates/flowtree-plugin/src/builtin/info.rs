// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::Node;
use serde_json::{Map, Value};

use crate::builtin::non_empty_str;
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Extracts the `info` documentation field of any node to `<id>.md`.
pub struct InfoPlugin;

impl FlowPlugin for InfoPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("info", Stage::Explode, 250)
    }

    fn handles_node(&self, node: &Node) -> bool {
        non_empty_str(node, "info").is_some()
    }

    fn claimed_fields(&self, node: &Node) -> Vec<String> {
        if non_empty_str(node, "info").is_some() {
            vec!["info".to_string()]
        } else {
            Vec::new()
        }
    }

    fn explode_node(&self, node: &Node, node_dir: &Path) -> PluginResult<Vec<String>> {
        let Some(id) = node.id() else {
            return Ok(Vec::new());
        };
        let Some(info) = non_empty_str(node, "info") else {
            return Ok(Vec::new());
        };
        let filename = format!("{id}.md");
        std::fs::write(node_dir.join(&filename), info)?;
        Ok(vec![filename])
    }

    fn rebuild_node(
        &self,
        id: &str,
        node_dir: &Path,
        _node: &Node,
    ) -> PluginResult<Map<String, Value>> {
        let mut out = Map::new();
        let path = node_dir.join(format!("{id}.md"));
        if path.exists() {
            out.insert("info".to_string(), Value::String(std::fs::read_to_string(path)?));
        }
        Ok(out)
    }
}
