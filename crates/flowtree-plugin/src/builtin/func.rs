// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::Node;
use serde_json::{Map, Value};

use crate::builtin::non_empty_str;
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Raw extraction of function-node code to `<id>.js` (plus
/// `<id>.initialize.js` / `<id>.finalize.js`), byte for byte. Fallback for
/// setups that disable `wrap-func`; when both are enabled the claim protocol
/// leaves this one idle.
pub struct FuncPlugin;

impl FlowPlugin for FuncPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("func", Stage::Explode, 230)
    }

    fn handles_node(&self, node: &Node) -> bool {
        node.node_type() == Some("function") && non_empty_str(node, "func").is_some()
    }

    fn claimed_fields(&self, node: &Node) -> Vec<String> {
        ["func", "initialize", "finalize"]
            .iter()
            .filter(|f| non_empty_str(node, f).is_some())
            .map(ToString::to_string)
            .collect()
    }

    fn explode_node(&self, node: &Node, node_dir: &Path) -> PluginResult<Vec<String>> {
        let Some(id) = node.id() else {
            return Ok(Vec::new());
        };
        let mut created = Vec::new();
        for (field, filename) in [
            ("func", format!("{id}.js")),
            ("initialize", format!("{id}.initialize.js")),
            ("finalize", format!("{id}.finalize.js")),
        ] {
            if let Some(code) = non_empty_str(node, field) {
                std::fs::write(node_dir.join(&filename), code)?;
                created.push(filename);
            }
        }
        Ok(created)
    }

    fn rebuild_node(
        &self,
        id: &str,
        node_dir: &Path,
        _node: &Node,
    ) -> PluginResult<Map<String, Value>> {
        let mut out = Map::new();
        for (field, filename) in [
            ("func", format!("{id}.js")),
            ("initialize", format!("{id}.initialize.js")),
            ("finalize", format!("{id}.finalize.js")),
        ] {
            let path = node_dir.join(filename);
            if path.exists() {
                out.insert(field.to_string(), Value::String(std::fs::read_to_string(path)?));
            }
        }
        Ok(out)
    }

    fn infer_node_type(&self, node_dir: &Path, id: &str) -> Option<String> {
        node_dir
            .join(format!("{id}.js"))
            .exists()
            .then(|| "function".to_string())
    }
}
