// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::Node;
use serde_json::{Map, Value};

use crate::builtin::non_empty_str;
use crate::jshape::{extract_exported_body, to_camel_case};
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Wraps function-node code in exported declarations so it is runnable and
/// testable outside the flow runtime:
///
/// ```js
/// export default function doubleIt(msg, node, context, flow, global, env, RED) {
///   // original body
/// }
/// ```
///
/// `func` goes to `<id>.wrapped.js`, `initialize` and `finalize` (when
/// present) to `<id>.initialize.js` / `<id>.finalize.js`. Rebuild unwraps by
/// brace matching and strips any indentation a formatter added.
pub struct WrapFuncPlugin;

const MSG_PARAMS: &str = "msg, node, context, flow, global, env, RED";
const LIFECYCLE_PARAMS: &str = "node, context, flow, global, env, RED";

fn wrap(name: &str, params: &str, body: &str) -> String {
    format!("export default function {name}({params}) {{\n{body}\n}}\n")
}

impl FlowPlugin for WrapFuncPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("wrap-func", Stage::Explode, 220)
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
        let func_name = to_camel_case(node.name().unwrap_or("Unnamed"));
        let mut created = Vec::new();

        if let Some(func) = non_empty_str(node, "func") {
            let filename = format!("{id}.wrapped.js");
            std::fs::write(node_dir.join(&filename), wrap(&func_name, MSG_PARAMS, func))?;
            created.push(filename);
        }
        if let Some(code) = non_empty_str(node, "initialize") {
            let filename = format!("{id}.initialize.js");
            let wrapped = wrap(&format!("{func_name}_initialize"), LIFECYCLE_PARAMS, code);
            std::fs::write(node_dir.join(&filename), wrapped)?;
            created.push(filename);
        }
        if let Some(code) = non_empty_str(node, "finalize") {
            let filename = format!("{id}.finalize.js");
            let wrapped = wrap(&format!("{func_name}_finalize"), LIFECYCLE_PARAMS, code);
            std::fs::write(node_dir.join(&filename), wrapped)?;
            created.push(filename);
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
        for (field, suffix) in [
            ("func", "wrapped"),
            ("initialize", "initialize"),
            ("finalize", "finalize"),
        ] {
            let path = node_dir.join(format!("{id}.{suffix}.js"));
            if !path.exists() {
                continue;
            }
            let code = std::fs::read_to_string(&path)?;
            if let Some(body) = extract_exported_body(&code) {
                out.insert(field.to_string(), Value::String(body));
            }
        }
        Ok(out)
    }

    fn infer_node_type(&self, node_dir: &Path, id: &str) -> Option<String> {
        node_dir
            .join(format!("{id}.wrapped.js"))
            .exists()
            .then(|| "function".to_string())
    }
}
