// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::Node;
use serde_json::{Map, Value};

use crate::builtin::non_empty_str;
use crate::jshape::{
    dedent, extract_exported_function, find_arrow_decl, find_registration, matching_brace,
};
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Function nodes that publish a shared helper:
///
/// ```js
/// const globalDef = (a, b) => { return a + b; };
/// gfunc.sum = globalDef;
/// ```
///
/// Written out as a plain exported function in `<id>.function.js`; rebuild
/// regenerates the arrow declaration and registration from the exported name.
pub struct GlobalFunctionPlugin;

struct GlobalFn {
    name: String,
    params: String,
    body: String,
}

fn parse_global(code: &str) -> Option<GlobalFn> {
    let name = find_registration(code, "gfunc", "globalDef")?;
    let (params, open) = find_arrow_decl(code, "globalDef")?;
    let close = matching_brace(code, open)?;
    let raw = &code[open + 1..close];
    let raw = raw.strip_prefix('\n').unwrap_or(raw);
    let raw = raw.strip_suffix('\n').unwrap_or(raw);
    Some(GlobalFn {
        name,
        params,
        body: dedent(raw),
    })
}

impl FlowPlugin for GlobalFunctionPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("global-function", Stage::Explode, 210)
    }

    fn handles_node(&self, node: &Node) -> bool {
        node.node_type() == Some("function")
            && non_empty_str(node, "func").is_some_and(|code| parse_global(code).is_some())
    }

    fn claimed_fields(&self, node: &Node) -> Vec<String> {
        if self.handles_node(node) {
            vec!["func".to_string()]
        } else {
            Vec::new()
        }
    }

    fn explode_node(&self, node: &Node, node_dir: &Path) -> PluginResult<Vec<String>> {
        let Some(id) = node.id() else {
            return Ok(Vec::new());
        };
        let Some(global) = non_empty_str(node, "func").and_then(parse_global) else {
            return Ok(Vec::new());
        };
        let filename = format!("{id}.function.js");
        let contents = format!(
            "export function {}({}) {{\n{}\n}}\n",
            global.name, global.params, global.body
        );
        std::fs::write(node_dir.join(&filename), contents)?;
        Ok(vec![filename])
    }

    fn rebuild_node(
        &self,
        id: &str,
        node_dir: &Path,
        _node: &Node,
    ) -> PluginResult<Map<String, Value>> {
        let path = node_dir.join(format!("{id}.function.js"));
        if !path.exists() {
            return Ok(Map::new());
        }
        let code = std::fs::read_to_string(&path)?;
        let Some((name, params, body)) = extract_exported_function(&code) else {
            return Err(crate::error::PluginError::new(format!(
                "{id}.function.js does not export a named function"
            )));
        };
        let func = format!(
            "const globalDef = ({params}) => {{\n{body}\n}};\ngfunc.{name} = globalDef;"
        );
        let mut out = Map::new();
        out.insert("func".to_string(), Value::String(func));
        Ok(out)
    }

    fn infer_node_type(&self, node_dir: &Path, id: &str) -> Option<String> {
        node_dir
            .join(format!("{id}.function.js"))
            .exists()
            .then(|| "function".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: Value) -> Node {
        match value {
            Value::Object(map) => Node::new(map),
            other => panic!("expected object, got {other}"),
        }
    }

    const GLOBAL: &str =
        "const globalDef = (a, b) => {\n  return a + b;\n};\ngfunc.sum = globalDef;";

    #[test]
    fn round_trip_is_a_fixpoint_after_first_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plugin = GlobalFunctionPlugin;
        let n = node(json!({"id": "g1", "type": "function", "name": "sum", "func": GLOBAL}));
        assert!(plugin.handles_node(&n));
        let created = plugin.explode_node(&n, dir.path()).expect("explode");
        assert_eq!(created, vec!["g1.function.js"]);

        let rebuilt = plugin.rebuild_node("g1", dir.path(), &n).expect("rebuild");
        let func = rebuilt.get("func").and_then(Value::as_str).expect("func");
        assert!(func.contains("gfunc.sum = globalDef;"));

        // A second explode/rebuild of the regenerated func must not drift.
        let n2 = node(json!({"id": "g1", "type": "function", "name": "sum", "func": func}));
        plugin.explode_node(&n2, dir.path()).expect("re-explode");
        let again = plugin.rebuild_node("g1", dir.path(), &n2).expect("re-rebuild");
        assert_eq!(again.get("func"), rebuilt.get("func"));
    }

    #[test]
    fn plain_functions_are_declined() {
        let plugin = GlobalFunctionPlugin;
        let n = node(json!({"id": "f", "type": "function", "func": "return msg;"}));
        assert!(!plugin.handles_node(&n));
        assert!(plugin.claimed_fields(&n).is_empty());
    }
}
