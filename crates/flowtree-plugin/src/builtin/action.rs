// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::Node;
use serde_json::{Map, Value};

use crate::builtin::non_empty_str;
use crate::jshape::{find_arrow_decl, find_object_decl, find_registration, matching_brace, to_snake_case};
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Function nodes that define a command action:
///
/// ```js
/// const actionDef = { name: "build", execute: (args) => { ... } };
/// qcmd.build = actionDef;
/// ```
///
/// The definition object (minus `execute`) goes to `<id>.def.js` and the
/// execute arrow to `<id>.execute.js`. Rebuild splices the two back together
/// and regenerates the registration line from the node name, so whitespace
/// around the original registration is normalized rather than preserved; the
/// engine's stability tracking absorbs the first-pass difference.
pub struct ActionPlugin;

struct ActionParts {
    def_object: String,
    execute: Option<String>,
}

fn parse_action(code: &str) -> Option<ActionParts> {
    find_registration(code, "qcmd", "actionDef")?;
    let open = find_object_decl(code, "actionDef")?;
    let close = matching_brace(code, open)?;
    let object = &code[open..=close];

    let Some(label) = object.find("execute:") else {
        return Some(ActionParts {
            def_object: object.to_string(),
            execute: None,
        });
    };
    let after_label = label + "execute:".len();
    let rest = object[after_label..].trim_start();
    if !rest.starts_with('(') {
        return Some(ActionParts {
            def_object: object.to_string(),
            execute: None,
        });
    }
    let params_open = object.len() - rest.len();
    let params_close = object[params_open..].find(')')? + params_open;
    let arrow = object[params_close + 1..].trim_start();
    let arrow = arrow.strip_prefix("=>")?;
    let arrow = arrow.trim_start();
    if !arrow.starts_with('{') {
        return None;
    }
    let body_open = object.len() - arrow.len();
    let body_close = matching_brace(object, body_open)?;

    let execute = object[params_open..=body_close].to_string();
    let mut before = object[..label].trim_end().to_string();
    let mut after = object[body_close + 1..].trim_start().to_string();
    if after.starts_with(',') && before.ends_with(',') {
        after.remove(0);
        after = after.trim_start().to_string();
    }
    if !before.ends_with('{') {
        before.push('\n');
    }
    Some(ActionParts {
        def_object: format!("{before}{after}"),
        execute: Some(execute),
    })
}

fn splice_execute(def_object: &str, execute: &str) -> String {
    let trimmed = def_object.trim_end();
    let Some(without_close) = trimmed.strip_suffix('}') else {
        return def_object.to_string();
    };
    let mut head = without_close.trim_end().to_string();
    if !head.ends_with('{') && !head.ends_with(',') {
        head.push(',');
    }
    format!("{head}\n  execute: {execute},\n}}")
}

impl FlowPlugin for ActionPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("action", Stage::Explode, 200)
    }

    fn handles_node(&self, node: &Node) -> bool {
        node.node_type() == Some("function")
            && non_empty_str(node, "func").is_some_and(|code| parse_action(code).is_some())
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
        let Some(parts) = non_empty_str(node, "func").and_then(parse_action) else {
            return Ok(Vec::new());
        };
        let mut created = Vec::new();

        let def_file = format!("{id}.def.js");
        std::fs::write(
            node_dir.join(&def_file),
            format!("const actionDef = {};\n", parts.def_object),
        )?;
        created.push(def_file);

        if let Some(execute) = parts.execute {
            let exec_file = format!("{id}.execute.js");
            std::fs::write(
                node_dir.join(&exec_file),
                format!("export const execute = {execute};\n"),
            )?;
            created.push(exec_file);
        }
        Ok(created)
    }

    fn rebuild_node(
        &self,
        id: &str,
        node_dir: &Path,
        node: &Node,
    ) -> PluginResult<Map<String, Value>> {
        let def_path = node_dir.join(format!("{id}.def.js"));
        if !def_path.exists() {
            return Ok(Map::new());
        }
        let def_code = std::fs::read_to_string(&def_path)?;
        let Some(open) = find_object_decl(&def_code, "actionDef") else {
            return Err(crate::error::PluginError::new(format!(
                "{id}.def.js does not declare actionDef"
            )));
        };
        let Some(close) = matching_brace(&def_code, open) else {
            return Err(crate::error::PluginError::new(format!(
                "{id}.def.js has unbalanced braces"
            )));
        };
        let mut object = def_code[open..=close].to_string();

        let exec_path = node_dir.join(format!("{id}.execute.js"));
        if exec_path.exists() {
            let exec_code = std::fs::read_to_string(&exec_path)?;
            if let Some((params, body_open)) = find_arrow_decl(&exec_code, "execute") {
                if let Some(body_close) = matching_brace(&exec_code, body_open) {
                    let body = &exec_code[body_open..=body_close];
                    object = splice_execute(&object, &format!("({params}) => {body}"));
                }
            }
        }

        let action_name = to_snake_case(node.name().unwrap_or("unnamed"));
        let func = format!("const actionDef = {object};\nqcmd.{action_name} = actionDef;");
        let mut out = Map::new();
        out.insert("func".to_string(), Value::String(func));
        Ok(out)
    }

    fn infer_node_type(&self, node_dir: &Path, id: &str) -> Option<String> {
        node_dir
            .join(format!("{id}.def.js"))
            .exists()
            .then(|| "function".to_string())
    }
}
