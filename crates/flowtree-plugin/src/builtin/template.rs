// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use flowtree_model::Node;
use serde_json::{Map, Value};

use crate::builtin::non_empty_str;
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Format name in a core `template` node to the extension its content should
/// carry on disk.
const FORMAT_EXTENSIONS: &[(&str, &str)] = &[
    ("handlebars", ".mustache"),
    ("html", ".html"),
    ("json", ".json"),
    ("yaml", ".yaml"),
    ("javascript", ".js"),
    ("css", ".css"),
    ("markdown", ".md"),
    ("python", ".py"),
    ("sql", ".sql"),
    ("c_cpp", ".cpp"),
    ("java", ".java"),
    ("text", ".txt"),
];

const TEMPLATE_TYPES: &[&str] = &["ui_template", "ui-template", "template"];

/// Extracts template bodies to editor-friendly files: dashboard v2 templates
/// become `.vue` components, dashboard v1 templates `.ui-template.html`, and
/// core templates `.template.<ext>` by declared format.
pub struct TemplatePlugin;

fn extension_for(node: &Node) -> String {
    match node.node_type() {
        Some("ui_template") => ".vue".to_string(),
        Some("ui-template") => ".ui-template.html".to_string(),
        Some("template") => {
            let format = node
                .get("format")
                .and_then(Value::as_str)
                .unwrap_or("handlebars");
            let ext = FORMAT_EXTENSIONS
                .iter()
                .find(|(name, _)| *name == format)
                .map_or(".txt", |(_, ext)| *ext);
            format!(".template{ext}")
        }
        _ => ".template.txt".to_string(),
    }
}

impl FlowPlugin for TemplatePlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("template", Stage::Explode, 240)
    }

    fn handles_node(&self, node: &Node) -> bool {
        node.node_type().is_some_and(|t| TEMPLATE_TYPES.contains(&t))
            && non_empty_str(node, "template").is_some()
    }

    fn claimed_fields(&self, node: &Node) -> Vec<String> {
        if self.handles_node(node) {
            vec!["template".to_string()]
        } else {
            Vec::new()
        }
    }

    fn explode_node(&self, node: &Node, node_dir: &Path) -> PluginResult<Vec<String>> {
        let Some(id) = node.id() else {
            return Ok(Vec::new());
        };
        let Some(content) = non_empty_str(node, "template") else {
            return Ok(Vec::new());
        };
        let filename = format!("{id}{}", extension_for(node));
        std::fs::write(node_dir.join(&filename), content)?;
        Ok(vec![filename])
    }

    fn rebuild_node(
        &self,
        id: &str,
        node_dir: &Path,
        _node: &Node,
    ) -> PluginResult<Map<String, Value>> {
        let mut out = Map::new();
        if let Some(path) = find_template_file(node_dir, id)? {
            out.insert(
                "template".to_string(),
                Value::String(std::fs::read_to_string(path)?),
            );
        }
        Ok(out)
    }

    fn infer_node_type(&self, node_dir: &Path, id: &str) -> Option<String> {
        if node_dir.join(format!("{id}.vue")).exists() {
            return Some("ui_template".to_string());
        }
        if node_dir.join(format!("{id}.ui-template.html")).exists() {
            return Some("ui-template".to_string());
        }
        match core_template_file(node_dir, id) {
            Ok(Some(_)) => Some("template".to_string()),
            _ => None,
        }
    }

    fn is_metadata_file(&self, filename: &str) -> bool {
        filename.ends_with(".vue")
            || filename.ends_with(".ui-template.html")
            || filename.contains(".template.")
    }
}

fn find_template_file(
    node_dir: &Path,
    id: &str,
) -> Result<Option<std::path::PathBuf>, crate::error::PluginError> {
    let vue = node_dir.join(format!("{id}.vue"));
    if vue.exists() {
        return Ok(Some(vue));
    }
    let angular = node_dir.join(format!("{id}.ui-template.html"));
    if angular.exists() {
        return Ok(Some(angular));
    }
    core_template_file(node_dir, id)
}

fn core_template_file(
    node_dir: &Path,
    id: &str,
) -> Result<Option<std::path::PathBuf>, crate::error::PluginError> {
    let prefix = format!("{id}.template.");
    let mut matches: Vec<_> = std::fs::read_dir(node_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}
