// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use flowtree_model::{apply_id_rewrites, Document, Node};
use serde_json::Value;
use tracing::info;

use crate::jshape::{find_object_decl, matching_brace};
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

/// Replaces opaque generated ids with readable functional ones derived from
/// node names, types, and code, then rewrites every reference in one pass.
/// Running it over an already-normalized document is a no-op, which is what
/// keeps the watch loop convergent.
pub struct NormalizeIdsPlugin;

const TYPE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("function", "func"),
    ("inject", "inject"),
    ("debug", "debug"),
    ("switch", "switch"),
    ("change", "change"),
    ("template", "tmpl"),
    ("http request", "http"),
    ("http in", "http_in"),
    ("http response", "http_out"),
    ("mqtt in", "mqtt_in"),
    ("mqtt out", "mqtt_out"),
    ("delay", "delay"),
    ("trigger", "trigger"),
    ("exec", "exec"),
    ("file", "file"),
    ("file in", "file_in"),
    ("tcp", "tcp"),
    ("udp", "udp"),
    ("websocket", "ws"),
    ("link in", "link_in"),
    ("link out", "link_out"),
    ("link call", "link_call"),
    ("comment", "comment"),
    ("subflow", "subflow"),
    ("tab", "tab"),
];

const KEYWORDS: &[&str] = &["if", "for", "while", "switch", "return"];

fn slugify(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();
    kept.split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('_')
        .to_string()
}

fn abbreviate_type(node_type: &str) -> String {
    for (full, abbr) in TYPE_ABBREVIATIONS {
        if node_type == *full {
            return (*abbr).to_string();
        }
    }
    for (full, abbr) in TYPE_ABBREVIATIONS {
        if node_type.starts_with(full) {
            return (*abbr).to_string();
        }
    }
    slugify(node_type)
}

fn ident_at_start(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    (end > 0).then(|| &text[..end])
}

/// Pull a usable name out of function code: an action definition's declared
/// name, a leading variable binding, a leading call, or a `msg.x =`
/// assignment, in that order.
fn derive_name_from_function(code: &str) -> String {
    if let Some(name) = action_definition_name(code) {
        return name;
    }
    let first_line = code
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("//"));
    let Some(line) = first_line else {
        return "unnamed".to_string();
    };

    for keyword in ["var ", "let ", "const "] {
        if let Some(rest) = line.strip_prefix(keyword) {
            if let Some(ident) = ident_at_start(rest.trim_start()) {
                return ident.to_string();
            }
        }
    }
    if let Some(paren) = line.find('(') {
        let head = line[..paren].trim_end();
        if let Some(ident) = head.rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).next()
        {
            if !ident.is_empty() && !KEYWORDS.contains(&ident) {
                return ident.to_string();
            }
        }
    }
    if let Some(rest) = line.strip_prefix("msg.") {
        if let Some(ident) = ident_at_start(rest) {
            if rest[ident.len()..].trim_start().starts_with('=') {
                return format!("set_{ident}");
            }
        }
    }
    "unnamed".to_string()
}

fn action_definition_name(code: &str) -> Option<String> {
    for decl in ["actionDef", "cmdDef"] {
        let Some(open) = find_object_decl(code, decl) else {
            continue;
        };
        let close = matching_brace(code, open)?;
        let object = &code[open..close];
        let label = object.find("name:")?;
        let rest = object[label + "name:".len()..].trim_start();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let rest = &rest[1..];
        let end = rest.find(quote)?;
        return Some(rest[..end].to_string());
    }
    None
}

fn derive_node_name(node: &Node) -> String {
    if let Some(name) = node.name().filter(|n| !n.is_empty()) {
        return slugify(name);
    }
    let node_type = node.node_type().unwrap_or("");
    if node_type == "function" {
        if let Some(func) = node.get("func").and_then(Value::as_str) {
            let derived = derive_name_from_function(func);
            if derived != "unnamed" {
                return derived;
            }
        }
    }
    if node_type == "inject" {
        if let Some(topic) = node.get("topic").and_then(Value::as_str).filter(|t| !t.is_empty()) {
            return slugify(topic);
        }
        if let Some(payload) = node.get("payload").and_then(Value::as_str) {
            if !payload.is_empty() && payload.len() < 20 {
                return slugify(payload);
            }
        }
    }
    if node_type == "switch" {
        if let Some(prop) = node.get("property").and_then(Value::as_str) {
            let prop = prop.strip_prefix("msg.").unwrap_or(prop);
            return format!("check_{}", slugify(prop));
        }
    }
    if node_type == "change" {
        if let Some(to) = node
            .get("rules")
            .and_then(Value::as_array)
            .and_then(|rules| rules.first())
            .and_then(|rule| rule.get("to"))
        {
            let text = match to {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let slug = slugify(&text);
            let clipped: String = slug.chars().take(20).collect();
            return format!("set_{clipped}");
        }
    }
    "unnamed".to_string()
}

fn generate_new_id(node: &Node, used: &mut BTreeSet<String>) -> String {
    let node_type = node.node_type().unwrap_or("unknown");
    let (prefix, base) = if node_type == "tab" {
        let label = node.get("label").and_then(Value::as_str).unwrap_or("flow");
        ("tab".to_string(), slugify(label))
    } else if node_type.starts_with("subflow") {
        let name = node
            .name()
            .or_else(|| node.get("label").and_then(Value::as_str))
            .unwrap_or("subflow");
        ("subflow".to_string(), slugify(name))
    } else {
        (abbreviate_type(node_type), derive_node_name(node))
    };

    let mut candidate = if !base.is_empty() && base != "unnamed" {
        format!("{prefix}_{base}")
    } else {
        prefix
    };
    if used.contains(&candidate) {
        let mut counter = 2_u32;
        while used.contains(&format!("{candidate}_{counter}")) {
            counter += 1;
        }
        candidate = format!("{candidate}_{counter}");
    }
    used.insert(candidate.clone());
    candidate
}

impl FlowPlugin for NormalizeIdsPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("normalize-ids", Stage::PreExplode, 100)
    }

    fn pre_explode(&self, document: &mut Document) -> PluginResult<bool> {
        let mut used = BTreeSet::new();
        let mut rewrites = BTreeMap::new();
        for node in document.iter() {
            let Some(old_id) = node.id() else {
                continue;
            };
            let new_id = generate_new_id(node, &mut used);
            if new_id != old_id {
                rewrites.insert(old_id.to_string(), new_id);
            }
        }
        if rewrites.is_empty() {
            return Ok(false);
        }
        info!(count = rewrites.len(), "normalized node ids");
        apply_id_rewrites(document, &rewrites);
        Ok(true)
    }
}
