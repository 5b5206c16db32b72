// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde_json::Value;

use crate::document::Document;

/// Apply a collected id-rewrite table to every id-bearing field in one pass.
/// Ids stay opaque strings; nothing is resolved to pointers.
pub fn apply_id_rewrites(document: &mut Document, rewrites: &BTreeMap<String, String>) {
    if rewrites.is_empty() {
        return;
    }
    for node in document.nodes_mut() {
        let is_subflow = node
            .node_type()
            .is_some_and(|t| t == "subflow" || t.starts_with("subflow:"));

        if let Some(id) = node.id().and_then(|id| rewrites.get(id)).cloned() {
            node.insert("id", Value::String(id));
        }
        if let Some(z) = node.z().and_then(|z| rewrites.get(z)).cloned() {
            node.insert("z", Value::String(z));
        }
        if let Some(Value::Array(outputs)) = node.fields_mut().get_mut("wires") {
            for port in outputs.iter_mut() {
                rewrite_string_array(port, rewrites);
            }
        }
        for field in ["links", "scope", "nodes"] {
            if let Some(value) = node.fields_mut().get_mut(field) {
                rewrite_string_array(value, rewrites);
            }
        }
        if is_subflow {
            for field in ["in", "out"] {
                if let Some(Value::Array(ports)) = node.fields_mut().get_mut(field) {
                    for port in ports.iter_mut() {
                        rewrite_port_wires(port, rewrites);
                    }
                }
            }
            if let Some(Value::Array(env)) = node.fields_mut().get_mut("env") {
                for entry in env.iter_mut() {
                    if let Some(Value::String(value)) =
                        entry.as_object_mut().and_then(|o| o.get_mut("value"))
                    {
                        if let Some(replacement) = rewrites.get(value.as_str()) {
                            *value = replacement.clone();
                        }
                    }
                }
            }
        }
    }
}

fn rewrite_string_array(value: &mut Value, rewrites: &BTreeMap<String, String>) {
    if let Value::Array(items) = value {
        for item in items.iter_mut() {
            if let Value::String(id) = item {
                if let Some(replacement) = rewrites.get(id.as_str()) {
                    *id = replacement.clone();
                }
            }
        }
    }
}

fn rewrite_port_wires(port: &mut Value, rewrites: &BTreeMap<String, String>) {
    let Some(Value::Array(wires)) = port.as_object_mut().and_then(|o| o.get_mut("wires")) else {
        return;
    };
    for wire in wires.iter_mut() {
        if let Some(Value::String(id)) = wire.as_object_mut().and_then(|o| o.get_mut("id")) {
            if let Some(replacement) = rewrites.get(id.as_str()) {
                *id = replacement.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::document_from_value;
    use serde_json::json;

    #[test]
    fn rewrites_every_id_bearing_field() {
        let mut doc = document_from_value(json!([
            {"id": "old_tab", "type": "tab"},
            {
                "id": "old_fn", "type": "function", "z": "old_tab",
                "wires": [["old_link"], []],
                "scope": ["old_fn"]
            },
            {"id": "old_link", "type": "link out", "z": "old_tab", "links": ["old_fn"]},
            {"id": "g1", "type": "group", "z": "old_tab", "nodes": ["old_fn", "old_link"]},
            {
                "id": "sf", "type": "subflow",
                "in": [{"wires": [{"id": "old_fn"}]}],
                "out": [{"wires": [{"id": "old_link", "port": 0}]}],
                "env": [{"name": "TARGET", "value": "old_fn"}]
            }
        ]))
        .expect("doc");

        let rewrites = BTreeMap::from([
            ("old_tab".to_string(), "tab_main".to_string()),
            ("old_fn".to_string(), "func_double".to_string()),
            ("old_link".to_string(), "link_out_done".to_string()),
        ]);
        apply_id_rewrites(&mut doc, &rewrites);

        let expected = document_from_value(json!([
            {"id": "tab_main", "type": "tab"},
            {
                "id": "func_double", "type": "function", "z": "tab_main",
                "wires": [["link_out_done"], []],
                "scope": ["func_double"]
            },
            {"id": "link_out_done", "type": "link out", "z": "tab_main", "links": ["func_double"]},
            {"id": "g1", "type": "group", "z": "tab_main", "nodes": ["func_double", "link_out_done"]},
            {
                "id": "sf", "type": "subflow",
                "in": [{"wires": [{"id": "func_double"}]}],
                "out": [{"wires": [{"id": "link_out_done", "port": 0}]}],
                "env": [{"name": "TARGET", "value": "func_double"}]
            }
        ]))
        .expect("expected");
        assert_eq!(doc, expected);
    }

    #[test]
    fn empty_table_is_a_no_op() {
        let mut doc =
            document_from_value(json!([{"id": "a", "type": "tab"}])).expect("doc");
        let before = doc.clone();
        apply_id_rewrites(&mut doc, &BTreeMap::new());
        assert_eq!(doc, before);
    }
}
