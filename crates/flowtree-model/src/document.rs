// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::node::Node;

/// Upper bound on a serialized document.
pub const MAX_DOCUMENT_BYTES: usize = 100 * 1024 * 1024;
/// Upper bound on any single per-node file the engines read back.
pub const MAX_NODE_FILE_BYTES: usize = 10 * 1024 * 1024;
/// Upper bound on node count.
pub const MAX_NODES: usize = 10_000;

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const MAX_ID_LEN: usize = 200;

/// An ordered sequence of nodes. Order is semantically significant and is
/// preserved through every transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Document(Vec<Node>);

impl Document {
    #[must_use]
    pub fn new(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.0
    }

    #[must_use]
    pub fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.0
    }

    pub fn push(&mut self, node: Node) {
        self.0.push(node);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.iter()
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Node> {
        self.0.iter().find(|n| n.id() == Some(id))
    }

    /// Ids of containers that map to directories (tabs and subflows).
    #[must_use]
    pub fn partition_container_ids(&self) -> BTreeSet<String> {
        self.0
            .iter()
            .filter(|n| n.is_partition_container())
            .filter_map(|n| n.id().map(ToOwned::to_owned))
            .collect()
    }

    /// Structural validation: ids present, unique, and filesystem-safe;
    /// resource limits respected. Content fields are not inspected.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.len() > MAX_NODES {
            return Err(ValidationError(format!(
                "document has {} nodes, limit is {MAX_NODES}",
                self.0.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for node in &self.0 {
            let id = node
                .id()
                .ok_or_else(|| ValidationError("node missing string id".to_string()))?;
            if node.node_type().is_none() {
                return Err(ValidationError(format!("node {id} missing string type")));
            }
            validate_node_id(id)?;
            if !seen.insert(id.to_string()) {
                return Err(ValidationError(format!("duplicate node id {id}")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().map(Node::to_value).collect())
    }

    /// Compact single-line JSON, no trailing newline. Keys come out sorted;
    /// fingerprint equality does not depend on key order.
    pub fn to_compact_json(&self) -> Result<String, ValidationError> {
        serde_json::to_string(self).map_err(|e| ValidationError(e.to_string()))
    }
}

impl IntoIterator for Document {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parse a document from raw bytes. The top level must be a JSON array of
/// objects; a `{"flows": [...]}` envelope is also accepted since the wire
/// protocol serves one.
pub fn parse_document(bytes: &[u8]) -> Result<Document, ValidationError> {
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ValidationError(format!(
            "document is {} bytes, limit is {MAX_DOCUMENT_BYTES}",
            bytes.len()
        )));
    }
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ValidationError(format!("invalid JSON: {e}")))?;
    document_from_value(value)
}

pub fn document_from_value(value: Value) -> Result<Document, ValidationError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("flows") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ValidationError(
                    "expected an array of nodes or a flows envelope".to_string(),
                ))
            }
        },
        other => {
            return Err(ValidationError(format!(
                "expected an array of nodes, got {}",
                json_type_name(&other)
            )))
        }
    };
    let mut nodes = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(map) => nodes.push(Node::new(map)),
            other => {
                return Err(ValidationError(format!(
                    "expected node object, got {}",
                    json_type_name(&other)
                )))
            }
        }
    }
    Ok(Document::new(nodes))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Node ids become file stems, so they must be safe on every filesystem the
/// tree may land on.
fn validate_node_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError("empty node id".to_string()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(ValidationError(format!(
            "node id longer than {MAX_ID_LEN} bytes"
        )));
    }
    if id == "." || id == ".." || id.starts_with('.') {
        return Err(ValidationError(format!("node id {id:?} is not a safe file stem")));
    }
    if id
        .chars()
        .any(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return Err(ValidationError(format!(
            "node id {id:?} contains filesystem-unsafe characters"
        )));
    }
    let stem = id.split('.').next().unwrap_or(id).to_ascii_uppercase();
    if WINDOWS_RESERVED.contains(&stem.as_str()) {
        return Err(ValidationError(format!(
            "node id {id:?} collides with a reserved device name"
        )));
    }
    Ok(())
}
