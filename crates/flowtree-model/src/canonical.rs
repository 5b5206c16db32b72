// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::document::Document;
use crate::error::ValidationError;
use crate::node::Node;

/// Semantic identity of a document or node: SHA-256 over the compact
/// serialization of the canonical form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{b:02x}");
        }
        out
    }
}

impl core::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Canonical form: object keys sorted recursively, number representations
/// normalized. Array order is preserved, never sorted.
#[must_use]
pub fn canonical_value(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(normalize_number(n)),
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut entries: Vec<(String, Value)> = map
                .into_iter()
                .map(|(k, v)| (k, canonical_value(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_value).collect()),
        other => other,
    }
}

/// Collapse float spellings of integers (`2.0`, `-0.0`) onto the integer so
/// that a document surviving a float-producing serializer still fingerprints
/// the same.
fn normalize_number(number: Number) -> Number {
    if number.is_i64() || number.is_u64() {
        return number;
    }
    if let Some(f) = number.as_f64() {
        if f == 0.0 {
            return Number::from(0);
        }
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            return Number::from(f as i64);
        }
    }
    number
}

pub fn fingerprint_value(value: &Value) -> Result<Fingerprint, ValidationError> {
    let canonical = canonical_value(value.clone());
    let bytes = serde_json::to_vec(&canonical).map_err(|e| ValidationError(e.to_string()))?;
    let digest = Sha256::digest(&bytes);
    let mut out = [0_u8; 32];
    out.copy_from_slice(&digest);
    Ok(Fingerprint(out))
}

pub fn fingerprint_node(node: &Node) -> Result<Fingerprint, ValidationError> {
    fingerprint_value(&node.to_value())
}

pub fn fingerprint_document(document: &Document) -> Result<Fingerprint, ValidationError> {
    fingerprint_value(&document.to_value())
}

#[must_use]
pub fn documents_equal(a: &Document, b: &Document) -> bool {
    canonical_value(a.to_value()) == canonical_value(b.to_value())
}

/// Smallest location at which two documents diverge, for verifier reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPath {
    /// Parent container of the diverging node, when it has one.
    pub container: Option<String>,
    /// Diverging node id, absent when the documents disagree on membership
    /// in a way no single id describes.
    pub node_id: Option<String>,
    /// First diverging field within the node.
    pub field: Option<String>,
}

impl core::fmt::Display for DiffPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (&self.container, &self.node_id, &self.field) {
            (Some(c), Some(n), Some(fld)) => write!(f, "{c}/{n}.{fld}"),
            (None, Some(n), Some(fld)) => write!(f, "{n}.{fld}"),
            (Some(c), Some(n), None) => write!(f, "{c}/{n}"),
            (None, Some(n), None) => write!(f, "{n}"),
            _ => write!(f, "(document shape)"),
        }
    }
}

/// First point of semantic divergence, or `None` when the documents are
/// fingerprint-equal.
#[must_use]
pub fn diff_documents(a: &Document, b: &Document) -> Option<DiffPath> {
    if documents_equal(a, b) {
        return None;
    }
    // Pairwise by position first: order is part of document identity.
    for (left, right) in a.iter().zip(b.iter()) {
        if left.id() != right.id() {
            return Some(DiffPath {
                container: left.z().map(ToOwned::to_owned),
                node_id: left.id().map(ToOwned::to_owned),
                field: None,
            });
        }
        if let Some(field) = first_field_diff(left, right) {
            return Some(DiffPath {
                container: left.z().map(ToOwned::to_owned),
                node_id: left.id().map(ToOwned::to_owned),
                field: Some(field),
            });
        }
    }
    if a.len() != b.len() {
        let longer = if a.len() > b.len() { a } else { b };
        let node = &longer.nodes()[a.len().min(b.len())];
        return Some(DiffPath {
            container: node.z().map(ToOwned::to_owned),
            node_id: node.id().map(ToOwned::to_owned),
            field: None,
        });
    }
    Some(DiffPath {
        container: None,
        node_id: None,
        field: None,
    })
}

fn first_field_diff(a: &Node, b: &Node) -> Option<String> {
    for (name, value) in a.fields() {
        match b.get(name) {
            None => return Some(name.clone()),
            Some(other) => {
                if canonical_value(value.clone()) != canonical_value(other.clone()) {
                    return Some(name.clone());
                }
            }
        }
    }
    b.field_names()
        .find(|name| !a.contains(name))
        .map(ToOwned::to_owned)
}
