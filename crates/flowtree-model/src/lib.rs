// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Flow document model SSOT.
//!
//! A document is an ordered list of nodes; order is significant and preserved
//! end to end. Canonicalization and fingerprinting live here so that every
//! other crate compares documents the same way.

mod canonical;
mod document;
mod error;
mod node;
mod rewrite;

pub use canonical::{
    canonical_value, diff_documents, documents_equal, fingerprint_document, fingerprint_node,
    fingerprint_value, DiffPath, Fingerprint,
};
pub use document::{
    document_from_value, parse_document, Document, MAX_DOCUMENT_BYTES, MAX_NODES,
    MAX_NODE_FILE_BYTES,
};
pub use error::ValidationError;
pub use node::{
    is_structural_field, Node, CONTAINER_TYPES, PARTITION_TYPES, STRUCTURAL_FIELDS,
};
pub use rewrite::apply_id_rewrites;

pub const CRATE_NAME: &str = "flowtree-model";
