// SPDX-License-Identifier: Apache-2.0

use flowtree_model::Document;

use crate::error::RemoteError;

#[derive(Debug, Clone)]
pub struct FreshDocument {
    pub document: Document,
    pub etag: Option<String>,
    pub revision: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The server had a newer document.
    Fresh(FreshDocument),
    /// Conditional fetch answered 304.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub revision: Option<String>,
    /// Deployment-type header echoed by the server, passed through untouched.
    pub deployment_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub downloads: u64,
    pub uploads: u64,
    pub errors: u64,
    pub revision: Option<String>,
    pub etag: Option<String>,
}

/// The seam between the watch orchestrator and the wire. The transport owns
/// the cached ETag and the last revision; a successful push always clears
/// the ETag so the next fetch is unconditional.
pub trait FlowTransport: Send + Sync {
    fn fetch(&self, force: bool) -> Result<FetchOutcome, RemoteError>;
    fn push(&self, document: &Document) -> Result<PushOutcome, RemoteError>;
    fn clear_etag(&self);
    fn revision(&self) -> Option<String>;
    fn stats(&self) -> TransportStats;

    /// How long callers should wait after a rate-limit refusal before the
    /// window reopens. Zero when the transport imposes no ceiling.
    fn retry_after(&self) -> std::time::Duration {
        std::time::Duration::ZERO
    }
}
