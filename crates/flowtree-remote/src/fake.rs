// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use flowtree_model::Document;

use crate::error::{RemoteError, RemoteErrorCode};
use crate::transport::{FetchOutcome, FlowTransport, FreshDocument, PushOutcome, TransportStats};

#[derive(Debug)]
struct FakeState {
    document: Document,
    revision: u64,
    etag_serial: u64,
    cached_etag: Option<String>,
    failing_pushes: Option<(RemoteErrorCode, u32)>,
    downloads: u64,
    uploads: u64,
    errors: u64,
    pushed_revisions: Vec<String>,
}

/// In-memory transport with server semantics: serial revisions, an ETag that
/// changes with the document, and injectable push failures. Drives the watch
/// orchestrator in tests without a wire.
pub struct FakeFlowTransport {
    state: Mutex<FakeState>,
}

impl FakeFlowTransport {
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self {
            state: Mutex::new(FakeState {
                document,
                revision: 1,
                etag_serial: 1,
                cached_etag: None,
                failing_pushes: None,
                downloads: 0,
                uploads: 0,
                errors: 0,
                pushed_revisions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// An external actor replaces the server document: revision and ETag
    /// advance, the next conditional fetch sees it.
    pub fn external_edit(&self, document: Document) {
        let mut state = self.lock();
        state.document = document;
        state.revision += 1;
        state.etag_serial += 1;
    }

    pub fn fail_next_push(&self, code: RemoteErrorCode) {
        self.fail_pushes(code, 1);
    }

    /// Fail the next `count` pushes with `code`, then recover.
    pub fn fail_pushes(&self, code: RemoteErrorCode, count: u32) {
        self.lock().failing_pushes = Some((code, count));
    }

    #[must_use]
    pub fn server_document(&self) -> Document {
        self.lock().document.clone()
    }

    #[must_use]
    pub fn push_count(&self) -> u64 {
        self.lock().uploads
    }

    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.lock().downloads
    }

    /// Revisions returned to successful pushes, in order.
    #[must_use]
    pub fn pushed_revisions(&self) -> Vec<String> {
        self.lock().pushed_revisions.clone()
    }
}

impl FlowTransport for FakeFlowTransport {
    fn fetch(&self, force: bool) -> Result<FetchOutcome, RemoteError> {
        let mut state = self.lock();
        let current = format!("E{}", state.etag_serial);
        if !force && state.cached_etag.as_deref() == Some(current.as_str()) {
            return Ok(FetchOutcome::Unchanged);
        }
        state.cached_etag = Some(current.clone());
        state.downloads += 1;
        Ok(FetchOutcome::Fresh(FreshDocument {
            document: state.document.clone(),
            etag: Some(current),
            revision: Some(format!("R{}", state.revision)),
        }))
    }

    fn push(&self, document: &Document) -> Result<PushOutcome, RemoteError> {
        let mut state = self.lock();
        if let Some((code, remaining)) = state.failing_pushes {
            state.failing_pushes = (remaining > 1).then_some((code, remaining - 1));
            state.errors += 1;
            return Err(RemoteError::new(code, "injected push failure"));
        }
        state.document = document.clone();
        state.revision += 1;
        state.etag_serial += 1;
        state.uploads += 1;
        state.cached_etag = None;
        let revision = format!("R{}", state.revision);
        state.pushed_revisions.push(revision.clone());
        Ok(PushOutcome {
            revision: Some(revision),
            deployment_type: Some("full".to_string()),
        })
    }

    fn clear_etag(&self) {
        self.lock().cached_etag = None;
    }

    fn revision(&self) -> Option<String> {
        Some(format!("R{}", self.lock().revision))
    }

    fn stats(&self) -> TransportStats {
        let state = self.lock();
        TransportStats {
            downloads: state.downloads,
            uploads: state.uploads,
            errors: state.errors,
            revision: Some(format!("R{}", state.revision)),
            etag: state.cached_etag.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtree_model::parse_document;

    fn doc(raw: &[u8]) -> Document {
        parse_document(raw).expect("document")
    }

    #[test]
    fn conditional_fetch_sees_304_until_an_edit() {
        let fake = FakeFlowTransport::new(doc(br#"[{"id":"a","type":"tab"}]"#));
        assert!(matches!(fake.fetch(false), Ok(FetchOutcome::Fresh(_))));
        assert!(matches!(fake.fetch(false), Ok(FetchOutcome::Unchanged)));
        fake.external_edit(doc(br#"[{"id":"b","type":"tab"}]"#));
        assert!(matches!(fake.fetch(false), Ok(FetchOutcome::Fresh(_))));
    }

    #[test]
    fn push_clears_etag_and_returns_monotonic_revisions() {
        let fake = FakeFlowTransport::new(doc(br#"[{"id":"a","type":"tab"}]"#));
        let _ = fake.fetch(false).expect("prime etag");
        let first = fake.push(&doc(br#"[{"id":"b","type":"tab"}]"#)).expect("push");
        let second = fake.push(&doc(br#"[{"id":"c","type":"tab"}]"#)).expect("push");
        assert_eq!(first.revision.as_deref(), Some("R2"));
        assert_eq!(second.revision.as_deref(), Some("R3"));
        // ETag cleared by the push: next conditional fetch is fresh.
        assert!(matches!(fake.fetch(false), Ok(FetchOutcome::Fresh(_))));
    }

    #[test]
    fn injected_failures_surface_their_code() {
        let fake = FakeFlowTransport::new(doc(b"[]"));
        fake.fail_next_push(RemoteErrorCode::Conflict);
        let err = fake.push(&doc(b"[]")).expect_err("injected conflict");
        assert_eq!(err.code, RemoteErrorCode::Conflict);
        // One-shot: next push succeeds.
        assert!(fake.push(&doc(b"[]")).is_ok());
    }
}
