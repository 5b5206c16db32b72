// SPDX-License-Identifier: Apache-2.0

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowtree_remote::{
    Credential, FetchOutcome, FlowTransport, HttpFlowClient, RateLimits, RemoteErrorCode,
    RemoteOptions, RetryPolicy,
};
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
struct Captured {
    method: String,
    url: String,
    if_none_match: Option<String>,
    deployment_type: Option<String>,
    authorization: Option<String>,
    body: String,
}

#[derive(Clone)]
struct Scripted {
    status: u16,
    body: String,
    etag: Option<String>,
    deployment_type: Option<String>,
}

impl Scripted {
    fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            etag: None,
            deployment_type: None,
        }
    }

    fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    fn status(code: u16) -> Self {
        Self {
            status: code,
            body: String::new(),
            etag: None,
            deployment_type: None,
        }
    }
}

/// Scripted one-shot server: answers exactly `script.len()` requests, in
/// order, recording what the client sent.
fn serve(script: Vec<Scripted>) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let server = Server::http("127.0.0.1:0").expect("bind mock server");
    let addr = server.server_addr().to_ip().expect("tcp listener");
    let base = format!("http://{addr}");
    let captured = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&captured);
    std::thread::spawn(move || {
        for scripted in script {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let header = |name: &'static str| -> Option<String> {
                request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv(name))
                    .map(|h| h.value.as_str().to_string())
            };
            let method = request.method().to_string();
            let url = request.url().to_string();
            let if_none_match = header("if-none-match");
            let deployment_type = header("node-red-deployment-type");
            let authorization = header("authorization");
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            if let Ok(mut log) = log.lock() {
                log.push(Captured {
                    method,
                    url,
                    if_none_match,
                    deployment_type,
                    authorization,
                    body,
                });
            }
            let mut response = Response::from_string(scripted.body.clone())
                .with_status_code(scripted.status);
            if let Some(etag) = &scripted.etag {
                response = response.with_header(
                    Header::from_bytes(&b"ETag"[..], etag.as_bytes()).expect("etag header"),
                );
            }
            if let Some(dt) = &scripted.deployment_type {
                response = response.with_header(
                    Header::from_bytes(&b"Node-RED-Deployment-Type"[..], dt.as_bytes())
                        .expect("deployment header"),
                );
            }
            let _ = request.respond(response);
        }
    });
    (base, captured)
}

fn client(base: &str, credential: Credential) -> HttpFlowClient {
    let mut opts = RemoteOptions::new(base);
    opts.retry = RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(5),
    };
    HttpFlowClient::new(opts, credential).expect("client")
}

#[test]
fn conditional_fetch_caches_etag_and_honours_304() {
    let (base, captured) = serve(vec![
        Scripted::ok(r#"{"flows":[{"id":"a","type":"tab"}],"rev":"R1"}"#).with_etag("E1"),
        Scripted::status(304),
    ]);
    let client = client(&base, Credential::None);

    match client.fetch(false).expect("first fetch") {
        FetchOutcome::Fresh(fresh) => {
            assert_eq!(fresh.etag.as_deref(), Some("E1"));
            assert_eq!(fresh.revision.as_deref(), Some("R1"));
            assert_eq!(fresh.document.len(), 1);
        }
        FetchOutcome::Unchanged => panic!("expected fresh document"),
    }
    assert!(matches!(
        client.fetch(false).expect("second fetch"),
        FetchOutcome::Unchanged
    ));

    let log = captured.lock().expect("log");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].if_none_match, None);
    assert_eq!(log[1].if_none_match.as_deref(), Some("E1"));
    assert_eq!(client.revision().as_deref(), Some("R1"));
}

#[test]
fn push_sends_revision_and_clears_cached_etag() {
    let (base, captured) = serve(vec![
        Scripted::ok(r#"{"flows":[{"id":"a","type":"tab"}],"rev":"R1"}"#).with_etag("E1"),
        Scripted {
            status: 200,
            body: r#"{"rev":"R2"}"#.to_string(),
            etag: None,
            deployment_type: Some("full".to_string()),
        },
        Scripted::ok(r#"{"flows":[],"rev":"R2"}"#).with_etag("E2"),
    ]);
    let client = client(&base, Credential::None);
    let _ = client.fetch(false).expect("prime");

    let doc = flowtree_model::parse_document(br#"[{"id":"b","type":"tab"}]"#).expect("doc");
    let outcome = client.push(&doc).expect("push");
    assert_eq!(outcome.revision.as_deref(), Some("R2"));
    assert_eq!(outcome.deployment_type.as_deref(), Some("full"));
    assert_eq!(client.revision().as_deref(), Some("R2"));

    // ETag was cleared by the push, so the follow-up fetch is unconditional.
    let _ = client.fetch(false).expect("refetch");
    let log = captured.lock().expect("log");
    assert_eq!(log.len(), 3);
    assert!(log[1].url.contains("rev=R1"), "push url: {}", log[1].url);
    assert_eq!(log[1].deployment_type.as_deref(), Some("full"));
    assert!(log[1].body.contains(r#""flows""#));
    assert_eq!(log[2].if_none_match, None);
}

#[test]
fn conflict_and_rate_limit_map_to_their_codes() {
    let (base, _) = serve(vec![Scripted::status(409)]);
    let doc = flowtree_model::parse_document(b"[]").expect("doc");
    let err = client(&base, Credential::None)
        .push(&doc)
        .expect_err("conflict");
    assert_eq!(err.code, RemoteErrorCode::Conflict);
    assert_eq!(err.code.as_str(), "remote_conflict");

    let (base, _) = serve(vec![Scripted::status(429)]);
    let err = client(&base, Credential::None)
        .push(&doc)
        .expect_err("rate limited");
    assert_eq!(err.code, RemoteErrorCode::RateLimited);
}

#[test]
fn transient_server_errors_are_retried_with_backoff() {
    let (base, captured) = serve(vec![
        Scripted::status(503),
        Scripted::ok(r#"{"flows":[],"rev":"R5"}"#).with_etag("E5"),
    ]);
    let client = client(&base, Credential::None);
    match client.fetch(false).expect("eventually succeeds") {
        FetchOutcome::Fresh(fresh) => assert_eq!(fresh.revision.as_deref(), Some("R5")),
        FetchOutcome::Unchanged => panic!("expected fresh"),
    }
    assert_eq!(captured.lock().expect("log").len(), 2);
}

#[test]
fn exhausted_retries_surface_remote_transient() {
    let (base, _) = serve(vec![
        Scripted::status(500),
        Scripted::status(500),
        Scripted::status(500),
    ]);
    let err = client(&base, Credential::None)
        .fetch(false)
        .expect_err("all attempts fail");
    assert_eq!(err.code, RemoteErrorCode::Transient);
    assert_eq!(err.code.as_str(), "remote_transient");
}

#[test]
fn bearer_credential_is_applied_and_refreshed_once_on_401() {
    let (base, captured) = serve(vec![
        Scripted::status(401),
        Scripted::ok(r#"{"flows":[],"rev":"R1"}"#).with_etag("E1"),
    ]);
    let client = client(&base, Credential::Bearer("tok".to_string()));
    client.fetch(false).expect("succeeds after refresh");
    let log = captured.lock().expect("log");
    assert_eq!(log.len(), 2);
    for entry in log.iter() {
        assert_eq!(entry.authorization.as_deref(), Some("Bearer tok"));
        assert_eq!(entry.method, "GET");
    }
}

#[test]
fn internal_ceiling_refuses_before_the_wire() {
    let (base, captured) = serve(vec![Scripted::ok(r#"{"flows":[],"rev":"R1"}"#)]);
    let mut opts = RemoteOptions::new(&base);
    opts.limits = RateLimits {
        per_minute: 1,
        per_ten_minutes: 10,
    };
    let client = HttpFlowClient::new(opts, Credential::None).expect("client");
    client.fetch(true).expect("first request admitted");
    let err = client.fetch(true).expect_err("ceiling reached");
    assert_eq!(err.code, RemoteErrorCode::RateLimited);
    assert_eq!(err.code.as_str(), "rate_limited");
    assert_eq!(captured.lock().expect("log").len(), 1);
    assert_eq!(client.stats().errors, 1);
}
