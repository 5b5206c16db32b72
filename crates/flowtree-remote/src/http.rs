// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;
use std::time::Duration;

use flowtree_model::{document_from_value, Document};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::error::{RemoteError, RemoteErrorCode};
use crate::limiter::{RateLimiter, RateLimits};
use crate::retry::{BackoffPolicy, RetryPolicy};
use crate::transport::{FetchOutcome, FlowTransport, FreshDocument, PushOutcome, TransportStats};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION_HEADER: &str = "Node-RED-API-Version";
const DEPLOYMENT_TYPE_HEADER: &str = "Node-RED-Deployment-Type";

#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub deployment_type: String,
    pub retry: RetryPolicy,
    pub limits: RateLimits,
}

impl RemoteOptions {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: HTTP_TIMEOUT,
            deployment_type: "full".to_string(),
            retry: RetryPolicy::default(),
            limits: RateLimits::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ClientState {
    etag: Option<String>,
    revision: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    downloads: u64,
    uploads: u64,
    errors: u64,
}

/// Blocking HTTP client for the document endpoint. ETag and revision live
/// behind a mutex so the poller thread and reaction thread can share one
/// client value.
pub struct HttpFlowClient {
    opts: RemoteOptions,
    credential: Credential,
    client: Client,
    state: Mutex<ClientState>,
    counters: Mutex<Counters>,
    limiter: RateLimiter,
}

impl HttpFlowClient {
    pub fn new(opts: RemoteOptions, credential: Credential) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(opts.timeout)
            .build()
            .map_err(|e| RemoteError::new(RemoteErrorCode::Transient, e.to_string()))?;
        Ok(Self {
            limiter: RateLimiter::new(opts.limits),
            opts,
            credential,
            client,
            state: Mutex::new(ClientState::default()),
            counters: Mutex::new(Counters::default()),
        })
    }

    fn flows_url(&self) -> String {
        format!("{}/flows", self.opts.base_url.trim_end_matches('/'))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Credential::None => req,
            Credential::Bearer(token) => req.bearer_auth(token),
            Credential::Basic { username, password } => req.basic_auth(username, Some(password)),
        }
    }

    fn check_rate(&self) -> Result<(), RemoteError> {
        if self.limiter.try_acquire() {
            return Ok(());
        }
        let (minute, ten) = self.limiter.window_counts();
        self.count_error();
        Err(RemoteError::new(
            RemoteErrorCode::RateLimited,
            format!(
                "request ceiling reached ({minute}/min, {ten}/10min), retry in {:?}",
                self.limiter.next_allowed_in()
            ),
        ))
    }

    fn count_error(&self) {
        if let Ok(mut c) = self.counters.lock() {
            c.errors += 1;
        }
    }

    fn cached_etag(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.etag.clone())
    }

    /// Rate limit, send, and classify; transient failures retry in place
    /// with exponential backoff, a rejected credential is retried once with
    /// auth freshly applied.
    fn send_with_retry(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, RemoteError> {
        let mut reauthed = false;
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            self.check_rate()?;
            let result = self.authed(build()).send();
            let transient = match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        if reauthed {
                            self.count_error();
                            return Err(RemoteError::new(
                                RemoteErrorCode::Auth,
                                format!("credentials rejected with {status}"),
                            ));
                        }
                        warn!("authentication rejected, retrying once with fresh credentials");
                        reauthed = true;
                        continue;
                    }
                    if !status.is_server_error() {
                        return Ok(resp);
                    }
                    format!("server error {status}")
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => e.to_string(),
                Err(e) => {
                    self.count_error();
                    return Err(RemoteError::new(RemoteErrorCode::Transient, e.to_string()));
                }
            };
            if attempt >= self.opts.retry.max_attempts {
                self.count_error();
                return Err(RemoteError::new(
                    RemoteErrorCode::Transient,
                    format!("{transient} (after {attempt} attempts)"),
                ));
            }
            let delay = self.opts.retry.delay_for_attempt(attempt);
            debug!(attempt, ?delay, "transient failure, backing off: {transient}");
            std::thread::sleep(delay);
        }
    }
}

impl FlowTransport for HttpFlowClient {
    fn fetch(&self, force: bool) -> Result<FetchOutcome, RemoteError> {
        let etag = if force { None } else { self.cached_etag() };
        let resp = self.send_with_retry(|| {
            let mut req = self
                .client
                .get(self.flows_url())
                .header(API_VERSION_HEADER, "v2");
            if let Some(etag) = &etag {
                req = req.header(IF_NONE_MATCH, etag);
            }
            req
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::Unchanged);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.count_error();
            return Err(RemoteError::new(
                RemoteErrorCode::RateLimited,
                "server rate limited the fetch",
            ));
        }
        if !status.is_success() {
            self.count_error();
            return Err(RemoteError::new(
                RemoteErrorCode::Http,
                format!("fetch answered {status}"),
            ));
        }

        let new_etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let body: Value = resp
            .json()
            .map_err(|e| RemoteError::new(RemoteErrorCode::Protocol, e.to_string()))?;
        let revision = body
            .as_object()
            .and_then(|o| o.get("rev"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        let document = document_from_value(body)
            .map_err(|e| RemoteError::new(RemoteErrorCode::Protocol, e.to_string()))?;

        if let Ok(mut state) = self.state.lock() {
            if new_etag.is_some() {
                state.etag = new_etag.clone();
            }
            if revision.is_some() {
                if revision != state.revision {
                    info!(
                        from = state.revision.as_deref().unwrap_or("initial"),
                        to = revision.as_deref().unwrap_or(""),
                        "document revision advanced"
                    );
                }
                state.revision = revision.clone();
            }
        }
        if let Ok(mut c) = self.counters.lock() {
            c.downloads += 1;
        }
        Ok(FetchOutcome::Fresh(FreshDocument {
            document,
            etag: new_etag,
            revision,
        }))
    }

    fn push(&self, document: &Document) -> Result<PushOutcome, RemoteError> {
        let revision = self.revision();
        let body = serde_json::json!({ "flows": document });
        let resp = self.send_with_retry(|| {
            let mut req = self
                .client
                .post(self.flows_url())
                .header(API_VERSION_HEADER, "v2")
                .header(DEPLOYMENT_TYPE_HEADER, self.opts.deployment_type.as_str())
                .json(&body);
            if let Some(rev) = &revision {
                req = req.query(&[("rev", rev.as_str())]);
            }
            req
        })?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            self.count_error();
            return Err(RemoteError::new(
                RemoteErrorCode::Conflict,
                "document revision changed on the server while editing locally",
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.count_error();
            return Err(RemoteError::new(
                RemoteErrorCode::RateLimited,
                "server rate limited the push",
            ));
        }
        if !status.is_success() {
            self.count_error();
            return Err(RemoteError::new(
                RemoteErrorCode::Http,
                format!("push answered {status}"),
            ));
        }

        let deployment_type = resp
            .headers()
            .get(DEPLOYMENT_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let result: Value = resp
            .json()
            .map_err(|e| RemoteError::new(RemoteErrorCode::Protocol, e.to_string()))?;
        let new_revision = result
            .get("rev")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        if let Ok(mut state) = self.state.lock() {
            if new_revision.is_some() {
                state.revision = new_revision.clone();
            }
            // Any successful push clears the cached ETag so the next fetch is
            // unconditional and server-applied mutations become visible.
            state.etag = None;
        }
        if let Ok(mut c) = self.counters.lock() {
            c.uploads += 1;
        }
        info!(rev = new_revision.as_deref().unwrap_or(""), "document deployed");
        Ok(PushOutcome {
            revision: new_revision,
            deployment_type,
        })
    }

    fn clear_etag(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.etag = None;
        }
    }

    fn retry_after(&self) -> Duration {
        self.limiter.next_allowed_in()
    }

    fn revision(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.revision.clone())
    }

    fn stats(&self) -> TransportStats {
        let (downloads, uploads, errors) = self
            .counters
            .lock()
            .map(|c| (c.downloads, c.uploads, c.errors))
            .unwrap_or((0, 0, 0));
        let (revision, etag) = self
            .state
            .lock()
            .map(|s| (s.revision.clone(), s.etag.clone()))
            .unwrap_or((None, None));
        TransportStats {
            downloads,
            uploads,
            errors,
            revision,
            etag,
        }
    }
}
