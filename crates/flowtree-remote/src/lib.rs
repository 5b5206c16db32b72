// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Remote document transport.
//!
//! [`FlowTransport`] is the seam the watch orchestrator consumes: fetch with
//! ETag-conditional caching, push under optimistic revision locking. The HTTP
//! implementation carries bounded timeouts, exponential retry for transient
//! faults, and a sliding-window rate limiter; the in-memory fake drives the
//! orchestrator in tests.

mod credential;
mod error;
mod fake;
mod http;
mod limiter;
mod retry;
mod transport;

pub use credential::Credential;
pub use error::{RemoteError, RemoteErrorCode};
pub use fake::FakeFlowTransport;
pub use http::{HttpFlowClient, RemoteOptions};
pub use limiter::{RateLimiter, RateLimits, RATE_LIMIT_PER_10MIN, RATE_LIMIT_PER_MINUTE};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use transport::{FetchOutcome, FlowTransport, FreshDocument, PushOutcome, TransportStats};

pub const CRATE_NAME: &str = "flowtree-remote";
