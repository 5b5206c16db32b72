// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteErrorCode {
    /// Timeout, connection failure, or 5xx after retries were exhausted.
    Transient,
    /// Revision mismatch on push (409).
    Conflict,
    /// Server 429 or the internal ceiling.
    RateLimited,
    /// Credentials rejected even after one refresh.
    Auth,
    /// Response shape the client cannot interpret.
    Protocol,
    /// Any other non-success status.
    Http,
}

impl RemoteErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "remote_transient",
            Self::Conflict => "remote_conflict",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth_error",
            Self::Protocol => "protocol_error",
            Self::Http => "http_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    pub message: String,
}

impl RemoteError {
    #[must_use]
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for RemoteError {}
