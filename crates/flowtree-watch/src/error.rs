// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum WatchErrorCode {
    Config,
    Io,
    /// The orchestrator is gone or unresponsive.
    Closed,
    Internal,
}

impl WatchErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config_error",
            Self::Io => "io_error",
            Self::Closed => "watch_closed",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchError {
    pub code: WatchErrorCode,
    pub message: String,
}

impl WatchError {
    #[must_use]
    pub fn new(code: WatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for WatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for WatchError {}

impl From<std::io::Error> for WatchError {
    fn from(e: std::io::Error) -> Self {
        Self::new(WatchErrorCode::Io, e.to_string())
    }
}
