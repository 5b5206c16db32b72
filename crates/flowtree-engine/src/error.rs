// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineErrorCode {
    Config,
    Io,
    SkeletonMissing,
    NodeFilesMissing,
    Plugin,
    Verify,
    Internal,
}

impl EngineErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config_error",
            Self::Io => "io_error",
            Self::SkeletonMissing => "skeleton_missing",
            Self::NodeFilesMissing => "node_files_missing",
            Self::Plugin => "plugin_error",
            Self::Verify => "verify_failure",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: EngineErrorCode,
    pub message: String,
}

impl EngineError {
    #[must_use]
    pub fn new(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::Io, message)
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<flowtree_model::ValidationError> for EngineError {
    fn from(e: flowtree_model::ValidationError) -> Self {
        Self::new(EngineErrorCode::Config, e.to_string())
    }
}
