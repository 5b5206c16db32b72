// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Error raised inside a plugin hook. Hosts isolate these: the failing
/// plugin is skipped for that invocation and the pipeline continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginError(pub String);

impl PluginError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin_error: {}", self.0)
    }
}

impl std::error::Error for PluginError {}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Record of one isolated hook failure, surfaced in engine reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub plugin: String,
    pub node: Option<String>,
    pub message: String,
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{} failed on {node}: {}", self.plugin, self.message),
            None => write!(f, "{} failed: {}", self.plugin, self.message),
        }
    }
}
