// SPDX-License-Identifier: Apache-2.0

use std::sync::mpsc::Sender;
use std::sync::Arc;

use flowtree_plugin::PluginHost;
use flowtree_remote::TransportStats;

/// Why the loop stopped reacting. Cleared by `Resume`, `Download`, or
/// `Upload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PauseReason {
    Operator,
    Conflict,
    Oscillation,
    FailureCap,
}

impl PauseReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "paused",
            Self::Conflict => "remote_conflict",
            Self::Oscillation => "oscillation",
            Self::FailureCap => "failure_cap",
        }
    }
}

/// Operator surface. Commands share the reaction mailbox, so they serialize
/// with every other reaction.
pub enum WatchCommand {
    /// Forced fetch-and-explode; clears the cached ETag and any pause.
    Download,
    /// Forced rebuild-and-push; clears any pause.
    Upload,
    /// Rebuild in memory and compare against the last fetched document,
    /// without pushing.
    Check,
    Status(Sender<StatusSnapshot>),
    Pause,
    Resume,
    /// Swap the plugin host atomically between reactions.
    ReloadPlugins(Arc<PluginHost>),
    Quit,
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub paused: bool,
    pub pause_reason: Option<&'static str>,
    pub transport: TransportStats,
    /// Nodes the last explode flagged as not round-tripping.
    pub unstable: usize,
    /// Push cycles inside the oscillation window right now.
    pub cycles_in_window: usize,
    pub consecutive_failures: u32,
    pub recent_activity: Vec<String>,
}
