// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use flowtree_engine::{NewFilePolicy, OrphanPolicy};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_CYCLE_LIMIT: usize = 5;
pub const DEFAULT_CYCLE_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_FAILURE_CAP: u32 = 5;

#[derive(Debug, Clone)]
pub struct WatchPaths {
    /// Root of the exploded tree.
    pub tree: PathBuf,
    /// On-disk home of the assembled document.
    pub document: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Quiescence required before local edits collapse into one reaction.
    pub debounce: Duration,
    /// Push cycles tolerated inside `cycle_window` before the loop pauses
    /// with an oscillation warning.
    pub cycle_limit: usize,
    pub cycle_window: Duration,
    /// Consecutive reaction failures before the loop pauses.
    pub failure_cap: u32,
    pub orphans: OrphanPolicy,
    pub new_files: NewFilePolicy,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            cycle_limit: DEFAULT_CYCLE_LIMIT,
            cycle_window: DEFAULT_CYCLE_WINDOW,
            failure_cap: DEFAULT_FAILURE_CAP,
            orphans: OrphanPolicy::default(),
            new_files: NewFilePolicy::default(),
        }
    }
}
