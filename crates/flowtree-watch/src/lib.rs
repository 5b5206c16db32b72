// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Bidirectional watch orchestrator.
//!
//! Two event sources feed one mailbox: a poller doing conditional fetches
//! against the remote, and a filesystem watcher whose bursts collapse behind
//! a debounce window. Reactions drain the mailbox strictly serially; they are
//! the only writers of shared state, so the poller and watcher stay pure
//! producers. A `watcher_active` gate keeps the loop from reacting to its own
//! tree writes, and a sliding cycle window pauses the loop when a
//! non-fixpoint plugin would otherwise ping-pong documents forever.

mod activity;
mod command;
mod debounce;
mod error;
mod options;
mod orchestrator;

pub use activity::ActivityLog;
pub use command::{PauseReason, StatusSnapshot, WatchCommand};
pub use error::{WatchError, WatchErrorCode};
pub use options::{WatchOptions, WatchPaths};
pub use orchestrator::{spawn_watch, WatchHandle};

pub const CRATE_NAME: &str = "flowtree-watch";
