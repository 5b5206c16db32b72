// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace};

use crate::error::{WatchError, WatchErrorCode};
use crate::orchestrator::WatchEvent;

const TICK: Duration = Duration::from_millis(50);

/// Raw feed from the notify callback into the debounce thread.
pub(crate) enum RawFsEvent {
    Touched(PathBuf),
    /// Reaction loop finished rewriting the tree: forget anything pending so
    /// the loop never reacts to its own writes.
    ClearPending,
}

pub(crate) struct FsWatcher {
    // Held for its Drop: dropping stops the native watcher.
    _watcher: RecommendedWatcher,
}

/// Paths the watcher never reacts to: hidden files (the skeleton among them)
/// and the quarantine subtree.
fn is_ignorable(tree: &Path, path: &Path) -> bool {
    let rel = match path.strip_prefix(tree) {
        Ok(rel) => rel,
        Err(_) => return true,
    };
    rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
    })
}

/// Start the native watcher. Events pass the `active` gate at intake time;
/// everything else is the debounce thread's business.
pub(crate) fn start_fs_watcher(
    tree: &Path,
    raw_tx: Sender<RawFsEvent>,
    active: Arc<AtomicBool>,
) -> Result<FsWatcher, WatchError> {
    let root = tree.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let Ok(event) = result else {
            return;
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        if !active.load(Ordering::SeqCst) {
            return;
        }
        for path in event.paths {
            if !is_ignorable(&root, &path) {
                trace!(path = %path.display(), "tree changed");
                let _ = raw_tx.send(RawFsEvent::Touched(path));
            }
        }
    })
    .map_err(|e| WatchError::new(WatchErrorCode::Io, e.to_string()))?;
    watcher
        .watch(tree, RecursiveMode::Recursive)
        .map_err(|e| WatchError::new(WatchErrorCode::Io, e.to_string()))?;
    Ok(FsWatcher { _watcher: watcher })
}

/// Collapse bursts of raw events: after `debounce` of quiescence one
/// `LocalEdit` goes to the mailbox. Runs until the raw channel closes or
/// shutdown is flagged.
pub(crate) fn run_debounce(
    raw_rx: &Receiver<RawFsEvent>,
    mailbox: &Sender<WatchEvent>,
    debounce: Duration,
    shutdown: &AtomicBool,
) {
    let mut pending: Option<Instant> = None;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match raw_rx.recv_timeout(TICK) {
            Ok(RawFsEvent::Touched(_)) => {
                pending = Some(Instant::now());
            }
            Ok(RawFsEvent::ClearPending) => {
                pending = None;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        if let Some(last) = pending {
            if last.elapsed() >= debounce {
                pending = None;
                debug!("local edits quiesced, scheduling rebuild");
                if mailbox
                    .send(WatchEvent::LocalEdit {
                        forced: false,
                        continued: false,
                    })
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}
