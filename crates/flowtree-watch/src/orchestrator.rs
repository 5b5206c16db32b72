// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flowtree_engine::{atomic_write, explode, rebuild, ExplodeOptions, RebuildOptions};
use flowtree_model::{diff_documents, Document};
use flowtree_plugin::PluginHost;
use flowtree_remote::{
    FetchOutcome, FlowTransport, FreshDocument, PushOutcome, RemoteError, RemoteErrorCode,
};
use tracing::{error, info, warn};

use crate::activity::ActivityLog;
use crate::command::{PauseReason, StatusSnapshot, WatchCommand};
use crate::debounce::{run_debounce, start_fs_watcher, FsWatcher, RawFsEvent};
use crate::error::{WatchError, WatchErrorCode};
use crate::options::{WatchOptions, WatchPaths};

const POLL_TICK: Duration = Duration::from_millis(50);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const RATE_RETRY_CEILING: Duration = Duration::from_secs(120);
const WATCHER_SETTLE: Duration = Duration::from_millis(100);

/// Everything the mailbox carries. Reactions run strictly one at a time in
/// arrival order; producers never touch shared state themselves.
pub(crate) enum WatchEvent {
    RemoteUpdate(FreshDocument),
    LocalEdit { forced: bool, continued: bool },
    RemoteFault(RemoteError),
    Command(WatchCommand),
}

/// Running watch loop. Dropping the handle signals shutdown; `shutdown()`
/// additionally joins every thread.
pub struct WatchHandle {
    tx: Sender<WatchEvent>,
    shutdown_flag: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    _fs: FsWatcher,
}

impl WatchHandle {
    pub fn command(&self, command: WatchCommand) -> Result<(), WatchError> {
        self.tx
            .send(WatchEvent::Command(command))
            .map_err(|_| WatchError::new(WatchErrorCode::Closed, "watch loop is gone"))
    }

    /// Read-only snapshot, answered by the reaction loop between reactions.
    pub fn status(&self) -> Result<StatusSnapshot, WatchError> {
        let (reply_tx, reply_rx) = channel();
        self.command(WatchCommand::Status(reply_tx))?;
        reply_rx
            .recv_timeout(STATUS_TIMEOUT)
            .map_err(|_| WatchError::new(WatchErrorCode::Closed, "status request timed out"))
    }

    /// Graceful stop: drain in-flight reactions, stop the poller and the
    /// filesystem watcher, join everything.
    pub fn shutdown(mut self) -> Result<(), WatchError> {
        let _ = self.command(WatchCommand::Quit);
        self.shutdown_flag.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                return Err(WatchError::new(
                    WatchErrorCode::Internal,
                    "a watch thread panicked",
                ));
            }
        }
        Ok(())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(WatchEvent::Command(WatchCommand::Quit));
    }
}

/// Start watching: a poller thread doing conditional fetches, a notify
/// watcher feeding the debounce thread, and the reaction loop owning all
/// mutable state.
pub fn spawn_watch(
    transport: Arc<dyn FlowTransport>,
    host: Arc<PluginHost>,
    paths: WatchPaths,
    opts: WatchOptions,
) -> Result<WatchHandle, WatchError> {
    std::fs::create_dir_all(&paths.tree)?;

    let (tx, rx) = channel::<WatchEvent>();
    let (raw_tx, raw_rx) = channel::<RawFsEvent>();
    let shutdown = Arc::new(AtomicBool::new(false));
    let paused = Arc::new(AtomicBool::new(false));
    let watcher_active = Arc::new(AtomicBool::new(true));

    let fs = start_fs_watcher(&paths.tree, raw_tx.clone(), Arc::clone(&watcher_active))?;

    let mut threads = Vec::new();

    {
        let transport = Arc::clone(&transport);
        let tx = tx.clone();
        let shutdown = Arc::clone(&shutdown);
        let paused = Arc::clone(&paused);
        let poll_interval = opts.poll_interval;
        threads.push(std::thread::spawn(move || {
            run_poller(&*transport, &tx, poll_interval, &shutdown, &paused);
        }));
    }

    {
        let tx = tx.clone();
        let shutdown = Arc::clone(&shutdown);
        let debounce = opts.debounce;
        threads.push(std::thread::spawn(move || {
            run_debounce(&raw_rx, &tx, debounce, &shutdown);
        }));
    }

    {
        let orchestrator = Orchestrator {
            transport,
            host,
            paths,
            opts,
            tx: tx.clone(),
            raw_tx,
            paused: Arc::clone(&paused),
            watcher_active,
            pause_reason: None,
            cycles: VecDeque::new(),
            failures: 0,
            unstable: 0,
            last_fetched: None,
            recent_modifiers: Vec::new(),
            activity: ActivityLog::new(),
        };
        threads.push(std::thread::spawn(move || orchestrator.run(&rx)));
    }

    Ok(WatchHandle {
        tx,
        shutdown_flag: shutdown,
        threads,
        _fs: fs,
    })
}

fn run_poller(
    transport: &dyn FlowTransport,
    tx: &Sender<WatchEvent>,
    poll_interval: Duration,
    shutdown: &AtomicBool,
    paused: &AtomicBool,
) {
    loop {
        let mut slept = Duration::ZERO;
        while slept < poll_interval {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let step = POLL_TICK.min(poll_interval - slept);
            std::thread::sleep(step);
            slept += step;
        }
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        if paused.load(Ordering::SeqCst) {
            continue;
        }
        let event = match transport.fetch(false) {
            Ok(FetchOutcome::Fresh(fresh)) => WatchEvent::RemoteUpdate(fresh),
            Ok(FetchOutcome::Unchanged) => continue,
            Err(e) => WatchEvent::RemoteFault(e),
        };
        if tx.send(event).is_err() {
            return;
        }
    }
}

struct Orchestrator {
    transport: Arc<dyn FlowTransport>,
    host: Arc<PluginHost>,
    paths: WatchPaths,
    opts: WatchOptions,
    tx: Sender<WatchEvent>,
    raw_tx: Sender<RawFsEvent>,
    paused: Arc<AtomicBool>,
    watcher_active: Arc<AtomicBool>,
    pause_reason: Option<PauseReason>,
    /// Timestamps of recent successful pushes, pruned to the cycle window.
    cycles: VecDeque<Instant>,
    failures: u32,
    unstable: usize,
    /// The document as last synchronized with the remote, for `check`.
    last_fetched: Option<Document>,
    /// Plugins that recently reported modifications; named when the loop
    /// pauses for oscillation.
    recent_modifiers: Vec<String>,
    activity: ActivityLog,
}

impl Orchestrator {
    fn run(mut self, rx: &Receiver<WatchEvent>) {
        info!(tree = %self.paths.tree.display(), "watch loop running");
        while let Ok(event) = rx.recv() {
            let keep_going = match event {
                WatchEvent::RemoteUpdate(fresh) => {
                    if !self.is_paused() {
                        self.apply_remote(fresh);
                    }
                    true
                }
                WatchEvent::LocalEdit { forced, continued } => {
                    self.apply_local_edit(forced, continued);
                    true
                }
                WatchEvent::RemoteFault(e) => {
                    if !self.is_paused() {
                        self.note_failure(format!("poll failed: {e}"));
                    }
                    true
                }
                WatchEvent::Command(command) => self.apply_command(command),
            };
            if !keep_going {
                break;
            }
        }
        info!("watch loop stopped");
    }

    /// Let queued native events drain while the gate is down, then forget
    /// any pending debounce state and lift the gate. Keeps the loop's own
    /// writes from reading back as operator edits.
    fn reopen_watcher(&self) {
        std::thread::sleep(WATCHER_SETTLE);
        let _ = self.raw_tx.send(RawFsEvent::ClearPending);
        self.watcher_active.store(true, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_paused(&mut self, reason: PauseReason, detail: impl Into<String>) {
        self.paused.store(true, Ordering::SeqCst);
        self.pause_reason = Some(reason);
        let detail = detail.into();
        warn!(reason = reason.as_str(), "{detail}");
        self.activity.record(detail);
    }

    fn clear_pause(&mut self) {
        self.paused.store(false, Ordering::SeqCst);
        self.pause_reason = None;
        self.cycles.clear();
        self.failures = 0;
    }

    fn note_failure(&mut self, detail: String) {
        self.failures += 1;
        error!("{detail}");
        self.activity.record(detail);
        if self.failures >= self.opts.failure_cap {
            self.set_paused(
                PauseReason::FailureCap,
                format!("paused after {} consecutive failures", self.failures),
            );
        }
    }

    /// RemoteUpdate reaction: gate the watcher, mirror the document to disk,
    /// explode, then lift the gate with pending edits cleared. A modified or
    /// unstable explode schedules a synthetic local edit so the stored
    /// document converges.
    fn apply_remote(&mut self, fresh: FreshDocument) {
        self.watcher_active.store(false, Ordering::SeqCst);
        let mut document = fresh.document;
        let rev = fresh.revision.as_deref().unwrap_or("?").to_string();

        let result = document
            .to_compact_json()
            .map_err(|e| flowtree_engine::EngineError::new(flowtree_engine::EngineErrorCode::Config, e.to_string()))
            .and_then(|body| atomic_write(&self.paths.document, format!("{body}\n").as_bytes()))
            .and_then(|()| {
                explode(
                    &mut document,
                    &self.paths.tree,
                    &self.host,
                    &ExplodeOptions {
                        orphans: self.opts.orphans,
                        document_path: Some(self.paths.document.clone()),
                        ..ExplodeOptions::default()
                    },
                )
            });

        // Forget anything the explode itself touched before reopening the
        // gate, so none of our own writes read back as operator edits.
        self.reopen_watcher();

        match result {
            Ok(report) => {
                self.failures = 0;
                self.unstable = report.unstable.len();
                for name in &report.modified_by {
                    if !self.recent_modifiers.contains(name) {
                        self.recent_modifiers.push(name.clone());
                    }
                }
                self.activity
                    .record(format!("downloaded rev {rev}, exploded {} nodes", report.node_count));
                self.last_fetched = Some(document);
                if report.needs_push() {
                    self.activity
                        .record("tree diverged from stored document, scheduling upload");
                    let _ = self.tx.send(WatchEvent::LocalEdit {
                        forced: false,
                        continued: true,
                    });
                }
            }
            Err(e) => self.note_failure(format!("explode failed: {e}")),
        }
    }

    /// LocalEdit reaction: rebuild the tree and push under the current
    /// revision. Every push outcome feeds the oscillation window or the
    /// pause logic.
    fn apply_local_edit(&mut self, forced: bool, continued: bool) {
        if self.is_paused() && !forced {
            self.activity.record("local edit ignored while paused");
            return;
        }
        // Pre-rebuild plugins may rewrite tree files; gate the watcher so
        // that never reads back as another operator edit.
        self.watcher_active.store(false, Ordering::SeqCst);
        let result = rebuild(
            &self.paths.tree,
            &self.host,
            &RebuildOptions {
                continued_from_explode: continued,
                new_files: self.opts.new_files,
                document_path: Some(self.paths.document.clone()),
                ..RebuildOptions::default()
            },
        );
        self.reopen_watcher();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.note_failure(format!("rebuild failed: {e}"));
                return;
            }
        };

        match self.push_with_rate_retry(&outcome.document) {
            Ok(push) => {
                let rev = push.revision.as_deref().unwrap_or("?").to_string();
                self.failures = 0;
                self.last_fetched = Some(outcome.document);
                self.activity.record(format!("uploaded rev {rev}"));
                self.record_cycle();
            }
            Err(e) => match e.code {
                RemoteErrorCode::Conflict => self.set_paused(
                    PauseReason::Conflict,
                    "push conflict: the server document moved, resolve and resume",
                ),
                _ => self.note_failure(format!("push failed: {e}")),
            },
        }
    }

    /// One retry after the rate window reopens; any second refusal goes back
    /// to the caller.
    fn push_with_rate_retry(&self, document: &Document) -> Result<PushOutcome, RemoteError> {
        match self.transport.push(document) {
            Err(e) if e.code == RemoteErrorCode::RateLimited => {
                let wait = self
                    .transport
                    .retry_after()
                    .min(RATE_RETRY_CEILING)
                    .max(Duration::from_millis(50));
                warn!(?wait, "push rate limited, waiting for the window");
                std::thread::sleep(wait);
                self.transport.push(document)
            }
            other => other,
        }
    }

    fn record_cycle(&mut self) {
        let now = Instant::now();
        self.cycles.push_back(now);
        let window = self.opts.cycle_window;
        while let Some(front) = self.cycles.front() {
            if now.duration_since(*front) > window {
                self.cycles.pop_front();
            } else {
                break;
            }
        }
        if self.cycles.len() > self.opts.cycle_limit {
            let implicated = if self.recent_modifiers.is_empty() {
                "no plugin reported modifications".to_string()
            } else {
                self.recent_modifiers.join(", ")
            };
            self.set_paused(
                PauseReason::Oscillation,
                format!(
                    "oscillation: {} push cycles in {:?} (implicated: {implicated})",
                    self.cycles.len(),
                    window
                ),
            );
        }
    }

    fn apply_command(&mut self, command: WatchCommand) -> bool {
        match command {
            WatchCommand::Download => {
                self.clear_pause();
                self.transport.clear_etag();
                match self.transport.fetch(true) {
                    Ok(FetchOutcome::Fresh(fresh)) => self.apply_remote(fresh),
                    Ok(FetchOutcome::Unchanged) => {
                        self.activity.record("download: remote unchanged");
                    }
                    Err(e) => self.note_failure(format!("download failed: {e}")),
                }
                true
            }
            WatchCommand::Upload => {
                self.clear_pause();
                self.apply_local_edit(true, false);
                true
            }
            WatchCommand::Check => {
                self.run_check();
                true
            }
            WatchCommand::Status(reply) => {
                let _ = reply.send(self.snapshot());
                true
            }
            WatchCommand::Pause => {
                self.set_paused(PauseReason::Operator, "paused by operator");
                true
            }
            WatchCommand::Resume => {
                self.clear_pause();
                self.activity.record("resumed by operator");
                true
            }
            WatchCommand::ReloadPlugins(host) => {
                self.host = host;
                self.activity.record("plugin host reloaded");
                true
            }
            WatchCommand::Quit => {
                self.activity.record("shutting down");
                false
            }
        }
    }

    /// Rebuild in memory and compare against the last synchronized document.
    /// Reports only; never pushes.
    fn run_check(&mut self) {
        self.watcher_active.store(false, Ordering::SeqCst);
        let result = rebuild(
            &self.paths.tree,
            &self.host,
            &RebuildOptions {
                continued_from_explode: false,
                new_files: self.opts.new_files,
                document_path: None,
                ..RebuildOptions::default()
            },
        );
        self.reopen_watcher();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.activity.record(format!("check failed: {e}"));
                return;
            }
        };
        match &self.last_fetched {
            None => self.activity.record("check: nothing fetched yet"),
            Some(last) => match diff_documents(last, &outcome.document) {
                None => self.activity.record("check: tree and document in sync"),
                Some(diff) => self
                    .activity
                    .record(format!("check: local changes at {diff}")),
            },
        }
    }

    fn snapshot(&mut self) -> StatusSnapshot {
        let now = Instant::now();
        let window = self.opts.cycle_window;
        let cycles_in_window = self
            .cycles
            .iter()
            .filter(|t| now.duration_since(**t) <= window)
            .count();
        StatusSnapshot {
            paused: self.is_paused(),
            pause_reason: self.pause_reason.map(PauseReason::as_str),
            transport: self.transport.stats(),
            unstable: self.unstable,
            cycles_in_window,
            consecutive_failures: self.failures,
            recent_activity: self.activity.recent(),
        }
    }
}
