// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::PluginError;
use crate::plugin::{FlowPlugin, PluginResult, PluginSpec};
use crate::stage::Stage;

const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(300);

/// External formatter invocation, treated as an opaque subprocess. A non-zero
/// exit or spawn failure is a plugin error and is isolated by the host; it is
/// never interpreted as a data-integrity failure.
#[derive(Debug, Clone)]
pub struct FormatCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl FormatCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_SUBPROCESS_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, target: &Path) -> Result<(), PluginError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PluginError::new(format!("spawn {}: {e}", self.program)))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(PluginError::new(format!(
                        "{} exited with {status}",
                        self.program
                    )));
                }
                Ok(None) => {
                    if started.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PluginError::new(format!(
                            "{} timed out after {:?}",
                            self.program, self.timeout
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(PluginError::new(format!("wait {}: {e}", self.program))),
            }
        }
    }
}

/// Digest of every regular file under `root` (sorted walk), used to decide
/// whether the formatter changed anything.
fn tree_digest(root: &Path) -> Result<[u8; 32], PluginError> {
    let mut hasher = Sha256::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if !dir.is_dir() {
            if dir.is_file() {
                digest_file(&mut hasher, root, &dir)?;
            }
            continue;
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        entries.sort();
        for entry in entries {
            if entry.is_dir() {
                stack.push(entry);
            } else {
                digest_file(&mut hasher, root, &entry)?;
            }
        }
    }
    let mut out = [0_u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Ok(out)
}

fn digest_file(hasher: &mut Sha256, root: &Path, path: &Path) -> Result<(), PluginError> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    hasher.update(rel.to_string_lossy().as_bytes());
    hasher.update([0]);
    hasher.update(std::fs::read(path)?);
    Ok(())
}

/// Post-explode (300): format the exploded tree in place.
pub struct FormatTreePlugin {
    command: FormatCommand,
}

impl FormatTreePlugin {
    #[must_use]
    pub fn new(command: FormatCommand) -> Self {
        Self { command }
    }
}

impl FlowPlugin for FormatTreePlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("format-tree", Stage::PostExplode, 300)
    }

    fn post_explode(&self, tree: &Path, _document_path: Option<&Path>) -> PluginResult<bool> {
        let before = tree_digest(tree)?;
        self.command.run(tree)?;
        Ok(tree_digest(tree)? != before)
    }
}

/// Pre-rebuild (400): re-run the formatter so hand-edited files enter the
/// rebuild in canonical shape. Redundant straight after an explode, so it
/// opts out of that case.
pub struct FormatCheckPlugin {
    command: FormatCommand,
}

impl FormatCheckPlugin {
    #[must_use]
    pub fn new(command: FormatCommand) -> Self {
        Self { command }
    }
}

impl FlowPlugin for FormatCheckPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("format-check", Stage::PreRebuild, 400)
    }

    fn pre_rebuild(&self, tree: &Path, continued_from_explode: bool) -> PluginResult<bool> {
        if continued_from_explode {
            return Ok(false);
        }
        let before = tree_digest(tree)?;
        self.command.run(tree)?;
        Ok(tree_digest(tree)? != before)
    }
}

/// Post-rebuild (500): format the reassembled document file.
pub struct FormatDocumentPlugin {
    command: FormatCommand,
}

impl FormatDocumentPlugin {
    #[must_use]
    pub fn new(command: FormatCommand) -> Self {
        Self { command }
    }
}

impl FlowPlugin for FormatDocumentPlugin {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new("format-document", Stage::PostRebuild, 500)
    }

    fn post_rebuild(&self, document_path: &Path) -> PluginResult<bool> {
        let before = std::fs::read(document_path)?;
        self.command.run(document_path)?;
        Ok(std::fs::read(document_path)? != before)
    }
}
