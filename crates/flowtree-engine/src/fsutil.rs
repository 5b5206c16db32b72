// SPDX-License-Identifier: Apache-2.0

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flowtree_model::MAX_NODE_FILE_BYTES;

use crate::error::{EngineError, EngineErrorCode};

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

fn sync_dir(dir: &Path) -> Result<(), EngineError> {
    // Directory fsync is not available everywhere; opening read-only and
    // syncing is the portable best effort.
    if let Ok(f) = OpenOptions::new().read(true).open(dir) {
        let _ = f.sync_all();
    }
    Ok(())
}

/// Write-to-temp then rename so readers never observe a torn file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::io(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;
    let tmp = path.with_extension("tmp");
    write_and_sync(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    sync_dir(parent)?;
    Ok(())
}

/// Timestamped copy next to the original; `None` when there is nothing to
/// back up yet.
pub fn create_backup(path: &Path) -> Result<Option<PathBuf>, EngineError> {
    if !path.exists() {
        return Ok(None);
    }
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::io(format!("unusable path {}", path.display())))?;
    let backup = path.with_file_name(format!("{name}.bak.{epoch}"));
    fs::copy(path, &backup)?;
    Ok(Some(backup))
}

/// Read a per-node file, refusing anything over the size limit.
pub fn read_limited(path: &Path) -> Result<Vec<u8>, EngineError> {
    let len = fs::metadata(path)?.len();
    if len > MAX_NODE_FILE_BYTES as u64 {
        return Err(EngineError::new(
            EngineErrorCode::Config,
            format!(
                "{} is {len} bytes, per-file limit is {MAX_NODE_FILE_BYTES}",
                path.display()
            ),
        ));
    }
    Ok(fs::read(path)?)
}

/// Reject paths that escape the tree root. Both sides are canonicalized, so
/// the target must exist.
pub fn ensure_within(root: &Path, path: &Path) -> Result<PathBuf, EngineError> {
    let root = root.canonicalize()?;
    let resolved = path.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(EngineError::new(
            EngineErrorCode::Config,
            format!("{} escapes the tree root", path.display()),
        ));
    }
    Ok(resolved)
}

/// Every regular file under `root`, depth first, sorted for determinism.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        entries.sort();
        for entry in entries {
            if entry.is_dir() {
                stack.push(entry);
            } else if entry.is_file() {
                out.push(entry);
            }
        }
    }
    out.sort();
    Ok(out)
}
