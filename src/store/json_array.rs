// src/store/json_array.rs
//! Records live inside one JSON array in one file, one serialized record
//! per line. Multiple writers (including writers in other processes) may
//! append concurrently, so every append takes a lock marker file first:
//! create-new is atomic on every platform we care about, waiters poll with
//! a bounded retry sleep, and a marker older than `stale_after` is broken
//! so a killed writer cannot block the file forever.
//!
//! The append itself truncates at the closing `]`, writes a separator and
//! the new record, and rewrites the delimiter, so the file parses as a
//! valid array whenever no writer holds the lock. If the closing delimiter
//! is missing (a writer died mid-step), the record is appended with a
//! corrected tail instead of being dropped.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_POLL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_POLLS: u32 = 100;
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct JsonArrayStore {
    path: PathBuf,
    lock_path: PathBuf,
    poll: Duration,
    max_polls: u32,
    stale_after: Duration,
}

impl JsonArrayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            poll: DEFAULT_POLL,
            max_polls: DEFAULT_MAX_POLLS,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Override lock timing; used by tests and by deployments with slower
    /// storage.
    pub fn with_lock_params(mut self, poll: Duration, max_polls: u32, stale_after: Duration) -> Self {
        self.poll = poll;
        self.max_polls = max_polls;
        self.stale_after = stale_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Append one record under the lock marker. The marker is released by
    /// a drop guard on every path out of this function, including append
    /// failures.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record).context("serializing record")?;
        let _guard = LockGuard::acquire(&self.lock_path, self.poll, self.max_polls, self.stale_after)?;
        self.append_locked(&line)
    }

    /// Append from async code: the lock wait and the file rewrite run on
    /// the blocking pool, so a contended lock never parks a runtime worker
    /// and sibling cycle tasks keep making progress.
    pub async fn append_async<T: Serialize>(&self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record).context("serializing record")?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = LockGuard::acquire(
                &store.lock_path,
                store.poll,
                store.max_polls,
                store.stale_after,
            )?;
            store.append_locked(&line)
        })
        .await
        .map_err(|e| anyhow::anyhow!("store append task failed: {e}"))?
    }

    fn append_locked(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        if !self.path.exists() {
            return fs::write(&self.path, format!("[\n{line}\n]"))
                .with_context(|| format!("creating {}", self.path.display()));
        }

        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut content = String::new();
        f.read_to_string(&mut content)
            .with_context(|| format!("reading {}", self.path.display()))?;

        match content.rfind(']') {
            Some(pos) => {
                // Insert before the closing delimiter; the first record
                // after a bare `[` takes no separator.
                let sep = if content[..pos].trim_end().ends_with('[') {
                    ""
                } else {
                    ",\n"
                };
                f.set_len(pos as u64)
                    .with_context(|| format!("truncating {}", self.path.display()))?;
                f.seek(SeekFrom::End(0))?;
                write!(f, "{sep}{line}\n]")
                    .with_context(|| format!("appending to {}", self.path.display()))?;
            }
            None => {
                // Closing delimiter lost (writer killed mid-append).
                // Best-effort corrected tail rather than losing the write.
                warn!(path = %self.path.display(), "array tail missing, repairing");
                f.seek(SeekFrom::End(0))?;
                let sep = if content.trim_end().ends_with('[') || content.trim().is_empty() {
                    ""
                } else {
                    ",\n"
                };
                write!(f, "{sep}{line}\n]")
                    .with_context(|| format!("repair-appending to {}", self.path.display()))?;
            }
        }
        Ok(())
    }
}

/// Exclusive lock marker. Created with `create_new` (atomic), removed on
/// drop so the marker goes away on every exit path of the holder.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: &Path, poll: Duration, max_polls: u32, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let mut attempts = 0u32;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(path, stale_after) && takeover_stale_lock(path, stale_after) {
                        warn!(lock = %path.display(), "breaking stale lock marker");
                        continue;
                    }
                    attempts += 1;
                    if attempts > max_polls {
                        bail!(
                            "lock {} still held after {} polls",
                            path.display(),
                            max_polls
                        );
                    }
                    std::thread::sleep(poll);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("creating lock marker {}", path.display()))
                }
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Claim a stale marker without racing other waiters: rename it to a
/// unique tombstone first. Only the waiter whose rename succeeds proceeds;
/// plain remove would let two waiters that both saw the marker stale
/// delete each other's freshly created locks. The tombstone's age is
/// re-checked after the rename in case the stale marker was replaced by a
/// live one in between; a fresh tombstone is put back.
fn takeover_stale_lock(path: &Path, stale_after: Duration) -> bool {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let mut tomb = path.as_os_str().to_os_string();
    tomb.push(format!(".stale.{}.{nanos}", std::process::id()));
    if fs::rename(path, &tomb).is_err() {
        // another waiter already claimed it
        return false;
    }
    if !lock_is_stale(Path::new(&tomb), stale_after) {
        let _ = fs::rename(&tomb, path);
        return false;
    }
    let _ = fs::remove_file(&tomb);
    true
}

fn lock_is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        // marker vanished between observation and now
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    matches!(modified.elapsed(), Ok(age) if age > stale_after)
}
