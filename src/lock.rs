//! PID-file mutual exclusion between overlapping deploy runs.
//!
//! The check-then-write is advisory, not a kernel lock: two
//! runs starting in the same instant can both pass the check.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    #[must_use]
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    /// Parse a lock file body. A bare integer pid is accepted
    /// as well as the JSON record.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        if let Ok(record) = serde_json::from_str::<Self>(content) {
            return Some(record);
        }
        content.trim().parse::<u32>().ok().map(|pid| Self {
            pid,
            acquired_at: DateTime::<Utc>::UNIX_EPOCH,
        })
    }
}

/// Held for the duration of a deploy run. Dropping the guard
/// removes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    record: LockRecord,
}

impl LockGuard {
    /// Try to take the lock at `path`.
    ///
    /// Returns `Ok(None)` when another live process holds it.
    /// A lock whose pid is gone, or whose content cannot be
    /// parsed, is discarded and replaced. So is one recording our
    /// own pid, left by an earlier process whose pid was reused.
    pub fn acquire(path: &Path) -> DeployResult<Option<Self>> {
        if let Some(existing) = read_record(path)? {
            if existing.pid != std::process::id() && pid_alive(existing.pid) {
                tracing::info!(
                    pid = existing.pid,
                    since = %existing.acquired_at,
                    "another deploy is running, skipping"
                );
                return Ok(None);
            }
            tracing::warn!(pid = existing.pid, "removing stale lock");
            remove_if_exists(path)?;
        } else if path.exists() {
            tracing::warn!(path = %path.display(), "removing unreadable lock");
            remove_if_exists(path)?;
        }

        let record = LockRecord::current();
        write_record(path, &record)?;
        tracing::debug!(path = %path.display(), pid = record.pid, "lock acquired");

        Ok(Some(Self {
            path: path.to_path_buf(),
            record,
        }))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Release explicitly, reporting removal errors that `Drop`
    /// would swallow.
    pub fn release(self) -> DeployResult<()> {
        let path = self.path.clone();
        std::mem::forget(self);
        remove_if_exists(&path)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock");
        }
    }
}

/// Remove the lock at `path` only if it records `pid`. Used
/// from the signal handler, where no guard is reachable.
pub fn release_if_owned(path: &Path, pid: u32) -> DeployResult<bool> {
    match read_record(path)? {
        Some(record) if record.pid == pid => {
            remove_if_exists(path)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Remove our lock and exit 130 on SIGINT, SIGTERM or SIGHUP.
/// An in-flight container rebuild is not rolled back.
pub fn release_on_signal(path: &Path) -> DeployResult<()> {
    let path = path.to_path_buf();
    let pid = std::process::id();
    ctrlc::set_handler(move || {
        match release_if_owned(&path, pid) {
            Ok(true) => tracing::warn!("interrupted, lock released"),
            Ok(false) => tracing::warn!("interrupted"),
            Err(e) => tracing::error!(error = %e, "interrupted, failed to release lock"),
        }
        std::process::exit(130);
    })
    .map_err(|e| DeployError::Lock(format!("cannot install signal handler: {e}")))
}

/// Whether a process with this pid exists.
#[must_use]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        return proc_root.join(pid.to_string()).exists();
    }
    crate::cmd::succeeds(None, "kill", &["-0", &pid.to_string()])
}

fn read_record(path: &Path) -> DeployResult<Option<LockRecord>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(LockRecord::parse(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DeployError::Lock(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

fn write_record(path: &Path, record: &LockRecord) -> DeployResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec(record)?;
    fs::write(path, bytes)
        .map_err(|e| DeployError::Lock(format!("cannot write {}: {e}", path.display())))
}

fn remove_if_exists(path: &Path) -> DeployResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
