//! Run-directory locking with advisory semantics and crash recovery
//!
//! One live process per run: `run` and `resume` take an exclusive lock on
//! the run directory before touching the state document. The lock is
//! advisory and coordinates pipewright processes; it is not a security
//! boundary. A lock left behind by a dead process is taken over
//! automatically.

use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::paths;

/// Lock information stored in the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Timestamp when the lock was created (seconds since UNIX epoch)
    pub created_at: u64,
    /// Run being locked
    pub run_id: String,
    /// pipewright version that created the lock
    pub version: String,
}

/// Lock errors for run lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Run '{run_id}' is locked by PID {pid} (created {created_ago} ago)")]
    Held {
        run_id: String,
        pid: u32,
        created_ago: String,
    },

    #[error("Lock file is corrupted or invalid: {reason}")]
    Corrupt { reason: String },

    #[error("Failed to acquire lock: {reason}")]
    Acquisition { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive lock over one run directory, released on drop
pub struct RunLock {
    lock_path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl RunLock {
    /// Acquire the lock for `run_id`, creating `run_dir` if needed.
    ///
    /// Takeover rules: a lock whose owning process is gone is replaced; an
    /// empty lock file (writer crashed between create and write) is
    /// replaced; a lock held by a live process is an error.
    pub fn acquire(run_dir: &Utf8Path, run_id: &str) -> Result<Self, LockError> {
        paths::ensure_dir_all(run_dir).map_err(|e| LockError::Acquisition {
            reason: format!("failed to create run directory {run_dir}: {e}"),
        })?;

        let lock_path = paths::run_lock_path(run_dir);

        // One takeover round at most: create, inspect, maybe replace, create
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(lock_path.as_std_path())
            {
                Ok(file) => return Self::finalize(lock_path, file, run_id),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::clear_if_stale(&lock_path, run_id)?;
                }
                Err(e) => {
                    return Err(LockError::Acquisition {
                        reason: format!("failed to create lock file {lock_path}: {e}"),
                    });
                }
            }
        }

        Err(LockError::Acquisition {
            reason: format!("lock for run '{run_id}' was re-acquired by another process"),
        })
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    fn finalize(lock_path: Utf8PathBuf, file: fs::File, run_id: &str) -> Result<Self, LockError> {
        let info = LockInfo {
            pid: process::id(),
            created_at: unix_now_secs(),
            run_id: run_id.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let json = serde_json::to_string_pretty(&info).map_err(|e| LockError::Acquisition {
            reason: format!("failed to serialize lock info: {e}"),
        })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let fd_lock = rw_lock.try_write().map_err(|_| LockError::Held {
                run_id: run_id.to_string(),
                pid: 0,
                created_ago: "unknown".to_string(),
            })?;
            let mut file_ref = &*fd_lock;
            file_ref
                .write_all(json.as_bytes())
                .map_err(LockError::Io)?;
            file_ref.sync_all().map_err(LockError::Io)?;
        }

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            info,
        })
    }

    /// Inspect an existing lock file; remove it when it cannot represent a
    /// live holder.
    fn clear_if_stale(lock_path: &Utf8Path, run_id: &str) -> Result<(), LockError> {
        let content = match fs::read_to_string(lock_path.as_std_path()) {
            Ok(content) => content,
            // Vanished between create_new and read; caller retries
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(LockError::Corrupt {
                    reason: format!("failed to read {lock_path}: {e}"),
                });
            }
        };

        // A zero-length file means the writer crashed between create and
        // write; finalize syncs immediately after create
        if content.trim().is_empty() {
            warn!(run_id, "removing empty lock file left by a crashed process");
            return Self::remove_lock_file(lock_path);
        }

        let existing: LockInfo =
            serde_json::from_str(&content).map_err(|e| LockError::Corrupt {
                reason: format!("failed to parse {lock_path}: {e}"),
            })?;

        if is_process_running(existing.pid) {
            return Err(LockError::Held {
                run_id: run_id.to_string(),
                pid: existing.pid,
                created_ago: format_age(existing.created_at),
            });
        }

        warn!(
            run_id,
            pid = existing.pid,
            "taking over lock from dead process"
        );
        Self::remove_lock_file(lock_path)
    }

    fn remove_lock_file(lock_path: &Utf8Path) -> Result<(), LockError> {
        match fs::remove_file(lock_path.as_std_path()) {
            Ok(()) => Ok(()),
            // Another process got there first
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::Acquisition {
                reason: format!("failed to remove stale lock {lock_path}: {e}"),
            }),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self._fd_lock.take();
        if self.lock_path.as_std_path().exists() {
            let _ = fs::remove_file(self.lock_path.as_std_path());
        }
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Check if a process with the given PID is still running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // kill(pid, 0): 0 when the process exists, EPERM when it exists
        // but we cannot signal it, ESRCH when it is gone
        let rc = unsafe { libc::kill(pid as i32, 0) };
        if rc == 0 {
            true
        } else {
            matches!(
                io::Error::last_os_error().raw_os_error(),
                Some(code) if code == libc::EPERM
            )
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        // Conservative fallback: never take over
        true
    }
}

/// Human-readable age of a lock for error messages
fn format_age(created_at: u64) -> String {
    let age = unix_now_secs().saturating_sub(created_at);
    if age < 60 {
        format!("{age}s")
    } else if age < 3600 {
        format!("{}m", age / 60)
    } else if age < 86400 {
        format!("{}h", age / 3600)
    } else {
        format!("{}d", age / 86400)
    }
}
