//! Filesystem layout for persisted run state
//!
//! Everything pipewright persists lives under a single home directory:
//! `$PIPEWRIGHT_HOME` when set, otherwise `.pipewright/` in the current
//! directory. Each run gets its own directory holding the state document
//! and the run lock.

use camino::{Utf8Path, Utf8PathBuf};

/// Environment override for the state home directory
pub const HOME_ENV: &str = "PIPEWRIGHT_HOME";

const DEFAULT_HOME: &str = ".pipewright";

/// Resolve the state home:
/// 1) env `PIPEWRIGHT_HOME` (opt-in for users/CI)
/// 2) default ".pipewright"
#[must_use]
pub fn home_dir() -> Utf8PathBuf {
    match std::env::var(HOME_ENV) {
        Ok(p) if !p.trim().is_empty() => Utf8PathBuf::from(p),
        _ => Utf8PathBuf::from(DEFAULT_HOME),
    }
}

/// Returns `<home>/runs`
#[must_use]
pub fn runs_root(home: &Utf8Path) -> Utf8PathBuf {
    home.join("runs")
}

/// Returns `<home>/runs/<run_id>`
#[must_use]
pub fn run_dir(home: &Utf8Path, run_id: &str) -> Utf8PathBuf {
    runs_root(home).join(run_id)
}

/// The per-run state document
#[must_use]
pub fn run_document_path(run_dir: &Utf8Path) -> Utf8PathBuf {
    run_dir.join("run.json")
}

/// The per-run advisory lock file
#[must_use]
pub fn run_lock_path(run_dir: &Utf8Path) -> Utf8PathBuf {
    run_dir.join("run.lock")
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}
