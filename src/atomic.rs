//! Atomic file writes for state documents
//!
//! The run document is rewritten on every phase transition; a crash mid
//! write must never leave a truncated document behind. Writes go to a
//! temporary file in the target directory, are fsynced, then renamed over
//! the target.

use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;
use tempfile::NamedTempFile;

/// Atomically write `content` to `path` via temp file + fsync + rename.
///
/// Line endings are normalized to LF and the parent directory is created
/// if missing.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> io::Result<()> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)?;

    temp_file.write_all(normalized.as_bytes())?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| e.error)?;
    Ok(())
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
