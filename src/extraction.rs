//! Best-effort fact extraction from raw worker output
//!
//! Workers return free-form text; this module scrapes it for structured
//! facts: artifact paths the worker claims to have touched, sub-task
//! identifiers it reports finishing, and a one-line summary.
//!
//! # Design Philosophy
//!
//! Extraction is deliberately cheap and fallible:
//! - Match well-formed patterns reliably, skip everything else
//! - Never block phase completion on extraction results; only the
//!   validation gate can fail a phase
//! - Bound every output list so a pathological response cannot bloat the
//!   run document
//!
//! Evidence phrased differently from these patterns is simply not found.
//! That failure mode is accepted: the facts feed progress notes and the
//! artifact-evidence heuristic, not correctness decisions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ExtractedFacts;

/// Upper bound on extracted files and identifiers (each list)
const MAX_ITEMS: usize = 32;

/// Upper bound on the extracted summary length in characters
const SUMMARY_MAX_CHARS: usize = 200;

/// Path-looking tokens with a known source/document extension.
/// The fixed extension list keeps version numbers ("v1.2") and
/// abbreviations ("e.g.") from matching.
static FILE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b[\w./-]*\w\.(?:rs|ts|tsx|js|jsx|mjs|py|go|rb|java|kt|sql|toml|yaml|yml|json|md|txt|css|scss|html|sh|proto)\b",
    )
    .unwrap()
});

/// Checked checkbox items: `- [x] 2.1 Wire the adapter`
static CHECKED_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*]\s+\[[xX]\]\s+(.+)$").unwrap());

/// Explicit completion lists: `Completed: T1, T2` or `Done: 1.2, 1.3`
static COMPLETED_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:completed|done)\s*:\s*(.+)$").unwrap());

/// Explicit summary lines: `Summary: wired the adapter`
static SUMMARY_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:summary|outcome)\s*:\s*(.+)$").unwrap());

/// Extract structured facts from raw worker output.
///
/// Every list is deduplicated in first-seen order and capped at a fixed
/// size. An empty result is normal for outputs that phrase their evidence
/// differently.
#[must_use]
pub fn extract_facts(output: &str) -> ExtractedFacts {
    ExtractedFacts {
        files_touched: extract_files(output),
        completed_ids: extract_completed_ids(output),
        summary: extract_summary(output),
    }
}

/// Whether the output mentions at least one artifact path.
///
/// Used by the validation gate for roles whose output is expected to
/// reference source artifacts.
#[must_use]
pub fn contains_artifact_reference(output: &str) -> bool {
    FILE_PATH_RE.is_match(output)
}

fn extract_files(output: &str) -> Vec<String> {
    let mut files = Vec::new();
    for m in FILE_PATH_RE.find_iter(output) {
        push_unique(&mut files, m.as_str().to_string());
        if files.len() >= MAX_ITEMS {
            break;
        }
    }
    files
}

fn extract_completed_ids(output: &str) -> Vec<String> {
    let mut ids = Vec::new();

    // Checked checkbox items; keep the leading token when it looks like an
    // identifier, otherwise the whole item text
    for cap in CHECKED_ITEM_RE.captures_iter(output) {
        let item = cap[1].trim();
        push_unique(&mut ids, identifier_for_item(item));
        if ids.len() >= MAX_ITEMS {
            return ids;
        }
    }

    // Comma-separated completion lists
    for cap in COMPLETED_LINE_RE.captures_iter(output) {
        for id in cap[1].split(',') {
            let id = id.trim();
            if !id.is_empty() {
                push_unique(&mut ids, truncate(id, 80));
            }
            if ids.len() >= MAX_ITEMS {
                return ids;
            }
        }
    }

    ids
}

/// Leading tokens like "2.1" or "T12" identify the item; prose items are
/// kept whole (truncated)
fn identifier_for_item(item: &str) -> String {
    static ID_TOKEN_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(?:[Tt]?\d+(?:\.\d+)*)\b").unwrap());

    match ID_TOKEN_RE.find(item) {
        Some(m) => m.as_str().to_string(),
        None => truncate(item, 80),
    }
}

fn extract_summary(output: &str) -> Option<String> {
    if let Some(cap) = SUMMARY_LINE_RE.captures(output) {
        return Some(truncate(cap[1].trim(), SUMMARY_MAX_CHARS));
    }

    // Fall back to the first non-empty line
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate(line, SUMMARY_MAX_CHARS))
}

fn push_unique(items: &mut Vec<String>, candidate: String) {
    if !items.contains(&candidate) {
        items.push(candidate);
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
