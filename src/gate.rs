//! Validation gate for worker output
//!
//! Checks raw worker output against a role contract by literal,
//! case-sensitive substring containment. The gate never judges whether
//! the work is *correct*; it verifies that required disclosure is
//! *present*. Marker matching over free text is deliberately crude: a
//! worker that phrases its evidence differently from the exact marker
//! string fails and retries with feedback naming what was missing.
//!
//! Two quality heuristics apply independently of role markers:
//! - the output must carry a completion indicator
//! - roles that produce source artifacts must reference at least one
//!
//! Heuristic failures surface as synthetic markers in the `missing` list
//! so the retry controller can report every gap uniformly.

use crate::contracts::Contract;
use crate::extraction;
use crate::types::ValidationReport;

/// Synthetic marker reported when output lacks any completion indicator.
/// Also used for worker timeouts, which yield no output at all.
pub const NO_COMPLETION_MARKER: &str = "<no completion marker>";

/// Synthetic marker reported when an artifact-producing role's output
/// references no files
pub const NO_ARTIFACT_REFERENCE: &str = "<no artifact reference>";

/// Accepted completion indicators. Substring containment, so "complete"
/// also covers "completed".
pub const COMPLETION_MARKERS: &[&str] = &[
    "✅",
    "complete",
    "Complete",
    "done",
    "Done",
    "finished",
    "Finished",
];

/// Validate worker output against a contract.
///
/// Pure function of its two arguments. Role markers are checked in
/// contract order; synthetic heuristic markers are appended after them.
#[must_use]
pub fn validate(output_text: &str, contract: &Contract) -> ValidationReport {
    let mut missing: Vec<String> = contract
        .markers
        .iter()
        .filter(|marker| !output_text.contains(marker.as_str()))
        .cloned()
        .collect();

    if !has_completion_marker(output_text) {
        missing.push(NO_COMPLETION_MARKER.to_string());
    }

    if contract.expects_artifacts && !extraction::contains_artifact_reference(output_text) {
        missing.push(NO_ARTIFACT_REFERENCE.to_string());
    }

    ValidationReport {
        passed: missing.is_empty(),
        missing,
    }
}

/// The report produced for a timed-out invocation: no output means no
/// completion marker, and the failure enters the normal retry path.
#[must_use]
pub fn timeout_report() -> ValidationReport {
    ValidationReport {
        passed: false,
        missing: vec![NO_COMPLETION_MARKER.to_string()],
    }
}

fn has_completion_marker(output_text: &str) -> bool {
    COMPLETION_MARKERS
        .iter()
        .any(|marker| output_text.contains(marker))
}
