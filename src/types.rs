use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline-unique identifier for a phase.
///
/// Phase ids come from the pipeline definition file and are treated as opaque
/// strings; serialization is transparent so ids can be used directly as JSON
/// map keys in the run document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(String);

impl PhaseId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of the phase id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhaseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Execution status of a phase within a run.
///
/// Transitions are monotonic: `pending → in_progress → (completed | blocked)`,
/// or externally forced to `skipped`. A phase never reverts from `completed`.
/// The transition rules live in the state store; this enum only knows which
/// states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Blocked,
}

impl PhaseStatus {
    /// Returns the string representation of the status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
        }
    }

    /// Whether this status is terminal (no further transitions allowed)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Blocked)
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk bands produced by the task classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Workflow mode selected for a phase.
///
/// `StrictLoop` requires iterative write/verify/refine evidence in the worker
/// output; `Light` accepts a single pass. The mode is fixed at first
/// invocation and never changes on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowMode {
    #[serde(rename = "strict-loop")]
    StrictLoop,
    #[serde(rename = "light")]
    Light,
}

impl WorkflowMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StrictLoop => "strict-loop",
            Self::Light => "light",
        }
    }
}

impl std::fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one phase.
///
/// Produced once per phase and persisted in the run document; retries and
/// resumes reuse the stored result rather than re-classifying (mode flapping
/// between attempts would change the contract mid-phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Accumulated complexity score (time + lexical + shape signals)
    pub complexity_score: u32,
    /// Risk band derived from the score
    pub risk_level: RiskLevel,
    /// Workflow mode the contract is resolved under
    pub workflow_mode: WorkflowMode,
}

/// Outcome of checking worker output against a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when every required marker was found
    pub passed: bool,
    /// Markers absent from the output, in contract order.
    /// Synthetic markers (e.g. `<no completion marker>`) are appended last.
    pub missing: Vec<String>,
}

impl ValidationReport {
    /// A report with no missing markers
    #[must_use]
    pub const fn passing() -> Self {
        Self {
            passed: true,
            missing: Vec::new(),
        }
    }
}

/// Structured facts scraped from raw worker output.
///
/// Extraction is best-effort: evidence phrased differently from the patterns
/// is simply not found, and an empty result never fails a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFacts {
    /// Path-looking tokens mentioned in the output
    pub files_touched: Vec<String>,
    /// Sub-task identifiers the worker reported finishing
    pub completed_ids: Vec<String>,
    /// First plausible summary line of the output
    pub summary: Option<String>,
}

/// Accepted worker output for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResult {
    /// Raw response text, unmodified
    pub raw_output: String,
    /// Heuristically extracted facts
    pub facts: ExtractedFacts,
    /// Attempt number that passed validation (1-based)
    pub accepted_attempt: u32,
}

/// Event types recorded in the run history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Started,
    Retry,
    Escalated,
    Completed,
    Skipped,
    Blocked,
}

impl EventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Retry => "retry",
            Self::Escalated => "escalated",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
        }
    }
}

/// Append-only audit record in the run document.
///
/// History events are never mutated or deleted; the store only appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    /// RFC3339 UTC timestamp when the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Phase the event belongs to
    pub phase_id: PhaseId,
    /// What happened
    pub event_type: EventType,
    /// Wall-clock duration in fractional minutes, for completion events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
}

/// Point-in-time derived summary of run progress.
///
/// Always recomputed from the store contents, never incrementally patched, so
/// concurrent completions within a parallel group can never leave a stale
/// aggregate behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Number of phases with status `completed`
    pub completed_count: usize,
    /// Total number of phases in the pipeline
    pub total_count: usize,
    /// `round(completed_count / total_count * 100)`; 0 for an empty pipeline
    pub percentage: u32,
    /// Wall-clock minutes recorded across phases that have run (terminal
    /// phases that started, retries included)
    pub actual_minutes_spent: f64,
    /// Sum of estimates across all phases
    pub estimated_minutes_total: u32,
    /// `round(estimate_of_completed / actual * 100)`; None when no time
    /// has been recorded yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficiency_percent: Option<u32>,
    /// Sum of estimates for phases still `pending` or `in_progress`
    pub remaining_minutes_estimate: u32,
}

/// Error kinds for CLI error reporting (snake_case on the wire)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CliArgs,
    MalformedPipeline,
    UnknownRole,
    StateCorrupt,
    LockHeld,
    WorkerTimeout,
    WorkerFailure,
    Unknown,
}

/// Per-phase line in the status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStatusInfo {
    /// Phase identifier
    pub phase_id: PhaseId,
    /// Current status string ("pending", "in_progress", ...)
    pub status: PhaseStatus,
    /// Workflow mode, once the phase has been classified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_mode: Option<WorkflowMode>,
    /// Wall-clock minutes, once the phase reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_minutes: Option<f64>,
}

/// Status output structure for JSON emission (schema status.v1)
///
/// Used by `pipewright status --json`. Field names are snake_case; the
/// persisted run document keeps its own camelCase contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusJsonOutput {
    /// Schema version for this status format (e.g. "status.v1")
    pub schema_version: String,
    /// RFC3339 UTC timestamp when the status was emitted
    pub emitted_at: DateTime<Utc>,
    /// Run identifier
    pub run_id: String,
    /// Pipeline identifier from the definition file
    pub pipeline_id: String,
    /// Per-phase statuses in pipeline order
    pub phases: Vec<PhaseStatusInfo>,
    /// Derived progress snapshot
    pub snapshot: ProgressSnapshot,
    /// Phase the runner would resume from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase_id: Option<PhaseId>,
    /// True once every phase is terminal
    pub ready_to_archive: bool,
}

/// Final run summary for JSON emission (schema run-summary.v1)
///
/// Used by `pipewright run --json` and `pipewright resume --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummaryJsonOutput {
    /// Schema version for this summary format (e.g. "run-summary.v1")
    pub schema_version: String,
    /// Run identifier
    pub run_id: String,
    /// Pipeline identifier from the definition file
    pub pipeline_id: String,
    /// "completed" when every phase is terminal, "paused" after an abort
    pub outcome: String,
    /// Derived progress snapshot at exit
    pub snapshot: ProgressSnapshot,
}
