//! Progress state store: the single source of truth for a run
//!
//! One JSON document per run (`run.json` in the run directory) holds phase
//! statuses, timestamps, extracted evidence, derived progress metadata, and
//! an append-only history log. The store is the only writer of phase status;
//! the runner owns the store and commits transitions sequentially, so
//! concurrent completions inside a parallel group never interleave writes.
//!
//! Every mutation recomputes the derived fields (`meta`, `currentPhaseId`,
//! `readyToArchive`) from the full document and persists atomically. Nothing
//! derived is ever patched incrementally, so a crash between commits leaves a
//! document that is stale but never inconsistent.
//!
//! Status transitions are monotonic per phase:
//! `pending → in_progress → (completed | skipped | blocked)`, with
//! `pending → skipped` and `pending → blocked` for phases that are skipped
//! or dependency-blocked before they start. A terminal phase never changes
//! again. Same-status transitions are accepted as no-ops.

use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atomic;
use crate::error::StoreError;
use crate::metrics::{self, PhaseReading};
use crate::paths;
use crate::pipeline::Pipeline;
use crate::types::{
    ClassificationResult, EventType, HistoryEvent, PhaseId, PhaseStatus, PhaseStatusInfo,
    ProgressSnapshot, WorkerResult,
};

/// Schema version written to and required from every run document
pub const RUN_SCHEMA_VERSION: &str = "run.v1";

/// Persisted per-phase record inside the run document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    /// Current status
    pub status: PhaseStatus,
    /// Estimate from the pipeline definition, kept here so metrics can be
    /// recomputed from the document alone
    pub estimated_minutes: u32,
    /// Classification, fixed at first invocation; `resume` reuses it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    /// When the phase entered `in_progress`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the phase reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock minutes from `started_at` to terminal, retries included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_minutes: Option<f64>,
    /// File paths scraped from accepted worker output
    pub files_touched: Vec<String>,
    /// Newline-joined progress notes (retry feedback, summaries, decisions)
    pub notes: String,
}

impl PhaseRecord {
    fn new(estimated_minutes: u32) -> Self {
        Self {
            status: PhaseStatus::Pending,
            estimated_minutes,
            classification: None,
            started_at: None,
            completed_at: None,
            actual_minutes: None,
            files_touched: Vec::new(),
            notes: String::new(),
        }
    }
}

/// Derived progress totals, recomputed on every commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub completed_count: usize,
    pub total_count: usize,
    pub percentage: u32,
    pub actual_minutes_total: f64,
    pub estimated_minutes_total: u32,
}

/// The full persisted run document (camelCase on the wire)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDocument {
    /// Always [`RUN_SCHEMA_VERSION`]; anything else is rejected at load
    pub schema_version: String,
    /// Pipeline id from the definition file
    pub pipeline_id: String,
    /// Path the definition was loaded from
    pub pipeline_path: String,
    /// `blake3:<hex>` of the definition text, for drift detection on resume
    pub pipeline_checksum: String,
    /// Phase ids in pipeline declaration order
    pub phase_order: Vec<PhaseId>,
    /// Per-phase records, keyed by phase id
    pub phases: BTreeMap<PhaseId, PhaseRecord>,
    /// Derived totals
    pub meta: RunMeta,
    /// Append-only audit log; never mutated or truncated
    pub history: Vec<HistoryEvent>,
    /// First non-terminal phase in pipeline order; `null` once all terminal
    pub current_phase_id: Option<PhaseId>,
    /// True once every phase is terminal
    pub ready_to_archive: bool,
}

/// Handle over one run's persisted document.
///
/// All mutating methods recompute derived fields and write the document
/// atomically before returning. Callers serialize access by ownership: the
/// runner holds the store exclusively for the duration of a run.
#[derive(Debug)]
pub struct RunStore {
    run_id: String,
    document_path: Utf8PathBuf,
    doc: RunDocument,
}

impl RunStore {
    /// Create a fresh run document for `pipeline` under `run_dir`.
    ///
    /// Every phase starts `pending`. Fails if a document already exists at
    /// the target path.
    pub fn create(
        run_dir: &Utf8Path,
        run_id: &str,
        pipeline: &Pipeline,
        pipeline_path: &str,
    ) -> Result<Self, StoreError> {
        let document_path = paths::run_document_path(run_dir);
        if document_path.as_std_path().exists() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("run document already exists at {document_path}"),
            )));
        }

        let mut phases = BTreeMap::new();
        let mut phase_order = Vec::with_capacity(pipeline.phases().len());
        for phase in pipeline.phases() {
            phase_order.push(phase.id.clone());
            phases.insert(phase.id.clone(), PhaseRecord::new(phase.estimated_minutes));
        }

        let doc = RunDocument {
            schema_version: RUN_SCHEMA_VERSION.to_string(),
            pipeline_id: pipeline.id.clone(),
            pipeline_path: pipeline_path.to_string(),
            pipeline_checksum: format!("blake3:{}", pipeline.source_checksum),
            phase_order,
            phases,
            meta: RunMeta {
                completed_count: 0,
                total_count: 0,
                percentage: 0,
                actual_minutes_total: 0.0,
                estimated_minutes_total: 0,
            },
            history: Vec::new(),
            current_phase_id: None,
            ready_to_archive: false,
        };

        let mut store = Self {
            run_id: run_id.to_string(),
            document_path,
            doc,
        };
        store.commit()?;
        debug!(run_id, path = %store.document_path, "created run document");
        Ok(store)
    }

    /// Open an existing run document.
    ///
    /// # Errors
    /// `NotFound` when no document exists for the run; `Corrupt` when the
    /// document cannot be parsed or fails integrity checks.
    pub fn open(run_dir: &Utf8Path, run_id: &str) -> Result<Self, StoreError> {
        let document_path = paths::run_document_path(run_dir);
        let text = match fs::read_to_string(document_path.as_std_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    run_id: run_id.to_string(),
                    path: document_path.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let doc: RunDocument = serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            path: document_path.to_string(),
            reason: e.to_string(),
        })?;

        if doc.schema_version != RUN_SCHEMA_VERSION {
            return Err(StoreError::Corrupt {
                path: document_path.to_string(),
                reason: format!(
                    "unsupported schemaVersion {:?} (expected {RUN_SCHEMA_VERSION:?})",
                    doc.schema_version
                ),
            });
        }
        if doc.phase_order.len() != doc.phases.len()
            || doc.phase_order.iter().any(|id| !doc.phases.contains_key(id))
        {
            return Err(StoreError::Corrupt {
                path: document_path.to_string(),
                reason: "phaseOrder does not match the phases map".to_string(),
            });
        }

        Ok(Self {
            run_id: run_id.to_string(),
            document_path,
            doc,
        })
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn document_path(&self) -> &Utf8Path {
        &self.document_path
    }

    /// The full document, for `view --json`
    #[must_use]
    pub const fn document(&self) -> &RunDocument {
        &self.doc
    }

    #[must_use]
    pub fn status_of(&self, phase_id: &PhaseId) -> Option<PhaseStatus> {
        self.doc.phases.get(phase_id).map(|r| r.status)
    }

    #[must_use]
    pub fn phase_record(&self, phase_id: &PhaseId) -> Option<&PhaseRecord> {
        self.doc.phases.get(phase_id)
    }

    /// Stored classification for a phase, if it was ever classified
    #[must_use]
    pub fn classification(&self, phase_id: &PhaseId) -> Option<ClassificationResult> {
        self.doc
            .phases
            .get(phase_id)
            .and_then(|r| r.classification)
    }

    /// Move a phase to `new_status`, recording timestamps, evidence, and the
    /// matching history event, then persist.
    ///
    /// A same-status transition is an accepted no-op. Anything that is not a
    /// forward move in the status lattice is `InvalidTransition`.
    pub fn transition(
        &mut self,
        phase_id: &PhaseId,
        new_status: PhaseStatus,
        evidence: Option<&WorkerResult>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let record = self
            .doc
            .phases
            .get_mut(phase_id)
            .ok_or_else(|| StoreError::UnknownPhase {
                phase: phase_id.to_string(),
            })?;
        let from = record.status;

        if from == new_status {
            debug!(phase = %phase_id, status = %new_status, "transition no-op");
            return Ok(());
        }
        if !is_transition_allowed(from, new_status) {
            return Err(StoreError::InvalidTransition {
                phase: phase_id.to_string(),
                from: from.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        record.status = new_status;
        let mut duration_minutes = None;
        if new_status == PhaseStatus::InProgress {
            record.started_at = Some(now);
        }
        if new_status.is_terminal() {
            if let Some(started) = record.started_at {
                let minutes = minutes_between(started, now);
                record.actual_minutes = Some(minutes);
                duration_minutes = Some(minutes);
            }
            record.completed_at = Some(now);
        }

        if let Some(result) = evidence {
            for file in &result.facts.files_touched {
                if !record.files_touched.contains(file) {
                    record.files_touched.push(file.clone());
                }
            }
            if let Some(summary) = &result.facts.summary {
                push_note(record, summary);
            }
        }

        if let Some(event_type) = event_for(new_status) {
            self.doc.history.push(HistoryEvent {
                timestamp: now,
                phase_id: phase_id.clone(),
                event_type,
                duration_minutes,
            });
        }

        debug!(phase = %phase_id, from = %from, to = %new_status, "phase transition");
        self.commit()
    }

    /// Append a mid-phase history event (retry, escalated), then persist
    pub fn append_event(
        &mut self,
        phase_id: &PhaseId,
        event_type: EventType,
    ) -> Result<(), StoreError> {
        if !self.doc.phases.contains_key(phase_id) {
            return Err(StoreError::UnknownPhase {
                phase: phase_id.to_string(),
            });
        }
        self.doc.history.push(HistoryEvent {
            timestamp: Utc::now(),
            phase_id: phase_id.clone(),
            event_type,
            duration_minutes: None,
        });
        self.commit()
    }

    /// Append a progress note to a phase, then persist
    pub fn note(&mut self, phase_id: &PhaseId, text: &str) -> Result<(), StoreError> {
        let record = self
            .doc
            .phases
            .get_mut(phase_id)
            .ok_or_else(|| StoreError::UnknownPhase {
                phase: phase_id.to_string(),
            })?;
        push_note(record, text);
        self.commit()
    }

    /// Record a phase's classification. Write-once: a later call with a
    /// result already stored is a no-op, so retries and resumes can never
    /// flap the workflow mode.
    pub fn set_classification(
        &mut self,
        phase_id: &PhaseId,
        result: ClassificationResult,
    ) -> Result<(), StoreError> {
        let record = self
            .doc
            .phases
            .get_mut(phase_id)
            .ok_or_else(|| StoreError::UnknownPhase {
                phase: phase_id.to_string(),
            })?;
        if record.classification.is_some() {
            return Ok(());
        }
        record.classification = Some(result);
        self.commit()
    }

    /// Derived progress snapshot, recomputed from the document on every call
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        metrics::compute_snapshot(&self.readings())
    }

    /// Per-phase status lines in pipeline order, for status output
    #[must_use]
    pub fn phase_status_list(&self) -> Vec<PhaseStatusInfo> {
        self.doc
            .phase_order
            .iter()
            .filter_map(|id| {
                self.doc.phases.get(id).map(|r| PhaseStatusInfo {
                    phase_id: id.clone(),
                    status: r.status,
                    workflow_mode: r.classification.map(|c| c.workflow_mode),
                    actual_minutes: r.actual_minutes,
                })
            })
            .collect()
    }

    fn readings(&self) -> Vec<PhaseReading> {
        self.doc
            .phase_order
            .iter()
            .filter_map(|id| self.doc.phases.get(id))
            .map(|r| PhaseReading {
                status: r.status,
                estimated_minutes: r.estimated_minutes,
                actual_minutes: r.actual_minutes,
            })
            .collect()
    }

    /// Recompute derived fields and write the document atomically
    fn commit(&mut self) -> Result<(), StoreError> {
        let snapshot = self.snapshot();
        self.doc.meta = RunMeta {
            completed_count: snapshot.completed_count,
            total_count: snapshot.total_count,
            percentage: snapshot.percentage,
            actual_minutes_total: snapshot.actual_minutes_spent,
            estimated_minutes_total: snapshot.estimated_minutes_total,
        };
        self.doc.current_phase_id = self
            .doc
            .phase_order
            .iter()
            .find(|id| {
                self.doc
                    .phases
                    .get(*id)
                    .is_some_and(|r| !r.status.is_terminal())
            })
            .cloned();
        self.doc.ready_to_archive =
            !self.doc.phases.is_empty() && self.doc.current_phase_id.is_none();

        let json = serde_json::to_string_pretty(&self.doc).map_err(|e| StoreError::Corrupt {
            path: self.document_path.to_string(),
            reason: format!("failed to serialize run document: {e}"),
        })?;
        atomic::write_file_atomic(&self.document_path, &json).map_err(StoreError::Io)
    }
}

/// Forward moves in the per-phase status lattice
const fn is_transition_allowed(from: PhaseStatus, to: PhaseStatus) -> bool {
    use PhaseStatus::{Blocked, Completed, InProgress, Pending, Skipped};
    matches!(
        (from, to),
        (Pending, InProgress | Skipped | Blocked) | (InProgress, Completed | Skipped | Blocked)
    )
}

fn event_for(status: PhaseStatus) -> Option<EventType> {
    match status {
        PhaseStatus::InProgress => Some(EventType::Started),
        PhaseStatus::Completed => Some(EventType::Completed),
        PhaseStatus::Skipped => Some(EventType::Skipped),
        PhaseStatus::Blocked => Some(EventType::Blocked),
        PhaseStatus::Pending => None,
    }
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 60_000.0
    }
}

fn push_note(record: &mut PhaseRecord, text: &str) {
    if !record.notes.is_empty() {
        record.notes.push('\n');
    }
    record.notes.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractedFacts;
    use tempfile::TempDir;

    const TOML: &str = r#"
id = "checkout-flow"

[[phase]]
id = "schema"
role = "schema-design"
estimated_minutes = 30
task = "Design the orders table"

[[phase]]
id = "api"
role = "api-design"
estimated_minutes = 60
task = "Design the orders endpoints"

[[phase]]
id = "impl"
role = "implementation"
estimated_minutes = 90
task = "Implement order placement"
"#;

    fn fixture(td: &TempDir) -> (Utf8PathBuf, Pipeline) {
        let dir = Utf8PathBuf::from_path_buf(td.path().join("runs/checkout-1")).unwrap();
        let pipeline = Pipeline::from_toml_str("pipeline.toml", TOML).unwrap();
        (dir, pipeline)
    }

    fn result_with(files: &[&str], summary: Option<&str>) -> WorkerResult {
        WorkerResult {
            raw_output: String::new(),
            facts: ExtractedFacts {
                files_touched: files.iter().map(|s| (*s).to_string()).collect(),
                completed_ids: Vec::new(),
                summary: summary.map(ToString::to_string),
            },
            accepted_attempt: 1,
        }
    }

    #[test]
    fn test_create_starts_all_phases_pending() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);

        let store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();
        assert_eq!(
            store.status_of(&PhaseId::new("schema")),
            Some(PhaseStatus::Pending)
        );
        assert_eq!(store.document().meta.total_count, 3);
        assert_eq!(store.document().meta.completed_count, 0);
        assert_eq!(store.document().meta.estimated_minutes_total, 180);
        assert_eq!(
            store.document().current_phase_id,
            Some(PhaseId::new("schema"))
        );
        assert!(!store.document().ready_to_archive);
        assert!(store.document_path().as_std_path().exists());
    }

    #[test]
    fn test_create_refuses_to_overwrite() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);

        let _store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();
        let err = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_document_uses_camel_case_keys() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);

        let store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();
        let raw = fs::read_to_string(store.document_path().as_std_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(json["schemaVersion"], "run.v1");
        assert_eq!(json["pipelineId"], "checkout-flow");
        assert!(json["pipelineChecksum"]
            .as_str()
            .unwrap()
            .starts_with("blake3:"));
        assert_eq!(json["meta"]["completedCount"], 0);
        assert_eq!(json["meta"]["estimatedMinutesTotal"], 180);
        assert_eq!(json["readyToArchive"], false);
        assert_eq!(json["currentPhaseId"], "schema");
        assert_eq!(json["phases"]["schema"]["status"], "pending");
        assert_eq!(json["phases"]["schema"]["estimatedMinutes"], 30);
        assert_eq!(json["phaseOrder"][0], "schema");
    }

    #[test]
    fn test_start_sets_timestamp_and_history() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();

        let record = store.phase_record(&schema).unwrap();
        assert_eq!(record.status, PhaseStatus::InProgress);
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_none());

        let history = &store.document().history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_type, EventType::Started);
        assert_eq!(history[0].phase_id, schema);
    }

    #[test]
    fn test_complete_records_duration_and_meta() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();
        store
            .transition(
                &schema,
                PhaseStatus::Completed,
                Some(&result_with(&["migrations/001_orders.sql"], Some("Orders table designed"))),
            )
            .unwrap();

        let record = store.phase_record(&schema).unwrap();
        assert_eq!(record.status, PhaseStatus::Completed);
        assert!(record.completed_at.is_some());
        assert!(record.actual_minutes.is_some());
        assert_eq!(record.files_touched, vec!["migrations/001_orders.sql"]);
        assert!(record.notes.contains("Orders table designed"));

        assert_eq!(store.document().meta.completed_count, 1);
        assert_eq!(store.document().meta.percentage, 33);
        assert_eq!(store.document().current_phase_id, Some(PhaseId::new("api")));

        let completed_event = store
            .document()
            .history
            .iter()
            .find(|e| e.event_type == EventType::Completed)
            .unwrap();
        assert!(completed_event.duration_minutes.is_some());
    }

    #[test]
    fn test_same_status_transition_is_a_noop() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();
        let events_before = store.document().history.len();
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();
        assert_eq!(store.document().history.len(), events_before);
    }

    #[test]
    fn test_completed_is_final() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();
        store
            .transition(&schema, PhaseStatus::Completed, None)
            .unwrap();

        for target in [
            PhaseStatus::Pending,
            PhaseStatus::InProgress,
            PhaseStatus::Skipped,
            PhaseStatus::Blocked,
        ] {
            let err = store.transition(&schema, target, None).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidTransition { .. }),
                "expected InvalidTransition for completed -> {target}"
            );
        }
        assert_eq!(store.status_of(&schema), Some(PhaseStatus::Completed));
    }

    #[test]
    fn test_pending_cannot_jump_to_completed() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let err = store
            .transition(&PhaseId::new("schema"), PhaseStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_skip_from_pending_has_no_duration() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let api = PhaseId::new("api");
        store.transition(&api, PhaseStatus::Skipped, None).unwrap();

        let record = store.phase_record(&api).unwrap();
        assert_eq!(record.status, PhaseStatus::Skipped);
        assert!(record.actual_minutes.is_none());
        assert!(record.completed_at.is_some());
        assert!(record.started_at.is_none());
    }

    #[test]
    fn test_block_from_pending_for_dependency_cascade() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        store
            .transition(&PhaseId::new("impl"), PhaseStatus::Blocked, None)
            .unwrap();
        assert_eq!(
            store.status_of(&PhaseId::new("impl")),
            Some(PhaseStatus::Blocked)
        );
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let err = store
            .transition(&PhaseId::new("nope"), PhaseStatus::InProgress, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownPhase { .. }));
    }

    #[test]
    fn test_open_round_trips_state() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        {
            let mut store =
                RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();
            let schema = PhaseId::new("schema");
            store
                .transition(&schema, PhaseStatus::InProgress, None)
                .unwrap();
            store
                .transition(&schema, PhaseStatus::Completed, None)
                .unwrap();
        }

        let reopened = RunStore::open(&dir, "checkout-1").unwrap();
        assert_eq!(
            reopened.status_of(&PhaseId::new("schema")),
            Some(PhaseStatus::Completed)
        );
        assert_eq!(reopened.document().meta.completed_count, 1);
        assert_eq!(reopened.document().history.len(), 2);
        assert_eq!(
            reopened.document().current_phase_id,
            Some(PhaseId::new("api"))
        );
    }

    #[test]
    fn test_open_missing_run_is_not_found() {
        let td = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("runs/ghost-1")).unwrap();

        let err = RunStore::open(&dir, "ghost-1").unwrap_err();
        match err {
            StoreError::NotFound { run_id, .. } => assert_eq!(run_id, "ghost-1"),
            other => panic!("expected NotFound, got: {other}"),
        }
    }

    #[test]
    fn test_open_garbage_is_corrupt() {
        let td = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("runs/bad-1")).unwrap();
        paths::ensure_dir_all(&dir).unwrap();
        fs::write(
            paths::run_document_path(&dir).as_std_path(),
            "{ this is not json",
        )
        .unwrap();

        let err = RunStore::open(&dir, "bad-1").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_open_rejects_unknown_schema_version() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let raw = fs::read_to_string(store.document_path().as_std_path()).unwrap();
        let tampered = raw.replace("run.v1", "run.v9");
        fs::write(store.document_path().as_std_path(), tampered).unwrap();

        let err = RunStore::open(&dir, "checkout-1").unwrap_err();
        match err {
            StoreError::Corrupt { reason, .. } => assert!(reason.contains("schemaVersion")),
            other => panic!("expected Corrupt, got: {other}"),
        }
    }

    #[test]
    fn test_ready_to_archive_when_all_terminal() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        for id in ["schema", "api"] {
            let id = PhaseId::new(id);
            store.transition(&id, PhaseStatus::InProgress, None).unwrap();
            store.transition(&id, PhaseStatus::Completed, None).unwrap();
        }
        assert!(!store.document().ready_to_archive);

        store
            .transition(&PhaseId::new("impl"), PhaseStatus::Skipped, None)
            .unwrap();
        assert!(store.document().ready_to_archive);
        assert!(store.document().current_phase_id.is_none());
        assert_eq!(store.document().meta.percentage, 67);
    }

    #[test]
    fn test_classification_is_write_once() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        let first = ClassificationResult {
            complexity_score: 1,
            risk_level: crate::types::RiskLevel::Low,
            workflow_mode: crate::types::WorkflowMode::Light,
        };
        let second = ClassificationResult {
            complexity_score: 9,
            risk_level: crate::types::RiskLevel::High,
            workflow_mode: crate::types::WorkflowMode::StrictLoop,
        };

        store.set_classification(&schema, first).unwrap();
        store.set_classification(&schema, second).unwrap();
        assert_eq!(store.classification(&schema), Some(first));
    }

    #[test]
    fn test_append_event_records_retries() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();
        store.append_event(&schema, EventType::Retry).unwrap();
        store.append_event(&schema, EventType::Escalated).unwrap();

        let kinds: Vec<EventType> = store
            .document()
            .history
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![EventType::Started, EventType::Retry, EventType::Escalated]
        );
    }

    #[test]
    fn test_notes_accumulate_lines() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store.note(&schema, "retry 2: missing B").unwrap();
        store.note(&schema, "accepted on attempt 2").unwrap();
        assert_eq!(
            store.phase_record(&schema).unwrap().notes,
            "retry 2: missing B\naccepted on attempt 2"
        );
    }

    #[test]
    fn test_evidence_files_are_deduplicated() {
        let td = TempDir::new().unwrap();
        let (dir, pipeline) = fixture(&td);
        let mut store = RunStore::create(&dir, "checkout-1", &pipeline, "pipeline.toml").unwrap();

        let schema = PhaseId::new("schema");
        store
            .transition(&schema, PhaseStatus::InProgress, None)
            .unwrap();
        store
            .transition(
                &schema,
                PhaseStatus::Completed,
                Some(&result_with(&["a.sql", "a.sql", "b.sql"], None)),
            )
            .unwrap();
        assert_eq!(
            store.phase_record(&schema).unwrap().files_touched,
            vec!["a.sql", "b.sql"]
        );
    }

    #[test]
    fn test_transition_lattice() {
        use PhaseStatus::{Blocked, Completed, InProgress, Pending, Skipped};
        assert!(is_transition_allowed(Pending, InProgress));
        assert!(is_transition_allowed(Pending, Skipped));
        assert!(is_transition_allowed(Pending, Blocked));
        assert!(is_transition_allowed(InProgress, Completed));
        assert!(is_transition_allowed(InProgress, Skipped));
        assert!(is_transition_allowed(InProgress, Blocked));

        assert!(!is_transition_allowed(Pending, Completed));
        assert!(!is_transition_allowed(InProgress, Pending));
        for from in [Completed, Skipped, Blocked] {
            for to in [Pending, InProgress, Completed, Skipped, Blocked] {
                if from != to {
                    assert!(!is_transition_allowed(from, to), "{from} -> {to}");
                }
            }
        }
    }
}
