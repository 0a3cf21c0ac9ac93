//! Retry/escalation controller
//!
//! Wraps a single phase's execution in a bounded retry loop:
//! `Invoking -> Validating -> {Accepted | Retrying | Escalated}`. On a
//! failed validation the worker is re-invoked with feedback naming the
//! exact missing markers; when the attempt budget is exhausted the loop
//! terminates in `Escalated` and the decision moves to a human.
//!
//! The controller never touches the state store. It returns an outcome
//! and the runner commits the resulting status transition, so a phase is
//! only ever marked completed after passing the validation gate.

use tracing::{debug, info, warn};

use crate::contracts::Contract;
use crate::escalation::EscalationContext;
use crate::extraction;
use crate::gate;
use crate::types::WorkerResult;
use crate::worker::{WorkerBackend, WorkerError, WorkerRequest};

/// Default attempt budget per phase execution
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry bookkeeping for one phase execution. Owned by the controller
/// while the loop runs, discarded once the phase reaches a terminal
/// status.
#[derive(Debug)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub feedback_history: Vec<String>,
}

impl RetryState {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            feedback_history: Vec::new(),
        }
    }

    /// Fresh attempt budget that keeps the feedback trail from an earlier
    /// exhausted loop. Used when a human answers an escalation with
    /// `retry`.
    #[must_use]
    pub fn renewed(max_attempts: u32, feedback_history: Vec<String>) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            feedback_history,
        }
    }

    fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Terminal result of one controller loop
#[derive(Debug)]
pub enum PhaseOutcome {
    /// Output passed the gate; carries the accepted result
    Accepted(WorkerResult),
    /// Attempt budget exhausted; a human decision is required
    Escalated(EscalationContext),
}

impl PhaseOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Run one phase through the bounded retry loop.
///
/// Worker transport failures (timeout, spawn failure, non-zero exit) are
/// folded into the retry path as validation failures rather than
/// surfaced as errors; they consume attempts from the same budget.
pub async fn execute_phase(
    backend: &dyn WorkerBackend,
    base_request: &WorkerRequest,
    contract: &Contract,
    mut retry: RetryState,
) -> PhaseOutcome {
    let mut last_missing: Vec<String> = Vec::new();

    while !retry.exhausted() {
        retry.attempt += 1;
        debug!(
            phase_id = %base_request.phase_id,
            attempt = retry.attempt,
            max_attempts = retry.max_attempts,
            "invoking worker"
        );

        let request = base_request
            .clone()
            .with_feedback_history(retry.feedback_history.clone());

        let (raw_output, report, transport) = match backend.invoke(&request).await {
            Ok(text) => {
                debug!(
                    phase_id = %base_request.phase_id,
                    attempt = retry.attempt,
                    output_hash = %output_digest(&text),
                    "worker response received"
                );
                let report = gate::validate(&text, contract);
                (text, report, None)
            }
            Err(e) => {
                warn!(
                    phase_id = %base_request.phase_id,
                    attempt = retry.attempt,
                    error = %e,
                    "worker invocation failed; entering retry path"
                );
                (String::new(), gate::timeout_report(), Some(e))
            }
        };

        if report.passed {
            info!(
                phase_id = %base_request.phase_id,
                attempt = retry.attempt,
                "validation passed"
            );
            let facts = extraction::extract_facts(&raw_output);
            debug!(
                phase_id = %base_request.phase_id,
                files_touched = facts.files_touched.len(),
                completed_ids = facts.completed_ids.len(),
                has_summary = facts.summary.is_some(),
                "extracted evidence facts"
            );
            return PhaseOutcome::Accepted(WorkerResult {
                raw_output,
                facts,
                accepted_attempt: retry.attempt,
            });
        }

        info!(
            phase_id = %base_request.phase_id,
            attempt = retry.attempt,
            missing = ?report.missing,
            "validation failed"
        );

        let feedback = match &transport {
            // Timeouts are not distinguished from content failures here
            Some(WorkerError::Timeout { .. }) | None => feedback_for(&report.missing),
            Some(other) => format!("worker failure: {other}"),
        };
        retry.feedback_history.push(feedback);
        last_missing = report.missing;
    }

    warn!(
        phase_id = %base_request.phase_id,
        attempts = retry.attempt,
        "attempt budget exhausted; escalating"
    );
    PhaseOutcome::Escalated(EscalationContext {
        phase_id: base_request.phase_id.clone(),
        attempts_made: retry.attempt,
        last_missing,
        feedback_history: retry.feedback_history,
    })
}

fn feedback_for(missing: &[String]) -> String {
    format!("missing: {}", missing.join(", "))
}

/// Short blake3 digest used to correlate a logged response with an
/// external transcript. Raw output never goes into the log itself.
fn output_digest(text: &str) -> String {
    let hex = blake3::hash(text.as_bytes()).to_hex();
    hex.as_str()[..16].to_string()
}
