//! Schedule execution against a run store
//!
//! The runner walks the pipeline's execution units in declaration order.
//! A single-phase unit runs inline; a parallel group fans out on a
//! `JoinSet` and joins as a barrier, so no later unit starts until every
//! member has resolved. All store writes happen on the runner task after
//! the barrier: group members compute outcomes, the runner commits them.
//!
//! Escalated phases are resolved sequentially after accepted work is
//! committed. `abort` returns immediately with the run paused; whatever
//! was already committed stays committed, and phases left `in_progress`
//! are picked up again on resume.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::classifier;
use crate::contracts::{self, Contract};
use crate::controller::{self, PhaseOutcome, RetryState};
use crate::error::PipewrightError;
use crate::escalation::{EscalationContext, EscalationDecision, EscalationHandler};
use crate::logging;
use crate::pipeline::{ExecutionUnit, Phase, Pipeline};
use crate::store::RunStore;
use crate::types::{EventType, PhaseId, PhaseStatus, WorkerResult};
use crate::worker::{WorkerBackend, WorkerRequest};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every phase reached a terminal status
    Completed,
    /// The run halted with work remaining; state is preserved for resume
    Paused,
}

impl RunOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Paused => "paused",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control flow after one execution unit
#[derive(Debug, PartialEq, Eq)]
enum UnitFlow {
    Continue,
    Halt,
}

/// How one escalated phase was settled
#[derive(Debug, PartialEq, Eq)]
enum EscalationResolution {
    Resolved,
    Halt,
}

/// Everything needed to dispatch one phase: the rendered request and the
/// contract its output is validated against. Built once per phase so
/// retries and escalation re-runs see the identical task text.
struct PreparedPhase {
    id: PhaseId,
    request: WorkerRequest,
    contract: Contract,
}

/// Drives one run of a pipeline
pub struct Runner {
    pipeline: Arc<Pipeline>,
    backend: Arc<dyn WorkerBackend>,
    escalation: Arc<dyn EscalationHandler>,
    max_attempts: u32,
}

impl Runner {
    #[must_use]
    pub fn new(
        pipeline: Arc<Pipeline>,
        backend: Arc<dyn WorkerBackend>,
        escalation: Arc<dyn EscalationHandler>,
        max_attempts: u32,
    ) -> Self {
        Self {
            pipeline,
            backend,
            escalation,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Execute the schedule until it is exhausted or an abort halts it.
    ///
    /// Safe to call on a store from an earlier interrupted run: phases
    /// already at a terminal status are never re-dispatched, and a phase
    /// left `in_progress` by a crash or abort runs again from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error when a store write fails; worker and validation
    /// failures are handled inside the retry/escalation loop instead.
    pub async fn run(&self, store: &mut RunStore) -> Result<RunOutcome, PipewrightError> {
        info!(
            run_id = %store.run_id(),
            pipeline = %self.pipeline.id,
            units = self.pipeline.execution_units().len(),
            "starting run"
        );

        for unit in self.pipeline.execution_units() {
            if self.run_unit(store, unit).await? == UnitFlow::Halt {
                warn!(run_id = %store.run_id(), "run paused");
                return Ok(RunOutcome::Paused);
            }
        }

        let snapshot = store.snapshot();
        let outcome = if store.document().ready_to_archive {
            RunOutcome::Completed
        } else {
            RunOutcome::Paused
        };
        info!(
            run_id = %store.run_id(),
            completed = snapshot.completed_count,
            total = snapshot.total_count,
            percentage = snapshot.percentage,
            outcome = %outcome,
            "run finished"
        );
        Ok(outcome)
    }

    async fn run_unit(
        &self,
        store: &mut RunStore,
        unit: &ExecutionUnit,
    ) -> Result<UnitFlow, PipewrightError> {
        // Resume support: terminal phases are settled history
        let pending: Vec<&Phase> = self
            .members_of(unit)
            .into_iter()
            .filter(|p| !store.status_of(&p.id).is_some_and(|s| s.is_terminal()))
            .collect();
        if pending.is_empty() {
            debug!("execution unit already settled; skipping");
            return Ok(UnitFlow::Continue);
        }

        // Gate on explicit dependencies before any dispatch
        let mut ready: Vec<PreparedPhase> = Vec::new();
        for phase in pending {
            if let Some(reason) = dependency_block(store, phase) {
                warn!(phase_id = %phase.id, reason = %reason, "phase blocked");
                store.note(&phase.id, &reason)?;
                store.transition(&phase.id, PhaseStatus::Blocked, None)?;
            } else {
                ready.push(self.prepare(store, phase)?);
            }
        }
        if ready.is_empty() {
            return Ok(UnitFlow::Continue);
        }

        let order: Vec<PhaseId> = ready.iter().map(|p| p.id.clone()).collect();
        for prepared in &ready {
            store.transition(&prepared.id, PhaseStatus::InProgress, None)?;
        }

        let mut settled: Vec<(PreparedPhase, PhaseOutcome)> = match unit {
            ExecutionUnit::Single(_) => {
                let mut out = Vec::with_capacity(ready.len());
                for prepared in ready {
                    let outcome = controller::execute_phase(
                        self.backend.as_ref(),
                        &prepared.request,
                        &prepared.contract,
                        RetryState::new(self.max_attempts),
                    )
                    .instrument(logging::phase_span(store.run_id(), prepared.id.as_str()))
                    .await;
                    out.push((prepared, outcome));
                }
                out
            }
            ExecutionUnit::Group { name, .. } => {
                self.dispatch_group(store.run_id(), name, ready).await
            }
        };

        // Commit in declaration order, accepted work first, so snapshots
        // and history are deterministic regardless of completion order.
        settled.sort_by_key(|(p, _)| order.iter().position(|id| *id == p.id));

        let mut escalated: Vec<(PreparedPhase, EscalationContext)> = Vec::new();
        for (prepared, outcome) in settled {
            match outcome {
                PhaseOutcome::Accepted(result) => {
                    self.commit_accepted(store, &prepared.id, &result)?;
                }
                PhaseOutcome::Escalated(context) => escalated.push((prepared, context)),
            }
        }

        for (prepared, context) in escalated {
            let resolution = self.resolve_escalation(store, &prepared, context).await?;
            if resolution == EscalationResolution::Halt {
                return Ok(UnitFlow::Halt);
            }
        }

        Ok(UnitFlow::Continue)
    }

    /// Fan a group out onto tasks and join them all: the barrier. A
    /// member that fails to join is logged and left `in_progress` for
    /// the next resume to retry.
    async fn dispatch_group(
        &self,
        run_id: &str,
        group: &str,
        ready: Vec<PreparedPhase>,
    ) -> Vec<(PreparedPhase, PhaseOutcome)> {
        info!(group = %group, members = ready.len(), "dispatching parallel group");

        let mut join_set: JoinSet<(PreparedPhase, PhaseOutcome)> = JoinSet::new();
        for prepared in ready {
            let backend = Arc::clone(&self.backend);
            let max_attempts = self.max_attempts;
            let span = logging::phase_span(run_id, prepared.id.as_str());
            join_set.spawn(
                async move {
                    let outcome = controller::execute_phase(
                        backend.as_ref(),
                        &prepared.request,
                        &prepared.contract,
                        RetryState::new(max_attempts),
                    )
                    .await;
                    (prepared, outcome)
                }
                .instrument(span),
            );
        }

        let mut settled = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => settled.push(pair),
                Err(e) => warn!(group = %group, error = %e, "group member failed to join"),
            }
        }
        settled
    }

    /// Resolve the classification and contract for a phase and render its
    /// request. Classification is read back from the store when present
    /// so a resumed phase keeps the contract it started under.
    fn prepare(
        &self,
        store: &mut RunStore,
        phase: &Phase,
    ) -> Result<PreparedPhase, PipewrightError> {
        let classification = match store.classification(&phase.id) {
            Some(existing) => {
                debug!(
                    phase_id = %phase.id,
                    mode = %existing.workflow_mode,
                    "reusing stored classification"
                );
                existing
            }
            None => {
                let fresh = classifier::classify(
                    phase.role,
                    &phase.task_description,
                    phase.estimated_minutes,
                );
                info!(
                    phase_id = %phase.id,
                    score = fresh.complexity_score,
                    risk = fresh.risk_level.as_str(),
                    mode = %fresh.workflow_mode,
                    "phase classified"
                );
                store.set_classification(&phase.id, fresh)?;
                fresh
            }
        };

        let contract = contracts::contract_for(phase.role, classification.workflow_mode);
        let request = WorkerRequest::new(
            phase.id.clone(),
            phase.role,
            compose_task(&phase.task_description, &contract),
        )
        .with_context_refs(phase.context_refs.clone());

        Ok(PreparedPhase {
            id: phase.id.clone(),
            request,
            contract,
        })
    }

    fn commit_accepted(
        &self,
        store: &mut RunStore,
        phase_id: &PhaseId,
        result: &WorkerResult,
    ) -> Result<(), PipewrightError> {
        for _ in 1..result.accepted_attempt {
            store.append_event(phase_id, EventType::Retry)?;
        }
        if result.accepted_attempt > 1 {
            store.note(
                phase_id,
                &format!("accepted on attempt {}", result.accepted_attempt),
            )?;
        }
        store.transition(phase_id, PhaseStatus::Completed, Some(result))?;
        info!(
            phase_id = %phase_id,
            attempt = result.accepted_attempt,
            "phase completed"
        );
        Ok(())
    }

    /// Consult the escalation handler until the phase settles. `retry`
    /// re-enters the controller loop with a fresh budget and the
    /// accumulated feedback; a second exhaustion escalates again.
    async fn resolve_escalation(
        &self,
        store: &mut RunStore,
        prepared: &PreparedPhase,
        mut context: EscalationContext,
    ) -> Result<EscalationResolution, PipewrightError> {
        loop {
            for _ in 1..context.attempts_made {
                store.append_event(&prepared.id, EventType::Retry)?;
            }
            store.append_event(&prepared.id, EventType::Escalated)?;
            let note = if context.last_missing.is_empty() {
                format!("escalated after {} attempts", context.attempts_made)
            } else {
                format!(
                    "escalated after {} attempts; missing: {}",
                    context.attempts_made,
                    context.last_missing.join(", ")
                )
            };
            store.note(&prepared.id, &note)?;

            match self.escalation.decide(&context).await {
                EscalationDecision::Retry => {
                    info!(phase_id = %prepared.id, "escalation decision: retry");
                    store.note(&prepared.id, "retry granted by operator")?;
                    let retry =
                        RetryState::renewed(self.max_attempts, context.feedback_history.clone());
                    let outcome = controller::execute_phase(
                        self.backend.as_ref(),
                        &prepared.request,
                        &prepared.contract,
                        retry,
                    )
                    .instrument(logging::phase_span(store.run_id(), prepared.id.as_str()))
                    .await;
                    match outcome {
                        PhaseOutcome::Accepted(result) => {
                            self.commit_accepted(store, &prepared.id, &result)?;
                            return Ok(EscalationResolution::Resolved);
                        }
                        PhaseOutcome::Escalated(next) => context = next,
                    }
                }
                EscalationDecision::Skip => {
                    info!(phase_id = %prepared.id, "escalation decision: skip");
                    store.note(&prepared.id, "skipped by operator decision")?;
                    store.transition(&prepared.id, PhaseStatus::Skipped, None)?;
                    return Ok(EscalationResolution::Resolved);
                }
                EscalationDecision::Abort => {
                    warn!(
                        phase_id = %prepared.id,
                        "escalation decision: abort; state preserved for resume"
                    );
                    store.note(&prepared.id, "run aborted by operator at this phase")?;
                    return Ok(EscalationResolution::Halt);
                }
            }
        }
    }

    fn members_of(&self, unit: &ExecutionUnit) -> Vec<&Phase> {
        unit.member_ids()
            .iter()
            .filter_map(|id| self.pipeline.phase(id))
            .collect()
    }
}

/// Reason the phase cannot run, if any explicit dependency is not
/// completed. `depends_on = []` opts out of gating entirely; `None`
/// means the implicit ordering dependency, which unit sequencing
/// already satisfies.
fn dependency_block(store: &RunStore, phase: &Phase) -> Option<String> {
    let deps = phase.depends_on.as_ref()?;
    for dep in deps {
        match store.status_of(dep) {
            Some(PhaseStatus::Completed) => {}
            Some(other) => return Some(format!("dependency '{dep}' is {other}")),
            None => return Some(format!("dependency '{dep}' is not in this run")),
        }
    }
    None
}

/// Append the contract's expectations to the task so the worker knows
/// exactly what the gate will check for.
fn compose_task(task_description: &str, contract: &Contract) -> String {
    let mut out = String::from(task_description);
    out.push_str("\n\nYour reply must include each of these sections, named verbatim:\n");
    for marker in &contract.markers {
        out.push_str("- ");
        out.push_str(marker);
        out.push('\n');
    }
    out.push_str("\nEnd with a completion indicator (for example \"✅ complete\").\n");
    if contract.expects_artifacts {
        out.push_str("List every file you touched.\n");
    }
    out
}
