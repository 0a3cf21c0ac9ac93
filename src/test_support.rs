//! Scripted doubles for the worker and escalation boundaries
//!
//! Compiled for unit tests and, behind the `test-utils` feature, for
//! integration tests. Nothing here ships in a default build.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::contracts::Contract;
use crate::escalation::{EscalationContext, EscalationDecision, EscalationHandler};
use crate::worker::{WorkerBackend, WorkerError, WorkerRequest};

/// Worker double that replays scripted responses per phase and records
/// every request it receives.
///
/// Responses for a phase are consumed in order; once a phase's script is
/// exhausted (or was never set) the default response is returned, which
/// is empty unless overridden and therefore fails validation.
#[derive(Default)]
pub struct MockWorker {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, WorkerError>>>>,
    requests: Mutex<Vec<WorkerRequest>>,
    default_response: String,
}

impl MockWorker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for one phase
    #[must_use]
    pub fn script(self, phase_id: &str, response: impl Into<String>) -> Self {
        self.push(phase_id, Ok(response.into()));
        self
    }

    /// Queue a failed invocation for one phase
    #[must_use]
    pub fn script_err(self, phase_id: &str, err: WorkerError) -> Self {
        self.push(phase_id, Err(err));
        self
    }

    /// Response returned once a phase's script runs dry
    #[must_use]
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Every request received, in invocation order
    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    /// Requests received for one phase, in invocation order
    pub fn requests_for(&self, phase_id: &str) -> Vec<WorkerRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.phase_id.as_str() == phase_id)
            .collect()
    }

    fn push(&self, phase_id: &str, entry: Result<String, WorkerError>) {
        self.scripts
            .lock()
            .expect("lock poisoned")
            .entry(phase_id.to_string())
            .or_default()
            .push_back(entry);
    }
}

#[async_trait]
impl WorkerBackend for MockWorker {
    async fn invoke(&self, request: &WorkerRequest) -> Result<String, WorkerError> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .push(request.clone());

        let next = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .get_mut(request.phase_id.as_str())
            .and_then(VecDeque::pop_front);

        match next {
            Some(entry) => entry,
            None => Ok(self.default_response.clone()),
        }
    }
}

/// Escalation double that replays scripted decisions and records the
/// contexts it was shown. An exhausted script resolves to `Abort`.
#[derive(Default)]
pub struct ScriptedEscalation {
    decisions: Mutex<VecDeque<EscalationDecision>>,
    contexts: Mutex<Vec<EscalationContext>>,
}

impl ScriptedEscalation {
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = EscalationDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Contexts seen so far, in decision order
    pub fn contexts(&self) -> Vec<EscalationContext> {
        self.contexts.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl EscalationHandler for ScriptedEscalation {
    async fn decide(&self, context: &EscalationContext) -> EscalationDecision {
        self.contexts
            .lock()
            .expect("lock poisoned")
            .push(context.clone());
        self.decisions
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(EscalationDecision::Abort)
    }
}

/// Output that satisfies every marker in `contract`, including the
/// completion and artifact heuristics
#[must_use]
pub fn passing_output(contract: &Contract) -> String {
    let mut out = contract.markers.join("\n");
    out.push_str("\n✅ complete\n");
    if contract.expects_artifacts {
        out.push_str("Files: src/lib.rs\n");
    }
    out
}
