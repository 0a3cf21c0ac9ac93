//! Human decision point for retry-exhausted phases
//!
//! Escalation is a control signal, not an error: when a phase burns its
//! whole attempt budget without passing the gate, the run pauses and a
//! human picks one of exactly three outcomes. `retry` grants a fresh
//! attempt budget, `skip` marks the phase skipped and moves on, `abort`
//! halts the run with state preserved for resumption.

use async_trait::async_trait;
use tokio::task;
use tracing::warn;

use crate::types::PhaseId;

/// The three outcomes a human may choose for an escalated phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    /// Reset the attempt counter and re-enter the retry loop
    Retry,
    /// Mark the phase skipped and continue the run
    Skip,
    /// Halt the run, preserving state for a later resume
    Abort,
}

impl EscalationDecision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Abort => "abort",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" | "r" => Some(Self::Retry),
            "skip" | "s" => Some(Self::Skip),
            "abort" | "a" => Some(Self::Abort),
            _ => None,
        }
    }
}

impl std::fmt::Display for EscalationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the decision-maker gets to see about the exhausted phase
#[derive(Debug, Clone)]
pub struct EscalationContext {
    pub phase_id: PhaseId,
    /// Attempts consumed in the loop that exhausted
    pub attempts_made: u32,
    /// Missing markers from the final failed validation
    pub last_missing: Vec<String>,
    /// Corrective feedback accumulated across all attempts, oldest first
    pub feedback_history: Vec<String>,
}

/// Decision point consulted by the runner for each escalated phase
#[async_trait]
pub trait EscalationHandler: Send + Sync {
    async fn decide(&self, context: &EscalationContext) -> EscalationDecision;
}

/// Interactive handler: prints the escalation context to stderr and reads
/// a decision from stdin. EOF or a read failure resolves to `Abort` so an
/// unattended run never spins.
pub struct ConsoleEscalation;

#[async_trait]
impl EscalationHandler for ConsoleEscalation {
    async fn decide(&self, context: &EscalationContext) -> EscalationDecision {
        let prompt = render_prompt(context);
        let outcome = task::spawn_blocking(move || {
            eprint!("{prompt}");
            prompt_loop()
        })
        .await;

        match outcome {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "escalation prompt task failed; aborting run");
                EscalationDecision::Abort
            }
        }
    }
}

fn render_prompt(context: &EscalationContext) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nPhase '{}' failed validation after {} attempts.\n",
        context.phase_id, context.attempts_made
    ));
    if !context.last_missing.is_empty() {
        out.push_str(&format!(
            "Still missing: {}\n",
            context.last_missing.join(", ")
        ));
    }
    out.push_str("Choose: [r]etry / [s]kip / [a]bort\n");
    out
}

fn prompt_loop() -> EscalationDecision {
    loop {
        eprint!("> ");
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => return EscalationDecision::Abort,
            Ok(_) => {}
        }
        match EscalationDecision::parse(&line) {
            Some(decision) => return decision,
            None => eprintln!("Unrecognized choice; enter retry, skip, or abort."),
        }
    }
}

/// Non-interactive handler that always returns a fixed decision.
/// Backs the `--escalation=<decision>` flag for unattended runs.
pub struct PolicyEscalation(pub EscalationDecision);

#[async_trait]
impl EscalationHandler for PolicyEscalation {
    async fn decide(&self, context: &EscalationContext) -> EscalationDecision {
        warn!(
            phase_id = %context.phase_id,
            attempts = context.attempts_made,
            decision = %self.0,
            "escalation resolved by fixed policy"
        );
        self.0
    }
}
