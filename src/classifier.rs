//! Task classifier: complexity scoring and workflow mode selection
//!
//! Scores a phase's task description from three independent signals (time
//! estimate, lexical risk vocabulary, description shape) and thresholds the
//! total into a risk band. The workflow mode follows the band: anything above
//! low risk runs strict-loop, so the contract gains the iterative-evidence
//! markers.
//!
//! Classification is a pure function and is performed exactly once per
//! phase; the result is persisted with the run and reused on retry and
//! resume. Re-classifying mid-phase could flip the mode between attempts and
//! change the contract under the worker.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::contracts::Role;
use crate::types::{ClassificationResult, RiskLevel, WorkflowMode};

/// Terms that mark a task as touching critical territory: authentication,
/// payment, authorization, external integrations, or stateful multi-step
/// control flow. Any match contributes +2.
pub const CRITICAL_TERMS: &[&str] = &[
    "authentication",
    "authorization",
    "auth",
    "oauth",
    "sso",
    "login",
    "password",
    "credential",
    "credentials",
    "token",
    "session",
    "payment",
    "payments",
    "billing",
    "checkout",
    "refund",
    "webhook",
    "webhooks",
    "third-party",
    "external api",
    "external service",
    "integration",
    "integrations",
    "state machine",
    "multi-step",
    "workflow",
    "transaction",
    "transactions",
    "idempotency",
];

/// Terms that mark validation or business-rule work. Any match contributes
/// +1, independently of the critical vocabulary.
pub const VALIDATION_TERMS: &[&str] = &[
    "validate",
    "validates",
    "validation",
    "business rule",
    "business rules",
    "constraint",
    "constraints",
    "invariant",
    "invariants",
    "sanitize",
    "sanitization",
    "verify",
    "verification",
];

/// Shape signal: descriptions longer than this many characters earn +1
const LONG_DESCRIPTION_CHARS: usize = 280;

/// Shape signal: descriptions spanning more than this many lines earn +1
const LONG_DESCRIPTION_LINES: usize = 5;

/// Scores at or below this are low risk
const LOW_MAX_SCORE: u32 = 2;

/// Scores at or below this (and above `LOW_MAX_SCORE`) are medium risk
const MEDIUM_MAX_SCORE: u32 = 5;

static CRITICAL_RE: Lazy<Regex> = Lazy::new(|| vocabulary_regex(CRITICAL_TERMS));
static VALIDATION_RE: Lazy<Regex> = Lazy::new(|| vocabulary_regex(VALIDATION_TERMS));

/// Build a case-insensitive, word-bounded alternation over a fixed
/// vocabulary. Word boundaries keep substrings from firing ("auth" does not
/// match inside "author").
fn vocabulary_regex(terms: &[&str]) -> Regex {
    let alternation = terms
        .iter()
        .map(|term| regex::escape(term))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
}

/// Classify one phase.
///
/// Deterministic: the same `(role, task_description, estimated_minutes)`
/// always yields the same result. Roles that are purely declarative or
/// purely evaluative skip the signals entirely and report score 0 / low /
/// light (see [`Role::always_light`]).
#[must_use]
pub fn classify(role: Role, task_description: &str, estimated_minutes: u32) -> ClassificationResult {
    if role.always_light() {
        return ClassificationResult {
            complexity_score: 0,
            risk_level: RiskLevel::Low,
            workflow_mode: WorkflowMode::Light,
        };
    }

    let score =
        time_signal(estimated_minutes) + lexical_signal(task_description) + shape_signal(task_description);

    let risk_level = risk_for_score(score);
    let workflow_mode = match risk_level {
        RiskLevel::Low => WorkflowMode::Light,
        RiskLevel::Medium | RiskLevel::High => WorkflowMode::StrictLoop,
    };

    ClassificationResult {
        complexity_score: score,
        risk_level,
        workflow_mode,
    }
}

/// Time signal: under 30 minutes contributes 0, 30-90 contributes 1,
/// over 90 contributes 2
const fn time_signal(estimated_minutes: u32) -> u32 {
    if estimated_minutes < 30 {
        0
    } else if estimated_minutes <= 90 {
        1
    } else {
        2
    }
}

/// Lexical signal: critical terms contribute 2, validation terms contribute
/// 1, and the two stack (a description can earn both)
fn lexical_signal(task_description: &str) -> u32 {
    let mut score = 0;
    if CRITICAL_RE.is_match(task_description) {
        score += 2;
    }
    if VALIDATION_RE.is_match(task_description) {
        score += 1;
    }
    score
}

/// Shape signal: long descriptions (by characters or lines) contribute 1
fn shape_signal(task_description: &str) -> u32 {
    let over_chars = task_description.chars().count() > LONG_DESCRIPTION_CHARS;
    let over_lines = task_description.lines().count() > LONG_DESCRIPTION_LINES;
    u32::from(over_chars || over_lines)
}

const fn risk_for_score(score: u32) -> RiskLevel {
    if score <= LOW_MAX_SCORE {
        RiskLevel::Low
    } else if score <= MEDIUM_MAX_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_deterministic() {
        let a = classify(Role::Implementation, "Implement login flow", 120);
        let b = classify(Role::Implementation, "Implement login flow", 120);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_description_short_estimate_is_light() {
        let result = classify(Role::Implementation, "", 10);
        assert_eq!(result.complexity_score, 0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.workflow_mode, WorkflowMode::Light);
    }

    #[test]
    fn test_time_signal_bands() {
        assert_eq!(time_signal(0), 0);
        assert_eq!(time_signal(29), 0);
        assert_eq!(time_signal(30), 1);
        assert_eq!(time_signal(90), 1);
        assert_eq!(time_signal(91), 2);
        assert_eq!(time_signal(480), 2);
    }

    #[test]
    fn test_critical_term_contributes_two() {
        let result = classify(Role::Implementation, "Add OAuth token refresh", 10);
        assert_eq!(result.complexity_score, 2);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_lexical_signals_stack() {
        // Critical (+2) and validation (+1) both fire on the same text
        let description = "Validate payment amounts against business rules";
        assert_eq!(lexical_signal(description), 3);
    }

    #[test]
    fn test_word_boundaries_prevent_substring_matches() {
        // "author" must not trigger the "auth" term
        assert_eq!(lexical_signal("Document the authoring guide"), 0);
        assert_eq!(lexical_signal("auth flow"), 2);
    }

    #[test]
    fn test_shape_signal_by_chars_and_lines() {
        assert_eq!(shape_signal("short"), 0);
        let long_chars = "x".repeat(LONG_DESCRIPTION_CHARS + 1);
        assert_eq!(shape_signal(&long_chars), 1);
        let many_lines = "step\n".repeat(LONG_DESCRIPTION_LINES + 1);
        assert_eq!(shape_signal(&many_lines), 1);
    }

    #[test]
    fn test_high_risk_requires_stacked_signals() {
        // 2 (time) + 2 (critical) + 1 (validation) + 1 (shape) = 6 => high
        let description = format!(
            "Validate the new payment flow end to end. {}",
            "Detail line.\n".repeat(LONG_DESCRIPTION_LINES + 1)
        );
        let result = classify(Role::Implementation, &description, 120);
        assert_eq!(result.complexity_score, 6);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.workflow_mode, WorkflowMode::StrictLoop);
    }

    #[test]
    fn test_medium_risk_selects_strict_loop() {
        // 2 (time) + 2 (critical) = 4 => medium, and medium already runs
        // strict-loop
        let result = classify(
            Role::Implementation,
            "Implement authentication for the portal",
            120,
        );
        assert_eq!(result.complexity_score, 4);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.workflow_mode, WorkflowMode::StrictLoop);
    }

    #[test]
    fn test_declarative_and_evaluative_roles_skip_signals() {
        // Score-heavy input, but the role is exempt
        let description = "Authentication payment validation ".repeat(20);
        for role in [Role::SchemaDesign, Role::ContractVerification] {
            let result = classify(role, &description, 480);
            assert_eq!(result.complexity_score, 0);
            assert_eq!(result.risk_level, RiskLevel::Low);
            assert_eq!(result.workflow_mode, WorkflowMode::Light);
        }
    }

    #[test]
    fn test_risk_band_boundaries() {
        assert_eq!(risk_for_score(0), RiskLevel::Low);
        assert_eq!(risk_for_score(2), RiskLevel::Low);
        assert_eq!(risk_for_score(3), RiskLevel::Medium);
        assert_eq!(risk_for_score(5), RiskLevel::Medium);
        assert_eq!(risk_for_score(6), RiskLevel::High);
    }
}
