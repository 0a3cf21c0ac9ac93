//! Integration tests for the worker-stub CLI binary
//!
//! These tests execute the compiled worker-stub binary directly using `assert_cmd`.
//! They are gated behind the `dev-tools` feature and only run when that feature is enabled.
//!
//! Run with: `cargo test --features dev-tools --test worker_stub_cli`

use assert_cmd::Command;
use predicates::prelude::*;

/// A prompt the runner would send for an api-design phase: role line,
/// task, and the contract instruction block the stub parses.
const API_DESIGN_PROMPT: &str = "Role: api-design\n\
Phase: api\n\
\n\
Design the checkout endpoints.\n\
\n\
Your reply must include each of these sections, named verbatim:\n\
- Existing endpoints reviewed\n\
- Endpoint table\n\
- Error responses documented\n\
\n\
End with a completion indicator (for example \"\u{2705} complete\").\n";

/// Implementation prompt with the artifact instruction appended, as
/// composed for artifact-producing roles.
const IMPLEMENTATION_PROMPT: &str = "Role: implementation\n\
Phase: build\n\
\n\
Implement the checkout endpoint.\n\
\n\
Your reply must include each of these sections, named verbatim:\n\
- Requirements reviewed\n\
- Files to modify\n\
- Test plan\n\
\n\
End with a completion indicator (for example \"\u{2705} complete\").\n\
List every file you touched.\n";

fn worker_stub_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("worker-stub"));
    cmd.arg("--no-sleep"); // Fast tests
    cmd
}

#[test]
fn version_output() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("worker-stub"));
    let version_predicate =
        predicate::str::is_match(r"\b\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?\b").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("worker-stub"))
        .stdout(version_predicate);
}

#[test]
fn success_scenario_echoes_requested_sections() {
    worker_stub_cmd()
        .args(["--scenario", "success"])
        .write_stdin(API_DESIGN_PROMPT)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Existing endpoints reviewed"))
        .stdout(predicate::str::contains("## Endpoint table"))
        .stdout(predicate::str::contains("## Error responses documented"))
        .stdout(predicate::str::contains(
            "Endpoints enumerated with request and response shapes per route.",
        ))
        .stdout(predicate::str::contains("✅ complete"))
        .stdout(predicate::str::contains("Files touched:").not());
}

#[test]
fn artifact_roles_report_touched_files() {
    worker_stub_cmd()
        .write_stdin(IMPLEMENTATION_PROMPT)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Test plan"))
        .stdout(predicate::str::contains(
            "Files touched: src/checkout/service.rs",
        ))
        .stdout(predicate::str::contains("✅ complete"));
}

#[test]
fn prompt_free_invocation_emits_fallback_report() {
    worker_stub_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Pre-work report for this phase."))
        .stdout(predicate::str::contains("✅ complete"));
}

#[test]
fn missing_markers_scenario_drops_the_last_section() {
    worker_stub_cmd()
        .args(["--scenario", "missing-markers"])
        .write_stdin(IMPLEMENTATION_PROMPT)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Requirements reviewed"))
        .stdout(predicate::str::contains("## Files to modify"))
        .stdout(predicate::str::contains("## Test plan").not())
        .stdout(predicate::str::contains("✅ complete"));
}

#[test]
fn no_completion_scenario_avoids_completion_vocabulary() {
    worker_stub_cmd()
        .args(["--scenario", "no-completion"])
        .write_stdin(IMPLEMENTATION_PROMPT)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Requirements reviewed"))
        .stdout(predicate::str::contains("✅").not())
        .stdout(predicate::str::contains("complete").not())
        .stdout(predicate::str::contains("done").not())
        .stdout(predicate::str::contains("finished").not());
}

#[test]
fn error_scenario() {
    worker_stub_cmd()
        .args(["--scenario", "error"])
        .write_stdin(IMPLEMENTATION_PROMPT)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("worker error: model backend unavailable"));
}

#[test]
fn empty_scenario_emits_nothing() {
    worker_stub_cmd()
        .args(["--scenario", "empty"])
        .write_stdin(IMPLEMENTATION_PROMPT)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
