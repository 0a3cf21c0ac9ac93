//! CLI integration tests for the pipewright binary
//!
//! Executes the compiled binary with `assert_cmd`, pointing
//! PIPEWRIGHT_HOME at a per-test temp directory. Run state is seeded
//! through the library so the status contract (exit codes, JSON shape)
//! is tested without a live worker; the unix-gated tests at the bottom
//! drive full runs through a shell worker command.

use assert_cmd::assert::OutputAssertExt;
use camino::{Utf8Path, Utf8PathBuf};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

use pipewright::types::{ExtractedFacts, PhaseId, PhaseStatus, WorkerResult};
use pipewright::{paths, Pipeline, RunStore};

const DEFINITION: &str = r#"
id = "checkout-flow"

[[phase]]
id = "schema"
role = "schema-design"
estimated_minutes = 10
task = "Draft the schema"

[[phase]]
id = "api"
role = "api-design"
estimated_minutes = 20
task = "Sketch endpoints"
"#;

fn home(td: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap()
}

fn pipewright_cmd(home: &Utf8Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pipewright"));
    cmd.env("PIPEWRIGHT_HOME", home.as_str());
    // Config discovery starts at the working directory; keep it inside
    // the sandbox
    cmd.current_dir(home.as_std_path());
    cmd
}

/// Write a config file and return its path; keeps CLI invocations away
/// from any config discovery on the host machine.
fn write_config(home: &Utf8Path, name: &str, contents: &str) -> Utf8PathBuf {
    let path = home.join(name);
    std::fs::write(path.as_std_path(), contents).unwrap();
    path
}

/// Seed a half-finished run on disk: `schema` completed, `api` still pending
fn seed_run(home: &Utf8Path, run_id: &str) {
    let pipeline = Pipeline::from_toml_str("pipelines/flow.toml", DEFINITION).unwrap();
    let run_dir = paths::run_dir(home, run_id);
    let mut store = RunStore::create(&run_dir, run_id, &pipeline, "pipelines/flow.toml").unwrap();

    let schema = PhaseId::new("schema");
    store
        .transition(&schema, PhaseStatus::InProgress, None)
        .unwrap();
    let result = WorkerResult {
        raw_output: "Current schema reviewed\n✅ complete\n".to_string(),
        facts: ExtractedFacts::default(),
        accepted_attempt: 1,
    };
    store
        .transition(&schema, PhaseStatus::Completed, Some(&result))
        .unwrap();
}

#[test]
fn help_and_version_exit_zero() {
    let td = TempDir::new().unwrap();
    pipewright_cmd(&home(&td))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pipewright"));

    let version_predicate =
        predicate::str::is_match(r"\b\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?\b").unwrap();
    pipewright_cmd(&home(&td))
        .arg("--version")
        .assert()
        .success()
        .stdout(version_predicate);
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let td = TempDir::new().unwrap();
    pipewright_cmd(&home(&td)).arg("conjure").assert().code(2);
}

#[test]
fn status_unknown_run_exits_one() {
    let td = TempDir::new().unwrap();
    pipewright_cmd(&home(&td))
        .args(["status", "no-such-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Run no-such-run not found"));
}

#[test]
fn status_surfaces_corrupt_document() {
    let td = TempDir::new().unwrap();
    let home = home(&td);
    let run_dir = paths::run_dir(&home, "mangled");
    std::fs::create_dir_all(run_dir.as_std_path()).unwrap();
    std::fs::write(
        paths::run_document_path(&run_dir).as_std_path(),
        "{ definitely not a run document",
    )
    .unwrap();

    pipewright_cmd(&home)
        .args(["status", "mangled"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is corrupt"));
}

#[test]
fn status_human_output_lists_phases() {
    let td = TempDir::new().unwrap();
    let home = home(&td);
    seed_run(&home, "seeded-run");

    pipewright_cmd(&home)
        .args(["status", "seeded-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run: seeded-run"))
        .stdout(predicate::str::contains("Progress: 1/2 phases (50%)"))
        .stdout(predicate::str::contains("Current phase: api"))
        .stdout(predicate::str::contains("✓ schema"))
        .stdout(predicate::str::contains("· api"));
}

#[test]
fn status_json_matches_schema() {
    let td = TempDir::new().unwrap();
    let home = home(&td);
    seed_run(&home, "seeded-run");

    let output = pipewright_cmd(&home)
        .args(["status", "seeded-run", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["schema_version"], "status.v1");
    assert_eq!(json["run_id"], "seeded-run");
    assert_eq!(json["pipeline_id"], "checkout-flow");
    assert_eq!(json["phases"].as_array().unwrap().len(), 2);
    assert_eq!(json["phases"][0]["phase_id"], "schema");
    assert_eq!(json["phases"][0]["status"], "completed");
    assert_eq!(json["snapshot"]["completedCount"], 1);
    assert_eq!(json["snapshot"]["percentage"], 50);
    assert_eq!(json["current_phase_id"], "api");
    assert_eq!(json["ready_to_archive"], false);
}

#[test]
fn view_json_dumps_full_document() {
    let td = TempDir::new().unwrap();
    let home = home(&td);
    seed_run(&home, "seeded-run");

    let output = pipewright_cmd(&home)
        .args(["view", "seeded-run", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["schemaVersion"], "run.v1");
    assert_eq!(json["pipelineId"], "checkout-flow");
    assert_eq!(json["phases"]["schema"]["status"], "completed");
    assert_eq!(json["phases"]["api"]["status"], "pending");

    let history = json["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["eventType"], "started");
    assert_eq!(history[1]["eventType"], "completed");
}

#[test]
fn malformed_pipeline_exits_three() {
    let td = TempDir::new().unwrap();
    let home = home(&td);
    let config = write_config(&home, "config.toml", "");
    let definition = home.join("broken.toml");
    std::fs::write(definition.as_std_path(), "id = \"x\"\n[[phase]]\nid = \"p\"\n").unwrap();

    pipewright_cmd(&home)
        .args(["--config", config.as_str(), "run", definition.as_str()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("✗"));
}

#[test]
fn dry_run_prints_plan_and_writes_nothing() {
    let td = TempDir::new().unwrap();
    let home = home(&td);
    let config = write_config(&home, "config.toml", "");
    let definition = home.join("plan.toml");
    let toml = format!(
        "{DEFINITION}\n[[phase]]\nid = \"impl\"\nrole = \"implementation\"\n\
         estimated_minutes = 120\ntask = \"Implement authentication for the portal\"\n\
         depends_on = [\"api\"]\n"
    );
    std::fs::write(definition.as_std_path(), toml).unwrap();

    pipewright_cmd(&home)
        .args([
            "--config",
            config.as_str(),
            "run",
            definition.as_str(),
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Plan: checkout-flow (3 phases, 150 min estimated)",
        ))
        .stdout(predicate::str::contains("[light]"))
        .stdout(predicate::str::contains("[strict-loop]"))
        .stdout(predicate::str::contains("(after: api)"));

    // Nothing persisted: the plan never creates a run directory
    assert!(!home.join("runs").as_std_path().exists());
}

#[cfg(unix)]
mod with_shell_worker {
    use super::*;

    /// Shell worker that drains the prompt and answers with a passing
    /// schema-design report
    const PASSING_WORKER: &str = r#"
[worker]
command = ["sh", "-c", "cat >/dev/null; echo 'Current schema reviewed'; echo 'Migration plan'; echo 'Rollback plan'; echo 'work complete'"]
"#;

    const USELESS_WORKER: &str = r#"
[worker]
command = ["sh", "-c", "cat >/dev/null; echo 'nothing to report'"]
"#;

    const SINGLE_PHASE: &str = r#"
id = "checkout-flow"

[[phase]]
id = "schema"
role = "schema-design"
estimated_minutes = 10
task = "Draft the schema"
"#;

    fn write_definition(home: &Utf8Path) -> Utf8PathBuf {
        let path = home.join("flow.toml");
        std::fs::write(path.as_std_path(), SINGLE_PHASE).unwrap();
        path
    }

    #[test]
    fn run_completes_through_worker_command() {
        let td = TempDir::new().unwrap();
        let home = home(&td);
        let config = write_config(&home, "config.toml", PASSING_WORKER);
        let definition = write_definition(&home);

        let output = pipewright_cmd(&home)
            .args([
                "--config",
                config.as_str(),
                "run",
                definition.as_str(),
                "--run-id",
                "cli-run",
                "--json",
            ])
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["schema_version"], "run-summary.v1");
        assert_eq!(json["run_id"], "cli-run");
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["snapshot"]["percentage"], 100);

        // The run is queryable afterwards
        pipewright_cmd(&home)
            .args(["status", "cli-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Progress: 1/1 phases (100%)"));
    }

    #[test]
    fn abort_policy_pauses_then_resume_finishes() {
        let td = TempDir::new().unwrap();
        let home = home(&td);
        let failing = write_config(&home, "failing.toml", USELESS_WORKER);
        let passing = write_config(&home, "passing.toml", PASSING_WORKER);
        let definition = write_definition(&home);

        pipewright_cmd(&home)
            .args([
                "--config",
                failing.as_str(),
                "--max-attempts",
                "1",
                "--escalation",
                "abort",
                "run",
                definition.as_str(),
                "--run-id",
                "halted",
            ])
            .assert()
            .code(75)
            .stdout(predicate::str::contains("Run halted paused"))
            .stdout(predicate::str::contains("pipewright resume halted"));

        pipewright_cmd(&home)
            .args(["--config", passing.as_str(), "resume", "halted"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Run halted completed"));
    }
}
