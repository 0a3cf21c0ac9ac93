//! Stub worker command for development testing
//!
//! This binary mimics an external worker CLI for testing pipewright without
//! invoking a real model backend. It reads the phase prompt from stdin,
//! echoes back a response that satisfies the requested evidence sections,
//! and supports failure scenarios for exercising the retry and escalation
//! paths.

use clap::{Arg, Command};
use std::io::{self, IsTerminal, Read};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("worker-stub")
        .version("0.1.0")
        .about("Stub worker command for testing")
        .arg(
            Arg::new("scenario")
                .long("scenario")
                .value_name("SCENARIO")
                .help("Test scenario to simulate")
                .default_value("success"),
        )
        .arg(
            Arg::new("no-sleep")
                .long("no-sleep")
                .help("Disable artificial delays (for fast CI tests)")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let scenario = matches.get_one::<String>("scenario").unwrap();
    let no_sleep = matches.get_flag("no-sleep");

    let prompt = read_prompt();
    let role = detect_role(&prompt);
    let markers = requested_markers(&prompt);
    let wants_files = prompt.contains("List every file you touched.");

    match scenario.as_str() {
        "missing-markers" => {
            // Drop the final requested section so the validation gate
            // reports it and the phase retries
            let kept = markers[..markers.len().saturating_sub(1)].to_vec();
            emit_response(role, &kept, wants_files, true, no_sleep);
        }
        "no-completion" => {
            emit_response(role, &markers, wants_files, false, no_sleep);
        }
        "error" => {
            eprintln!("worker error: model backend unavailable");
            std::process::exit(1);
        }
        "empty" => {}
        "slow" => {
            if !no_sleep {
                thread::sleep(Duration::from_millis(500));
            }
            emit_response(role, &markers, wants_files, true, no_sleep);
        }
        "hang" => handle_hang_scenario(),
        _ => emit_response(role, &markers, wants_files, true, no_sleep),
    }

    Ok(())
}

fn read_prompt() -> String {
    if io::stdin().is_terminal() {
        return String::new();
    }

    let mut prompt = String::new();
    let _ = io::stdin().read_to_string(&mut prompt);
    prompt
}

/// The prompt opens with a `Role: <role>` line; default to implementation
/// when invoked outside the normal protocol.
fn detect_role(prompt: &str) -> &'static str {
    let role_line = prompt
        .lines()
        .find_map(|line| line.strip_prefix("Role: "))
        .unwrap_or("")
        .trim();

    match role_line {
        "ui-design" => "ui-design",
        "api-design" => "api-design",
        "schema-design" => "schema-design",
        "integration" => "integration",
        "contract-verification" => "contract-verification",
        _ => "implementation",
    }
}

/// Pull the required section names out of the prompt's contract
/// instruction block: the bullet list following "named verbatim".
fn requested_markers(prompt: &str) -> Vec<String> {
    let mut markers = Vec::new();
    let mut in_list = false;
    for line in prompt.lines() {
        if line.contains("named verbatim") {
            in_list = true;
            continue;
        }
        if in_list {
            match line.trim().strip_prefix("- ") {
                Some(marker) => markers.push(marker.to_string()),
                None => break,
            }
        }
    }
    markers
}

fn emit_response(
    role: &str,
    markers: &[String],
    wants_files: bool,
    with_completion: bool,
    no_sleep: bool,
) {
    if !no_sleep {
        thread::sleep(Duration::from_millis(50));
    }

    if markers.is_empty() {
        println!("Pre-work report for this phase.");
        println!();
    }
    for marker in markers {
        println!("## {marker}");
        println!();
        println!("{}", section_body(role));
        println!();
    }

    if wants_files {
        println!("Files touched: src/checkout/service.rs, src/checkout/routes.rs");
        println!();
    }

    if with_completion {
        println!("✅ complete");
    }
}

/// Section filler per role. Deliberately free of the words the gate
/// accepts as completion indicators, so the no-completion scenario
/// actually fails the heuristic.
fn section_body(role: &str) -> &'static str {
    match role {
        "ui-design" => "Screens and components reviewed against the existing design tokens.",
        "api-design" => "Endpoints enumerated with request and response shapes per route.",
        "schema-design" => "Tables, indexes, and the forward/backward migration pair described.",
        "integration" => "Adapters wired across module boundaries with failure paths noted.",
        "contract-verification" => "Each checklist item evaluated against the produced artifacts.",
        _ => "Changes applied across the listed modules with coverage for each path.",
    }
}

/// Blocks for a configurable duration to test timeout handling.
/// Duration is read from WORKER_STUB_HANG_SECS env var (default: 10 seconds).
fn handle_hang_scenario() {
    let hang_secs: u64 = std::env::var("WORKER_STUB_HANG_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    thread::sleep(Duration::from_secs(hang_secs));

    // After hanging, respond normally (though the caller should have killed us by now)
    println!("Late response after {hang_secs} seconds.");
    println!("✅ complete");
}
