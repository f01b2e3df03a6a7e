//! Command-line behaviour that needs no running server.

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn memprof() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("table-memprof")?)
}

#[test]
fn test_help_lists_flags() -> TestResult {
    memprof()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-auto-start"))
        .stdout(predicate::str::contains("--only"));
    Ok(())
}

#[test]
fn test_list_scenarios_prints_catalogue() -> TestResult {
    memprof()?
        .arg("--list-scenarios")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("schema_creation"))
        .stdout(predicate::str::contains("crud_cycles"))
        .stdout(predicate::str::contains("threshold=0.01%"));
    Ok(())
}

#[test]
fn test_list_scenarios_honours_config_and_filter() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "[[scenario]]\nkind = \"crud_cycles\"\nname = \"crud_small\"\niterations = 20\nsample_stride = 5\n\n[[scenario]]\nkind = \"index_cycles\"\n"
    )?;

    memprof()?
        .arg("--config")
        .arg(file.path())
        .args(["--only", "crud_small", "--list-scenarios"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("crud_small"))
        .stdout(predicate::str::contains("iterations=20"))
        .stdout(predicate::str::contains("index_cycles").not());
    Ok(())
}

#[test]
fn test_unknown_scenario_is_fatal() -> TestResult {
    memprof()?
        .args(["--only", "no_such_scenario", "--list-scenarios"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("no_such_scenario"));
    Ok(())
}

#[test]
fn test_unreachable_service_without_auto_start_exits_fatal() -> TestResult {
    // Port 1 is privileged and never runs redis in test environments.
    memprof()?
        .args(["--port", "1", "--no-auto-start", "--only", "crud_cycles"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("auto-start is disabled"));
    Ok(())
}
