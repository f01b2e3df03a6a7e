//! # table-memprof
//!
//! Command-line entry point.
//!
//! ## Run Sequence
//!
//! 1. **Configuration** - load the TOML file (or defaults) and apply flags
//! 2. **Service** - connect to the server, starting one if allowed
//! 3. **Scenarios** - run each scenario in order and classify its trend
//! 4. **Output** - write the report/sample files and print the summary
//!
//! ## Exit Codes
//!
//! `0` clean, `1` leaks found, `2` scenario errors, `3` leaks and errors,
//! `4` the run itself could not complete.
//!
//! Once every scenario has finished the verdict wins: a report file that cannot
//! be written is logged as an error but does not replace codes `0`-`3`.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use table_memprof::cli::{Cli, render_scenario_list, render_summary};
use table_memprof::metrics::SampleLog;
use table_memprof::redis_target::RedisTarget;
use table_memprof::runner::ScenarioRunner;
use table_memprof::service::RedisServer;
use table_memprof::{ExitSignal, Report, run_session};

/// Exit code for runs that never produced a report
const FATAL_EXIT_CODE: u8 = 4;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(signal) => ExitCode::from(signal.code()),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

/// Initialize tracing subscriber with environment filter.
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<ExitSignal> {
    let config = cli
        .resolve_config()
        .context("Invalid configuration")?;

    if cli.list_scenarios {
        print!("{}", render_scenario_list(&config));
        return Ok(ExitSignal::Clean);
    }

    let runner = match &cli.samples {
        Some(path) => ScenarioRunner::new().with_sample_log(SampleLog::new(path.clone())),
        None => ScenarioRunner::new(),
    };

    info!(
        url = %config.service().url(),
        scenarios = config.scenarios().len(),
        "table-memprof starting"
    );

    let server = RedisServer::new(config.service().clone());
    let report = run_session(&config, server, RedisTarget::connect, runner)
        .context("Profiling run aborted")?;

    if let Some(path) = &cli.report {
        save_report(&report, path);
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
    } else {
        print!("{}", render_summary(&report));
    }

    Ok(report.exit_signal())
}

/// Write the JSON report, returning whether it reached the file.
fn save_report(report: &Report, path: &Path) -> bool {
    match report.write_json(path) {
        Ok(()) => {
            info!(path = %path.display(), "report written");
            true
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to write report");
            eprintln!("Error: Failed to write report to {}: {e}", path.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use chrono::Utc;
    use table_memprof::ProfilerError;
    use table_memprof::report::ScenarioFailure;

    #[test]
    fn test_unwritable_report_keeps_verdict() {
        let failure = ScenarioFailure::new(
            "crud_cycles",
            &ProfilerError::InvalidConfig("broken".to_string()),
        );
        let report = Report::new(Utc::now(), Vec::new(), vec![failure]);
        let dir = tempfile::tempdir().unwrap();

        // A directory cannot be opened as the report file.
        assert!(!save_report(&report, dir.path()));
        assert_eq!(report.exit_signal(), ExitSignal::ScenarioErrors);

        let path = dir.path().join("report.json");
        assert!(save_report(&report, &path));
        assert!(path.exists());
    }
}
