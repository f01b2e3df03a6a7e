//! CLI definitions using clap, plus the human-readable run summary.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Parser;

use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::report::{FailureKind, OverallStatus, Report};
use crate::service::ServiceConfig;

/// Leak-detection profiler for the Redis table module
#[derive(Parser, Debug, Default)]
#[command(name = "table-memprof")]
#[command(version)]
#[command(about = "Drive table operation cycles against Redis and flag upward memory trends")]
#[command(
    long_about = "Runs each profiling scenario against a Redis server with the table module loaded, samples server memory at a fixed stride, fits a linear trend, and reports scenarios whose growth exceeds their leak threshold."
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Service host
    #[arg(long)]
    pub host: Option<String>,

    /// Service port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Server binary used for auto-start
    #[arg(long, value_name = "PATH")]
    pub server_bin: Option<PathBuf>,

    /// Table module loaded when auto-starting the server
    #[arg(short, long, value_name = "PATH")]
    pub module: Option<PathBuf>,

    /// Fail instead of starting a server when none is reachable
    #[arg(long, default_value_t = false)]
    pub no_auto_start: bool,

    /// Run only the named scenario (repeatable)
    #[arg(long = "only", value_name = "SCENARIO")]
    pub only: Vec<String>,

    /// Write the full report as JSON
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Append every memory sample to a JSON-lines file
    #[arg(long, value_name = "PATH")]
    pub samples: Option<PathBuf>,

    /// Print the report as JSON instead of the summary
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// List the configured scenarios and exit
    #[arg(long, default_value_t = false)]
    pub list_scenarios: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Apply the service flags on top of a configured service section
    #[must_use]
    pub fn override_service(&self, service: ServiceConfig) -> ServiceConfig {
        let service = match &self.host {
            Some(host) => service.with_host(host.clone()),
            None => service,
        };
        let service = match self.port {
            Some(port) => service.with_port(port),
            None => service,
        };
        let service = match &self.server_bin {
            Some(bin) => service.with_server_bin(bin.clone()),
            None => service,
        };
        let service = match &self.module {
            Some(module) => service.with_module_path(module.clone()),
            None => service,
        };
        if self.no_auto_start {
            service.with_auto_start(false)
        } else {
            service
        }
    }

    /// Build the effective configuration: file (or defaults), flags, filter
    ///
    /// # Errors
    ///
    /// Returns the config loading error, or `InvalidConfig` for bad overrides
    /// and unknown `--only` names.
    pub fn resolve_config(&self) -> Result<ProfilerConfig> {
        let config = match &self.config {
            Some(path) => ProfilerConfig::load(path)?,
            None => ProfilerConfig::default(),
        };
        let service = self.override_service(config.service().clone());
        config.with_service(service)?.retain_scenarios(&self.only)
    }
}

/// One line per configured scenario
#[must_use]
pub fn render_scenario_list(config: &ProfilerConfig) -> String {
    config
        .scenarios()
        .iter()
        .fold(String::new(), |mut out, scenario| {
            let _ = writeln!(
                out,
                "{:<20} iterations={:<6} stride={:<5} threshold={}% metric={}",
                scenario.name(),
                scenario.iterations(),
                scenario.sample_stride(),
                scenario.leak_threshold(),
                scenario.metric(),
            );
            out
        })
}

/// Human-readable summary of a finished run
#[must_use]
pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Memory Profiling Results ===");

    for result in report.results() {
        let status = if result.is_leak() { "LEAK" } else { "OK" };
        let _ = writeln!(
            out,
            "[{status:<4}] {:<20} {:>12.2} bytes/op  ({})",
            result.name(),
            result.per_operation(),
            result.rationale(),
        );
    }

    for failure in report.failures() {
        let stage = match failure.kind() {
            FailureKind::Operation { iteration } => format!("operation {iteration}"),
            FailureKind::Metric => "metric".to_string(),
            FailureKind::Teardown => "teardown".to_string(),
            FailureKind::Setup => "setup".to_string(),
        };
        let _ = writeln!(
            out,
            "[FAIL] {:<20} {stage}: {}",
            failure.name(),
            failure.message()
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Scenarios: {} completed, {} failed, {} leaking",
        report.results().len(),
        report.failures().len(),
        report.leak_count()
    );
    let status = match report.overall_status() {
        OverallStatus::Clean => "CLEAN",
        OverallStatus::LeaksFound => "LEAKS_FOUND",
    };
    let _ = writeln!(out, "Overall: {status}");
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::error::ProfilerError;
    use crate::report::ScenarioFailure;
    use crate::runner::ScenarioResult;
    use crate::scenario::{SampleSeries, ScenarioConfig, ScenarioKind};
    use chrono::Utc;

    fn result_with(name: &str, values: &[f64]) -> ScenarioResult {
        let config = ScenarioConfig::for_kind(ScenarioKind::IndexCycles)
            .with_name(name)
            .with_iterations(4)
            .with_sample_stride(1);
        let series: SampleSeries = serde_json::from_value(serde_json::json!({
            "samples": values
                .iter()
                .enumerate()
                .map(|(i, v)| serde_json::json!({"ordinal": i, "iteration": i, "value": v}))
                .collect::<Vec<_>>(),
            "iterations": 4,
        }))
        .unwrap();
        ScenarioResult::from_series(&config, series).unwrap()
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from([
            "table-memprof",
            "--port",
            "6380",
            "--module",
            "./redis_table.so",
            "--only",
            "crud_cycles",
            "--only",
            "index_cycles",
            "--json",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(6380));
        assert_eq!(cli.only, vec!["crud_cycles", "index_cycles"]);
        assert!(cli.json);
        assert!(cli.verbose);
        assert!(!cli.no_auto_start);
    }

    #[test]
    fn test_service_overrides() {
        let cli = Cli {
            host: Some("10.1.1.1".to_string()),
            port: Some(7000),
            no_auto_start: true,
            ..Cli::default()
        };
        let service = cli.override_service(ServiceConfig::default());
        assert_eq!(service.host(), "10.1.1.1");
        assert_eq!(service.port(), 7000);
        assert!(!service.auto_start());
        assert_eq!(service.server_bin(), std::path::Path::new("redis-server"));
    }

    #[test]
    fn test_resolve_config_filters_and_validates() {
        let cli = Cli {
            only: vec!["query_operations".to_string()],
            ..Cli::default()
        };
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.scenarios().len(), 1);

        let zero_port = Cli {
            port: Some(0),
            ..Cli::default()
        };
        assert!(matches!(
            zero_port.resolve_config(),
            Err(ProfilerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_scenario_list_names_every_scenario() {
        let listing = render_scenario_list(&ProfilerConfig::default());
        assert_eq!(listing.lines().count(), 5);
        assert!(listing.contains("query_operations"));
        assert!(listing.contains("stride=100"));
    }

    #[test]
    fn test_summary_shows_leaks_and_failures() {
        let failure = ScenarioFailure::new(
            "crud_cycles",
            &ProfilerError::operation_failed(
                "crud_cycles",
                7,
                ProfilerError::command("TABLE.UPDATE", "ERR no such table"),
            ),
        );
        let report = Report::new(
            Utc::now(),
            vec![
                result_with("stable", &[5000.0, 5002.0, 4998.0, 5001.0, 4999.0]),
                result_with("leaky", &[1000.0, 1100.0, 1200.0, 1300.0, 1400.0]),
            ],
            vec![failure],
        );

        let summary = render_summary(&report);
        assert!(summary.contains("[OK  ] stable"));
        assert!(summary.contains("[LEAK] leaky"));
        assert!(summary.contains("100.00 bytes/op"));
        assert!(summary.contains("[FAIL] crud_cycles"));
        assert!(summary.contains("operation 7"));
        assert!(summary.contains("2 completed, 1 failed, 1 leaking"));
        assert!(summary.ends_with("Overall: LEAKS_FOUND\n"));
    }
}
