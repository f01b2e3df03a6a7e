//! Multi-scenario aggregation.
//!
//! Scenarios run strictly one after another against the same service: one
//! scenario's teardown never overlaps the next one's setup.

use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::command::CommandExecutor;
use crate::error::{ProfilerError, Result};
use crate::metrics::MetricSource;
use crate::runner::{ScenarioResult, ScenarioRunner};
use crate::scenario::Scenario;

/// What broke inside a failed scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailureKind {
    Operation { iteration: u32 },
    Metric,
    Teardown,
    Setup,
}

impl FailureKind {
    fn of(error: &ProfilerError) -> Self {
        match error {
            ProfilerError::OperationFailed { iteration, .. } => Self::Operation {
                iteration: *iteration,
            },
            ProfilerError::UnavailableMetric { .. } => Self::Metric,
            ProfilerError::Teardown { .. } => Self::Teardown,
            _ => Self::Setup,
        }
    }
}

/// A scenario that produced an error instead of a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioFailure {
    name: String,
    kind: FailureKind,
    message: String,
}

impl ScenarioFailure {
    #[must_use]
    pub fn new(name: impl Into<String>, error: &ProfilerError) -> Self {
        Self {
            name: name.into(),
            kind: FailureKind::of(error),
            message: error.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Leak status across all completed scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Clean,
    LeaksFound,
}

/// Terminal verdict of a run, keeping leaks and errors apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    Clean,
    LeaksFound,
    ScenarioErrors,
    LeaksAndErrors,
}

impl ExitSignal {
    /// Process exit code for this verdict
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::LeaksFound => 1,
            Self::ScenarioErrors => 2,
            Self::LeaksAndErrors => 3,
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// The terminal artifact of a profiling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    results: Vec<ScenarioResult>,
    failures: Vec<ScenarioFailure>,
    leak_count: usize,
    overall_status: OverallStatus,
}

impl Report {
    /// Assemble a report; counts and status are derived from the entries.
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        results: Vec<ScenarioResult>,
        failures: Vec<ScenarioFailure>,
    ) -> Self {
        let leak_count = results.iter().filter(|r| r.is_leak()).count();
        let overall_status = if leak_count > 0 {
            OverallStatus::LeaksFound
        } else {
            OverallStatus::Clean
        };
        Self {
            started_at,
            finished_at: Utc::now(),
            results,
            failures,
            leak_count,
            overall_status,
        }
    }

    /// Completed scenarios in execution order
    #[must_use]
    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    /// Failed scenarios in execution order
    #[must_use]
    pub fn failures(&self) -> &[ScenarioFailure] {
        &self.failures
    }

    #[must_use]
    pub const fn leak_count(&self) -> usize {
        self.leak_count
    }

    #[must_use]
    pub const fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    #[must_use]
    pub const fn started_at(&self) -> &DateTime<Utc> {
        &self.started_at
    }

    #[must_use]
    pub const fn finished_at(&self) -> &DateTime<Utc> {
        &self.finished_at
    }

    #[must_use]
    pub fn exit_signal(&self) -> ExitSignal {
        match (self.leak_count > 0, !self.failures.is_empty()) {
            (false, false) => ExitSignal::Clean,
            (true, false) => ExitSignal::LeaksFound,
            (false, true) => ExitSignal::ScenarioErrors,
            (true, true) => ExitSignal::LeaksAndErrors,
        }
    }

    /// Write the report as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns `ReportWrite` if the file cannot be created or flushed, or a
    /// JSON error.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let write_failed =
            |e: std::io::Error| ProfilerError::ReportWrite(format!("{}: {e}", path.display()));
        let file = std::fs::File::create(path).map_err(write_failed)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        // BufWriter drops flush errors silently
        writer.flush().map_err(write_failed)?;
        Ok(())
    }
}

/// Runs scenarios in order and collects their results
pub struct ReportAggregator {
    scenarios: Vec<Scenario>,
    runner: ScenarioRunner,
}

impl ReportAggregator {
    #[must_use]
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self {
            scenarios,
            runner: ScenarioRunner::new(),
        }
    }

    #[must_use]
    pub fn with_runner(mut self, runner: ScenarioRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Run every scenario; a failing scenario is recorded and the rest still run.
    pub fn run<T>(mut self, target: &mut T) -> Report
    where
        T: CommandExecutor + MetricSource,
    {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(self.scenarios.len());
        let mut failures = Vec::new();

        for scenario in &mut self.scenarios {
            match self.runner.run(scenario, target) {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(scenario = %scenario.name(), error = %e, "scenario failed");
                    failures.push(ScenarioFailure::new(scenario.name(), &e));
                }
            }
        }

        let report = Report::new(started_at, results, failures);
        info!(
            completed = report.results().len(),
            failed = report.failures().len(),
            leaks = report.leak_count(),
            "profiling run complete"
        );
        report
    }
}
