//! Runs one scenario end to end and packages its result.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classify::classify;
use crate::command::CommandExecutor;
use crate::error::{ProfilerError, Result};
use crate::metrics::{MetricSource, SampleLog};
use crate::scenario::{SampleSeries, Scenario, ScenarioConfig};
use crate::trend::{Sample, Trend, estimate};

/// Outcome of one successful scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    name: String,
    iterations: u32,
    baseline: f64,
    #[serde(rename = "final")]
    final_value: f64,
    /// `final - baseline`
    increase: f64,
    /// `increase / iterations`
    per_operation: f64,
    leak_threshold: f64,
    trend: Trend,
    is_leak: bool,
    rationale: String,
    samples: Vec<Sample>,
}

impl ScenarioResult {
    /// Classify a collected series.
    ///
    /// # Errors
    ///
    /// Returns `UnavailableMetric` if the series holds no samples.
    pub fn from_series(config: &ScenarioConfig, series: SampleSeries) -> Result<Self> {
        let (Some(baseline), Some(final_value)) = (series.baseline(), series.final_value()) else {
            return Err(ProfilerError::unavailable_metric(format!(
                "scenario '{}' recorded no samples",
                config.name()
            )));
        };

        let iterations = series.iterations();
        let increase = final_value - baseline;
        let per_operation = increase / f64::from(iterations.max(1));

        let trend = estimate(series.samples());
        let (is_leak, rationale) = classify(&trend, config.leak_threshold()).into_parts();

        Ok(Self {
            name: config.name().to_string(),
            iterations,
            baseline,
            final_value,
            increase,
            per_operation,
            leak_threshold: config.leak_threshold(),
            trend,
            is_leak,
            rationale,
            samples: series.into_samples(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub const fn baseline(&self) -> f64 {
        self.baseline
    }

    #[must_use]
    pub const fn final_value(&self) -> f64 {
        self.final_value
    }

    #[must_use]
    pub const fn increase(&self) -> f64 {
        self.increase
    }

    #[must_use]
    pub const fn per_operation(&self) -> f64 {
        self.per_operation
    }

    #[must_use]
    pub const fn leak_threshold(&self) -> f64 {
        self.leak_threshold
    }

    #[must_use]
    pub const fn trend(&self) -> &Trend {
        &self.trend
    }

    #[must_use]
    pub const fn is_leak(&self) -> bool {
        self.is_leak
    }

    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// Scenario runner
#[derive(Default)]
pub struct ScenarioRunner {
    sample_log: Option<SampleLog>,
}

impl ScenarioRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self { sample_log: None }
    }

    /// Also append every collected sample to a JSON-lines log
    #[must_use]
    pub fn with_sample_log(mut self, log: SampleLog) -> Self {
        self.sample_log = Some(log);
        self
    }

    /// Run one scenario
    ///
    /// This will:
    /// 1. Flush the service so the scenario starts from empty state
    /// 2. Run setup, the sampled iterations, and the final sample
    /// 3. Tear down, on both the success and the failure path
    /// 4. Estimate the trend and classify it
    ///
    /// # Errors
    ///
    /// Returns the scenario's error if any step before classification fails,
    /// or `Teardown` if the run succeeded but its state could not be cleared.
    /// Teardown errors on an already failing run are logged and the run's own
    /// error is returned.
    pub fn run<T>(&self, scenario: &mut Scenario, target: &mut T) -> Result<ScenarioResult>
    where
        T: CommandExecutor + MetricSource,
    {
        let config = scenario.config().clone();
        info!(
            scenario = %config.name(),
            iterations = config.iterations(),
            stride = config.sample_stride(),
            threshold = config.leak_threshold(),
            "starting scenario"
        );

        let outcome = match target.flush_all() {
            Ok(()) => scenario.run(target),
            Err(e) => Err(e),
        };
        let cleanup = scenario.teardown(target);

        let series = match (outcome, cleanup) {
            (Ok(series), Ok(())) => series,
            (Ok(_), Err(e)) => return Err(ProfilerError::teardown(config.name(), e)),
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(scenario = %config.name(), error = %cleanup_err, "teardown after failure also failed");
                return Err(e);
            }
        };

        if let Some(log) = &self.sample_log {
            if let Err(e) = log.append(config.name(), series.samples()) {
                warn!(scenario = %config.name(), error = %e, "failed to write sample log");
            }
        }

        let result = ScenarioResult::from_series(&config, series)?;
        info!(
            scenario = %result.name(),
            baseline = result.baseline(),
            final_value = result.final_value(),
            per_operation = result.per_operation(),
            is_leak = result.is_leak(),
            rationale = %result.rationale(),
            "scenario complete"
        );
        Ok(result)
    }
}
