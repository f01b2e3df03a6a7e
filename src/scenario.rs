//! Leak-detection scenarios: named, repeatable operation cycles.
//!
//! A scenario records a baseline sample, runs its operation once per iteration,
//! samples after every `sample_stride` completed operations, and always records
//! a final sample after the loop, whether or not the last iteration landed on a
//! stride boundary.
//!
//! When the stride divides the iteration count the last stride sample and the
//! final sample read the same point, so the series ends on a repeated value and
//! the fitted slope flattens slightly toward its tail.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{AlterAction, ColumnSpec, ColumnType, CommandExecutor, FieldValue, Predicate};
use crate::error::{ProfilerError, Result};
use crate::metrics::{MetricSource, TrackedMetric};
use crate::trend::Sample;

/// Namespace shared by the single-table scenarios
const NAMESPACE: &str = "test";

/// Table shared by the single-table scenarios
const TABLE: &str = "test.data";

/// Rows seeded before index and query cycles
const SEED_ROWS: u32 = 100;

/// Safety limit on iterations per scenario
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Upper bound on the sample buffer reserved before a run
const MAX_PREALLOCATED_SAMPLES: usize = 4096;

/// Built-in operation cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Create a fresh namespace and schema every iteration
    SchemaCreation,
    /// Add one column to the same schema every iteration
    SchemaAlteration,
    /// Add then drop an index on a seeded table
    IndexCycles,
    /// Point selects against a seeded table
    QueryOperations,
    /// Insert, select, update and delete one row
    CrudCycles,
}

impl ScenarioKind {
    pub const ALL: [Self; 5] = [
        Self::SchemaCreation,
        Self::SchemaAlteration,
        Self::IndexCycles,
        Self::QueryOperations,
        Self::CrudCycles,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SchemaCreation => "schema_creation",
            Self::SchemaAlteration => "schema_alteration",
            Self::IndexCycles => "index_cycles",
            Self::QueryOperations => "query_operations",
            Self::CrudCycles => "crud_cycles",
        }
    }

    /// `(iterations, sample_stride, leak_threshold)` used when a config omits them.
    ///
    /// Query loops run many cheap iterations and get a tighter threshold;
    /// structural churn gets a looser one.
    #[must_use]
    pub const fn defaults(self) -> (u32, u32, f64) {
        match self {
            Self::SchemaCreation | Self::SchemaAlteration => (100, 10, 0.1),
            Self::IndexCycles => (100, 10, 0.05),
            Self::QueryOperations => (1000, 100, 0.01),
            Self::CrudCycles => (500, 50, 0.05),
        }
    }

    fn workload(self) -> Box<dyn Workload> {
        match self {
            Self::SchemaCreation => Box::new(SchemaCreation),
            Self::SchemaAlteration => Box::new(SchemaAlteration),
            Self::IndexCycles => Box::new(IndexCycles),
            Self::QueryOperations => Box::new(QueryOperations),
            Self::CrudCycles => Box::new(CrudCycles),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-scenario configuration record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioConfig {
    name: String,
    kind: ScenarioKind,
    iterations: u32,
    sample_stride: u32,
    /// Percent change above which the trend counts as a leak
    leak_threshold: f64,
    metric: TrackedMetric,
}

impl ScenarioConfig {
    /// Configuration for a built-in kind with its default parameters.
    #[must_use]
    pub fn for_kind(kind: ScenarioKind) -> Self {
        let (iterations, sample_stride, leak_threshold) = kind.defaults();
        Self {
            name: kind.name().to_string(),
            kind,
            iterations,
            sample_stride,
            leak_threshold,
            metric: TrackedMetric::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_sample_stride(mut self, sample_stride: u32) -> Self {
        self.sample_stride = sample_stride;
        self
    }

    #[must_use]
    pub const fn with_leak_threshold(mut self, leak_threshold: f64) -> Self {
        self.leak_threshold = leak_threshold;
        self
    }

    #[must_use]
    pub const fn with_metric(mut self, metric: TrackedMetric) -> Self {
        self.metric = metric;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> ScenarioKind {
        self.kind
    }

    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub const fn sample_stride(&self) -> u32 {
        self.sample_stride
    }

    #[must_use]
    pub const fn leak_threshold(&self) -> f64 {
        self.leak_threshold
    }

    #[must_use]
    pub const fn metric(&self) -> TrackedMetric {
        self.metric
    }

    /// Check that the record can drive a run.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the name is empty, `iterations` is zero or
    /// above [`MAX_ITERATIONS`], `sample_stride` is zero or exceeds the
    /// iteration count, or the threshold is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(ProfilerError::InvalidConfig(reason));

        if self.name.trim().is_empty() {
            return invalid("scenario name cannot be empty".to_string());
        }
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return invalid(format!(
                "{}: iterations must be between 1 and {MAX_ITERATIONS}, got {}",
                self.name, self.iterations
            ));
        }
        if self.sample_stride == 0 {
            return invalid(format!("{}: sample_stride must be greater than 0", self.name));
        }
        if self.sample_stride > self.iterations {
            return invalid(format!(
                "{}: sample_stride {} exceeds iterations {}",
                self.name, self.sample_stride, self.iterations
            ));
        }
        if !self.leak_threshold.is_finite() || self.leak_threshold < 0.0 {
            return invalid(format!(
                "{}: leak_threshold must be a non-negative number, got {}",
                self.name, self.leak_threshold
            ));
        }
        Ok(())
    }
}

/// The domain work behind a scenario.
pub trait Workload {
    /// Prepare preconditions once before the baseline sample.
    ///
    /// # Errors
    ///
    /// Returns the failing command's error.
    fn setup(&mut self, exec: &mut dyn CommandExecutor) -> Result<()>;

    /// Perform iteration `iteration` (0-based).
    ///
    /// # Errors
    ///
    /// Returns the failing command's error.
    fn operation(&mut self, exec: &mut dyn CommandExecutor, iteration: u32) -> Result<()>;

    /// Clear all state the scenario created.
    ///
    /// # Errors
    ///
    /// Returns the failing command's error.
    fn teardown(&mut self, exec: &mut dyn CommandExecutor) -> Result<()> {
        exec.flush_all()
    }
}

/// Samples collected by one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    samples: Vec<Sample>,
    iterations: u32,
}

impl SampleSeries {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            iterations: 0,
        }
    }

    fn record(&mut self, iteration: u32, value: f64) {
        let ordinal = u32::try_from(self.samples.len()).unwrap_or(u32::MAX);
        self.samples.push(Sample::new(ordinal, iteration, value));
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[must_use]
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Iterations actually performed.
    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub fn baseline(&self) -> Option<f64> {
        self.samples.first().map(Sample::value)
    }

    #[must_use]
    pub fn final_value(&self) -> Option<f64> {
        self.samples.last().map(Sample::value)
    }
}

/// A configured scenario bound to its workload.
pub struct Scenario {
    config: ScenarioConfig,
    workload: Box<dyn Workload>,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Scenario {
    /// Bind a configuration to a custom workload.
    #[must_use]
    pub fn new(config: ScenarioConfig, workload: Box<dyn Workload>) -> Self {
        Self { config, workload }
    }

    /// Bind a configuration to the built-in workload for its kind.
    #[must_use]
    pub fn from_config(config: ScenarioConfig) -> Self {
        let workload = config.kind().workload();
        Self::new(config, workload)
    }

    #[must_use]
    pub const fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Number of samples a complete run records.
    #[must_use]
    pub fn expected_samples(&self) -> u32 {
        // baseline + stride samples + final
        (self.config.iterations / self.config.sample_stride.max(1)).saturating_add(2)
    }

    /// Run setup, the baseline sample, every iteration, and the final sample.
    ///
    /// # Errors
    ///
    /// - `OperationFailed` carrying the scenario name and 0-based iteration
    ///   index when an iteration fails; the partial series is dropped
    /// - `UnavailableMetric` when a sample cannot be taken
    /// - the setup command's error when preconditions cannot be created
    pub fn run<T>(&mut self, target: &mut T) -> Result<SampleSeries>
    where
        T: CommandExecutor + MetricSource,
    {
        let metric = self.config.metric;
        let stride = self.config.sample_stride.max(1);
        let capacity = usize::try_from(self.expected_samples()).unwrap_or(usize::MAX);
        let mut series = SampleSeries::with_capacity(capacity.min(MAX_PREALLOCATED_SAMPLES));

        self.workload.setup(target)?;
        series.record(0, target.sample(metric)?);

        for iteration in 0..self.config.iterations {
            self.workload
                .operation(target, iteration)
                .map_err(|e| ProfilerError::operation_failed(&self.config.name, iteration, e))?;

            let completed = iteration + 1;
            if completed % stride == 0 {
                let value = target.sample(metric)?;
                debug!(scenario = %self.config.name, completed, value, "sample");
                series.record(completed, value);
            }
        }

        series.iterations = self.config.iterations;
        series.record(series.iterations, target.sample(metric)?);
        Ok(series)
    }

    /// Clear the state this scenario created.
    ///
    /// # Errors
    ///
    /// Returns the workload's teardown error.
    pub fn teardown<T: CommandExecutor>(&mut self, target: &mut T) -> Result<()> {
        self.workload.teardown(target)
    }
}

// ============================================================================
// Built-in workloads
// ============================================================================

struct SchemaCreation;

impl Workload for SchemaCreation {
    fn setup(&mut self, _exec: &mut dyn CommandExecutor) -> Result<()> {
        Ok(())
    }

    fn operation(&mut self, exec: &mut dyn CommandExecutor, iteration: u32) -> Result<()> {
        let namespace = format!("ns_{iteration}");
        exec.create_namespace(&namespace)?;
        exec.create_schema(
            &format!("{namespace}.table"),
            &[
                ColumnSpec::new("ID", ColumnType::Integer, true),
                ColumnSpec::new("NAME", ColumnType::String, false),
                ColumnSpec::new("VALUE", ColumnType::Integer, false),
            ],
        )
    }
}

struct SchemaAlteration;

impl Workload for SchemaAlteration {
    fn setup(&mut self, exec: &mut dyn CommandExecutor) -> Result<()> {
        exec.create_namespace(NAMESPACE)?;
        exec.create_schema(TABLE, &[ColumnSpec::new("ID", ColumnType::Integer, true)])
    }

    fn operation(&mut self, exec: &mut dyn CommandExecutor, iteration: u32) -> Result<()> {
        exec.alter_schema(
            TABLE,
            AlterAction::AddColumn(ColumnSpec::new(
                format!("col_{iteration}"),
                ColumnType::String,
                false,
            )),
        )
    }
}

fn seed_rows(exec: &mut dyn CommandExecutor, rows: u32) -> Result<()> {
    (0..rows).try_for_each(|i| {
        exec.insert(
            TABLE,
            &[
                FieldValue::new("ID", i),
                FieldValue::new("VALUE", u64::from(i) * 10),
            ],
        )
        .map(drop)
    })
}

struct IndexCycles;

impl Workload for IndexCycles {
    fn setup(&mut self, exec: &mut dyn CommandExecutor) -> Result<()> {
        exec.create_namespace(NAMESPACE)?;
        exec.create_schema(
            TABLE,
            &[
                ColumnSpec::new("ID", ColumnType::Integer, false),
                ColumnSpec::new("VALUE", ColumnType::Integer, false),
            ],
        )?;
        seed_rows(exec, SEED_ROWS)
    }

    fn operation(&mut self, exec: &mut dyn CommandExecutor, _iteration: u32) -> Result<()> {
        exec.alter_schema(TABLE, AlterAction::AddIndex("VALUE".to_string()))?;
        exec.alter_schema(TABLE, AlterAction::DropIndex("VALUE".to_string()))
    }
}

struct QueryOperations;

impl Workload for QueryOperations {
    fn setup(&mut self, exec: &mut dyn CommandExecutor) -> Result<()> {
        exec.create_namespace(NAMESPACE)?;
        exec.create_schema(
            TABLE,
            &[
                ColumnSpec::new("ID", ColumnType::Integer, true),
                ColumnSpec::new("VALUE", ColumnType::Integer, false),
            ],
        )?;
        seed_rows(exec, SEED_ROWS)
    }

    fn operation(&mut self, exec: &mut dyn CommandExecutor, iteration: u32) -> Result<()> {
        exec.select(TABLE, Some(&Predicate::eq("ID", iteration % SEED_ROWS)))
            .map(drop)
    }
}

struct CrudCycles;

impl Workload for CrudCycles {
    fn setup(&mut self, exec: &mut dyn CommandExecutor) -> Result<()> {
        exec.create_namespace(NAMESPACE)?;
        exec.create_schema(
            TABLE,
            &[
                ColumnSpec::new("ID", ColumnType::Integer, true),
                ColumnSpec::new("VALUE", ColumnType::Integer, false),
            ],
        )
    }

    fn operation(&mut self, exec: &mut dyn CommandExecutor, iteration: u32) -> Result<()> {
        let by_id = Predicate::eq("ID", iteration);
        exec.insert(
            TABLE,
            &[
                FieldValue::new("ID", iteration),
                FieldValue::new("VALUE", iteration),
            ],
        )?;
        exec.select(TABLE, Some(&by_id))?;
        exec.update(
            TABLE,
            &by_id,
            &[FieldValue::new("VALUE", u64::from(iteration) * 2)],
        )?;
        exec.delete(TABLE, Some(&by_id)).map(drop)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::command::{Reply, TableCommand};
    use crate::metrics::MemoryStats;

    /// Answers every command with a plausible reply and grows memory by one
    /// byte per command.
    #[derive(Default)]
    struct Scripted {
        sent: Vec<String>,
        memory: u64,
        fail_on: Option<&'static str>,
    }

    impl CommandExecutor for Scripted {
        fn execute(&mut self, command: &TableCommand) -> Result<Reply> {
            let line = command.to_string();
            if self.fail_on.is_some_and(|needle| line.contains(needle)) {
                return Err(ProfilerError::command(command.name(), "ERR scripted failure"));
            }
            self.sent.push(line);
            self.memory += 1;
            Ok(match command {
                TableCommand::Insert { .. } => Reply::Text("1".to_string()),
                TableCommand::Select { .. } => Reply::Rows(Vec::new()),
                TableCommand::Update { .. } | TableCommand::Delete { .. } => Reply::Integer(1),
                _ => Reply::Status("OK".to_string()),
            })
        }
    }

    impl MetricSource for Scripted {
        fn memory_stats(&mut self) -> Result<MemoryStats> {
            Ok(MemoryStats::new(1000 + self.memory, 2000, 3000, 1.0))
        }
    }

    #[test]
    fn test_stride_sampling_with_off_grid_final() {
        let config = ScenarioConfig::for_kind(ScenarioKind::CrudCycles)
            .with_iterations(10)
            .with_sample_stride(3);
        let mut scenario = Scenario::from_config(config);
        let series = scenario.run(&mut Scripted::default()).unwrap();

        let iterations: Vec<u32> = series.samples().iter().map(Sample::iteration).collect();
        assert_eq!(iterations, vec![0, 3, 6, 9, 10]);
        let ordinals: Vec<u32> = series.samples().iter().map(Sample::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
        assert_eq!(series.iterations(), 10);
        assert_eq!(scenario.expected_samples(), 5);
    }

    #[test]
    fn test_final_sample_taken_on_stride_boundary() {
        let config = ScenarioConfig::for_kind(ScenarioKind::SchemaCreation)
            .with_iterations(20)
            .with_sample_stride(10);
        let series = Scenario::from_config(config)
            .run(&mut Scripted::default())
            .unwrap();
        let iterations: Vec<u32> = series.samples().iter().map(Sample::iteration).collect();
        assert_eq!(iterations, vec![0, 10, 20, 20]);
    }

    #[test]
    fn test_baseline_follows_setup() {
        let config = ScenarioConfig::for_kind(ScenarioKind::QueryOperations)
            .with_iterations(5)
            .with_sample_stride(5);
        let mut target = Scripted::default();
        let series = Scenario::from_config(config).run(&mut target).unwrap();

        // namespace + schema + 100 seed rows precede the baseline
        assert!((series.baseline().unwrap() - 1102.0).abs() < f64::EPSILON);
        assert!((series.final_value().unwrap() - 1107.0).abs() < f64::EPSILON);
        assert_eq!(target.sent[102], "TABLE.SELECT test.data WHERE ID=0");
    }

    #[test]
    fn test_crud_cycle_commands() {
        let config = ScenarioConfig::for_kind(ScenarioKind::CrudCycles)
            .with_iterations(1)
            .with_sample_stride(1);
        let mut target = Scripted::default();
        Scenario::from_config(config).run(&mut target).unwrap();
        assert_eq!(
            &target.sent[2..],
            &[
                "TABLE.INSERT test.data ID=0 VALUE=0",
                "TABLE.SELECT test.data WHERE ID=0",
                "TABLE.UPDATE test.data WHERE ID=0 SET VALUE=0",
                "TABLE.DELETE test.data WHERE ID=0",
            ]
        );
    }

    #[test]
    fn test_failing_iteration_reports_index() {
        let config = ScenarioConfig::for_kind(ScenarioKind::SchemaCreation)
            .with_iterations(10)
            .with_sample_stride(2);
        let mut target = Scripted {
            fail_on: Some("ns_7"),
            ..Scripted::default()
        };
        let err = Scenario::from_config(config).run(&mut target).unwrap_err();
        match err {
            ProfilerError::OperationFailed {
                scenario,
                iteration,
                ..
            } => {
                assert_eq!(scenario, "schema_creation");
                assert_eq!(iteration, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_records() {
        let base = ScenarioConfig::for_kind(ScenarioKind::IndexCycles);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_iterations(0).validate().is_err());
        assert!(base.clone().with_sample_stride(0).validate().is_err());
        assert!(base.clone().with_sample_stride(101).validate().is_err());
        assert!(base.clone().with_leak_threshold(-1.0).validate().is_err());
        assert!(base.clone().with_leak_threshold(f64::NAN).validate().is_err());
        assert!(base.with_name("  ").validate().is_err());
    }

    /// Range scans over a shrinking window, then drops the table.
    struct RangeSweep;

    impl Workload for RangeSweep {
        fn setup(&mut self, _exec: &mut dyn CommandExecutor) -> Result<()> {
            Ok(())
        }

        fn operation(&mut self, exec: &mut dyn CommandExecutor, iteration: u32) -> Result<()> {
            use crate::command::{CompareOp, Condition};

            let window = Predicate::new(Condition::new("ID", CompareOp::Gt, iteration))
                .and(Condition::new("ID", CompareOp::Le, iteration + 5))
                .or(Condition::new("VALUE", CompareOp::Lt, 0));
            exec.select(TABLE, Some(&window))?;
            exec.drop_table(TABLE, true)
        }
    }

    #[test]
    fn test_custom_workload_uses_full_command_surface() {
        let config = ScenarioConfig::for_kind(ScenarioKind::QueryOperations)
            .with_name("range_sweep")
            .with_iterations(2)
            .with_sample_stride(1);
        let mut target = Scripted::default();
        let series = Scenario::new(config, Box::new(RangeSweep)).run(&mut target).unwrap();

        assert_eq!(series.samples().len(), 4);
        assert_eq!(
            target.sent,
            vec![
                "TABLE.SELECT test.data WHERE ID>0 AND ID<=5 OR VALUE<0",
                "TABLE.DROP test.data FORCE",
                "TABLE.SELECT test.data WHERE ID>1 AND ID<=6 OR VALUE<0",
                "TABLE.DROP test.data FORCE",
            ]
        );
    }

    #[test]
    fn test_iteration_limit() {
        let base = ScenarioConfig::for_kind(ScenarioKind::QueryOperations).with_sample_stride(1);
        assert!(base.clone().with_iterations(MAX_ITERATIONS).validate().is_ok());

        let err = base.clone().with_iterations(MAX_ITERATIONS + 1).validate().unwrap_err();
        assert!(err.to_string().contains("iterations must be between 1 and"));

        // An unvalidated record at the u32 limit still sizes without overflow.
        let unbounded = Scenario::from_config(base.with_iterations(u32::MAX));
        assert!(unbounded.config().validate().is_err());
        assert_eq!(unbounded.expected_samples(), u32::MAX);
    }

    #[test]
    fn test_kind_defaults() {
        let query = ScenarioConfig::for_kind(ScenarioKind::QueryOperations);
        assert_eq!(query.name(), "query_operations");
        assert_eq!(query.iterations(), 1000);
        assert_eq!(query.sample_stride(), 100);
        assert!((query.leak_threshold() - 0.01).abs() < f64::EPSILON);
        assert_eq!(query.metric(), TrackedMetric::UsedMemory);
    }
}
