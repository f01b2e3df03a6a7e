//! One complete profiling run: acquire the service, run every scenario,
//! release the service.

use tracing::warn;

use crate::command::CommandExecutor;
use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::metrics::MetricSource;
use crate::report::{Report, ReportAggregator};
use crate::runner::ScenarioRunner;
use crate::scenario::Scenario;
use crate::service::{ServiceConfig, ServiceGuard, ServiceLifecycle};

/// Run all configured scenarios inside a single service acquisition.
///
/// `connect` opens the command/metric connection once the service is known
/// to be up. The service is released exactly once, after the last scenario
/// or as soon as connecting fails; a release failure is logged and does not
/// discard the report.
///
/// # Errors
///
/// Returns `ServiceUnreachable` if the service cannot be acquired or
/// connected to; no scenario runs in that case.
pub fn run_session<L, T, F>(
    config: &ProfilerConfig,
    lifecycle: L,
    connect: F,
    runner: ScenarioRunner,
) -> Result<Report>
where
    L: ServiceLifecycle,
    T: CommandExecutor + MetricSource,
    F: FnOnce(&ServiceConfig) -> Result<T>,
{
    let guard = ServiceGuard::acquire(lifecycle, config.service())?;

    let scenarios = config
        .scenarios()
        .iter()
        .cloned()
        .map(Scenario::from_config)
        .collect();

    let report = connect(config.service()).map(|mut target| {
        ReportAggregator::new(scenarios)
            .with_runner(runner)
            .run(&mut target)
    });

    if let Err(e) = guard.release() {
        warn!(error = %e, "service release failed");
    }

    report
}
