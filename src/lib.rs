#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # table-memprof
//!
//! Leak-detection profiler for the Redis table module.
//!
//! Each [`scenario::Scenario`] drives a repeated table workload, sampling one
//! server memory statistic every `sample_stride` operations. The series is fit
//! with a least-squares line ([`trend::estimate`]) and the normalised slope is
//! compared with the scenario's threshold ([`classify::classify`]). A
//! [`report::ReportAggregator`] runs scenarios back to back and collects a
//! [`report::Report`] whose exit signal keeps leaks and scenario errors apart.
//!
//! The service is reached through two traits, [`command::CommandExecutor`] and
//! [`metrics::MetricSource`], so everything except [`redis_target`] and
//! [`service::RedisServer`] runs against in-memory fakes.

pub mod classify;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod redis_target;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod service;
pub mod session;
pub mod trend;

pub use config::ProfilerConfig;
pub use error::{ProfilerError, Result};
pub use report::{ExitSignal, Report};
pub use session::run_session;
