//! Configuration for profiling runs
//!
//! ```toml
//! [service]
//! port = 6380
//! module_path = "./redis_table.so"
//!
//! [[scenario]]
//! kind = "crud_cycles"
//! iterations = 200
//! sample_stride = 20
//!
//! [[scenario]]
//! kind = "query_operations"
//! name = "query_rss"
//! metric = "used_memory_rss"
//! leak_threshold = 0.02
//! ```
//!
//! Omitted scenario fields fall back to the defaults of their kind. Omitting
//! every `[[scenario]]` table runs the full built-in catalogue.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ProfilerError, Result};
use crate::metrics::TrackedMetric;
use crate::scenario::{ScenarioConfig, ScenarioKind};
use crate::service::ServiceConfig;

/// One `[[scenario]]` table as written in the file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioEntry {
    kind: ScenarioKind,
    name: Option<String>,
    iterations: Option<u32>,
    sample_stride: Option<u32>,
    leak_threshold: Option<f64>,
    metric: Option<TrackedMetric>,
}

impl ScenarioEntry {
    fn resolve(self) -> ScenarioConfig {
        let defaults = ScenarioConfig::for_kind(self.kind);
        let name = self.name.unwrap_or_else(|| defaults.name().to_string());
        let iterations = self.iterations.unwrap_or(defaults.iterations());
        let sample_stride = self.sample_stride.unwrap_or(defaults.sample_stride());
        let leak_threshold = self.leak_threshold.unwrap_or(defaults.leak_threshold());
        let metric = self.metric.unwrap_or(defaults.metric());

        defaults
            .with_name(name)
            .with_iterations(iterations)
            .with_sample_stride(sample_stride)
            .with_leak_threshold(leak_threshold)
            .with_metric(metric)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    service: ServiceConfig,

    #[serde(rename = "scenario")]
    scenarios: Option<Vec<ScenarioEntry>>,
}

/// Configuration for a profiling run
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerConfig {
    service: ServiceConfig,

    /// Scenarios in execution order
    scenarios: Vec<ScenarioConfig>,
}

impl Default for ProfilerConfig {
    /// Local service on the default port with every built-in scenario.
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            scenarios: ScenarioKind::ALL
                .into_iter()
                .map(ScenarioConfig::for_kind)
                .collect(),
        }
    }
}

impl ProfilerConfig {
    /// Create a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if any section fails validation.
    pub fn new(service: ServiceConfig, scenarios: Vec<ScenarioConfig>) -> Result<Self> {
        let config = Self { service, scenarios };
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML is malformed or has unknown fields
    /// - Validation fails
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProfilerError::ConfigRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content, path)
    }

    /// Parse TOML content; `origin` only labels errors
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` for malformed TOML and `InvalidConfig` when
    /// validation fails.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ProfilerError::ConfigParse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        let scenarios = match file.scenarios {
            Some(entries) => entries.into_iter().map(ScenarioEntry::resolve).collect(),
            None => Self::default().scenarios,
        };

        Self::new(file.service, scenarios)
    }

    #[must_use]
    pub const fn service(&self) -> &ServiceConfig {
        &self.service
    }

    #[must_use]
    pub fn scenarios(&self) -> &[ScenarioConfig] {
        &self.scenarios
    }

    /// Replace the service section, e.g. with command-line overrides
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the new section is invalid.
    pub fn with_service(mut self, service: ServiceConfig) -> Result<Self> {
        service.validate()?;
        self.service = service;
        Ok(self)
    }

    /// Keep only the named scenarios, preserving configured order
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a name matches no configured scenario.
    pub fn retain_scenarios(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }

        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !self.scenarios.iter().any(|s| s.name() == *name))
            .collect();
        if !unknown.is_empty() {
            return Err(ProfilerError::InvalidConfig(format!(
                "unknown scenario(s): {}",
                unknown.join(", ")
            )));
        }

        self.scenarios
            .retain(|scenario| names.iter().any(|name| name == scenario.name()));
        Ok(self)
    }

    /// Validate every section
    fn validate(&self) -> Result<()> {
        self.service.validate()?;

        if self.scenarios.is_empty() {
            return Err(ProfilerError::InvalidConfig(
                "at least one scenario is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        self.scenarios.iter().try_for_each(|scenario| {
            scenario.validate()?;
            if seen.insert(scenario.name()) {
                Ok(())
            } else {
                Err(ProfilerError::InvalidConfig(format!(
                    "duplicate scenario name: {}",
                    scenario.name()
                )))
            }
        })
    }
}
