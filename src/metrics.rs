//! Memory metrics collection and storage

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};
use crate::trend::Sample;

/// Which memory statistic a scenario tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    #[default]
    UsedMemory,
    UsedMemoryRss,
    UsedMemoryPeak,
    AllocatorAllocated,
    AllocatorActive,
    AllocatorResident,
}

impl TrackedMetric {
    /// The `INFO memory` key this metric is read from
    #[must_use]
    pub const fn info_key(self) -> &'static str {
        match self {
            Self::UsedMemory => "used_memory",
            Self::UsedMemoryRss => "used_memory_rss",
            Self::UsedMemoryPeak => "used_memory_peak",
            Self::AllocatorAllocated => "allocator_allocated",
            Self::AllocatorActive => "allocator_active",
            Self::AllocatorResident => "allocator_resident",
        }
    }
}

impl std::fmt::Display for TrackedMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.info_key())
    }
}

/// Field names from the `# Memory` section of `INFO memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoField {
    UsedMemory,
    UsedMemoryRss,
    UsedMemoryPeak,
    FragmentationRatio,
    AllocatorAllocated,
    AllocatorActive,
    AllocatorResident,
}

impl InfoField {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "used_memory" => Some(Self::UsedMemory),
            "used_memory_rss" => Some(Self::UsedMemoryRss),
            "used_memory_peak" => Some(Self::UsedMemoryPeak),
            "mem_fragmentation_ratio" => Some(Self::FragmentationRatio),
            "allocator_allocated" => Some(Self::AllocatorAllocated),
            "allocator_active" => Some(Self::AllocatorActive),
            "allocator_resident" => Some(Self::AllocatorResident),
            _ => None,
        }
    }
}

/// Memory statistics reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Bytes allocated by the service allocator
    used_memory: u64,

    /// Resident set size in bytes
    used_memory_rss: u64,

    /// Peak `used_memory` in bytes
    used_memory_peak: u64,

    /// RSS / used memory
    mem_fragmentation_ratio: f64,

    allocator_allocated: u64,
    allocator_active: u64,
    allocator_resident: u64,
}

impl MemoryStats {
    /// Create memory stats with allocator fields zeroed
    #[must_use]
    pub const fn new(
        used_memory: u64,
        used_memory_rss: u64,
        used_memory_peak: u64,
        mem_fragmentation_ratio: f64,
    ) -> Self {
        Self {
            used_memory,
            used_memory_rss,
            used_memory_peak,
            mem_fragmentation_ratio,
            allocator_allocated: 0,
            allocator_active: 0,
            allocator_resident: 0,
        }
    }

    #[must_use]
    pub const fn with_allocator(mut self, allocated: u64, active: u64, resident: u64) -> Self {
        self.allocator_allocated = allocated;
        self.allocator_active = active;
        self.allocator_resident = resident;
        self
    }

    #[must_use]
    pub const fn used_memory(&self) -> u64 {
        self.used_memory
    }

    #[must_use]
    pub const fn used_memory_rss(&self) -> u64 {
        self.used_memory_rss
    }

    #[must_use]
    pub const fn used_memory_peak(&self) -> u64 {
        self.used_memory_peak
    }

    #[must_use]
    pub const fn mem_fragmentation_ratio(&self) -> f64 {
        self.mem_fragmentation_ratio
    }

    #[must_use]
    pub const fn allocator_allocated(&self) -> u64 {
        self.allocator_allocated
    }

    #[must_use]
    pub const fn allocator_active(&self) -> u64 {
        self.allocator_active
    }

    #[must_use]
    pub const fn allocator_resident(&self) -> u64 {
        self.allocator_resident
    }

    /// Value of the tracked statistic as a sample value
    #[must_use]
    pub const fn value_of(&self, metric: TrackedMetric) -> f64 {
        let bytes = match metric {
            TrackedMetric::UsedMemory => self.used_memory,
            TrackedMetric::UsedMemoryRss => self.used_memory_rss,
            TrackedMetric::UsedMemoryPeak => self.used_memory_peak,
            TrackedMetric::AllocatorAllocated => self.allocator_allocated,
            TrackedMetric::AllocatorActive => self.allocator_active,
            TrackedMetric::AllocatorResident => self.allocator_resident,
        };
        bytes as f64
    }

    /// Parse the text payload of `INFO memory`.
    ///
    /// # Errors
    ///
    /// Returns `UnavailableMetric` if a required field is missing or any
    /// recognised field fails to parse. Allocator fields default to 0.
    pub fn parse_info(payload: &str) -> Result<Self> {
        /// Intermediate accumulator for parsed fields
        #[derive(Debug, Default)]
        struct StatsAccumulator {
            used_memory: Option<u64>,
            used_memory_rss: Option<u64>,
            used_memory_peak: Option<u64>,
            fragmentation: Option<f64>,
            allocator_allocated: Option<u64>,
            allocator_active: Option<u64>,
            allocator_resident: Option<u64>,
        }

        let acc = payload
            .lines()
            .filter_map(|line| Self::parse_info_line(line).transpose())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .try_fold(StatsAccumulator::default(), |mut acc, (field, raw)| {
                match field {
                    InfoField::UsedMemory => acc.used_memory = Some(parse_bytes(field, raw)?),
                    InfoField::UsedMemoryRss => {
                        acc.used_memory_rss = Some(parse_bytes(field, raw)?);
                    }
                    InfoField::UsedMemoryPeak => {
                        acc.used_memory_peak = Some(parse_bytes(field, raw)?);
                    }
                    InfoField::FragmentationRatio => {
                        acc.fragmentation = Some(raw.parse::<f64>().map_err(|e| {
                            ProfilerError::unavailable_metric(format!(
                                "malformed mem_fragmentation_ratio '{raw}': {e}"
                            ))
                        })?);
                    }
                    InfoField::AllocatorAllocated => {
                        acc.allocator_allocated = Some(parse_bytes(field, raw)?);
                    }
                    InfoField::AllocatorActive => {
                        acc.allocator_active = Some(parse_bytes(field, raw)?);
                    }
                    InfoField::AllocatorResident => {
                        acc.allocator_resident = Some(parse_bytes(field, raw)?);
                    }
                }
                Ok::<_, ProfilerError>(acc)
            })?;

        let missing = |name: &str| ProfilerError::unavailable_metric(format!("{name} not found"));

        let stats = Self::new(
            acc.used_memory.ok_or_else(|| missing("used_memory"))?,
            acc.used_memory_rss.ok_or_else(|| missing("used_memory_rss"))?,
            acc.used_memory_peak
                .ok_or_else(|| missing("used_memory_peak"))?,
            acc.fragmentation
                .ok_or_else(|| missing("mem_fragmentation_ratio"))?,
        );

        Ok(stats.with_allocator(
            acc.allocator_allocated.unwrap_or(0),
            acc.allocator_active.unwrap_or(0),
            acc.allocator_resident.unwrap_or(0),
        ))
    }

    /// Split a `key:value` line. Section headers, blank lines and unknown keys
    /// yield `None`.
    fn parse_info_line(line: &str) -> Result<Option<(InfoField, &str)>> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let Some((key, value)) = line.split_once(':') else {
            return Ok(None);
        };
        Ok(InfoField::from_key(key).map(|field| (field, value.trim())))
    }
}

fn parse_bytes(field: InfoField, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|e| {
        ProfilerError::unavailable_metric(format!("malformed {field:?} value '{raw}': {e}"))
    })
}

/// Point-in-time measurement of the target service.
///
/// No caching: every call performs a fresh query.
pub trait MetricSource {
    /// Query the full memory statistics.
    ///
    /// # Errors
    ///
    /// Returns `UnavailableMetric` when the service cannot be reached or the
    /// reply lacks the expected fields.
    fn memory_stats(&mut self) -> Result<MemoryStats>;

    /// Measure one tracked statistic.
    ///
    /// # Errors
    ///
    /// Propagates `memory_stats` failures.
    fn sample(&mut self, metric: TrackedMetric) -> Result<f64> {
        self.memory_stats().map(|stats| stats.value_of(metric))
    }

    /// Measure used memory.
    ///
    /// # Errors
    ///
    /// Propagates `memory_stats` failures.
    fn measure(&mut self) -> Result<f64> {
        self.sample(TrackedMetric::UsedMemory)
    }
}

/// One collected sample, as written to the sample log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    timestamp: DateTime<Utc>,
    scenario: String,
    ordinal: u32,
    iteration: u32,
    value: f64,
}

impl SampleRecord {
    #[must_use]
    pub fn new(scenario: impl Into<String>, sample: &Sample) -> Self {
        Self {
            timestamp: Utc::now(),
            scenario: scenario.into(),
            ordinal: sample.ordinal(),
            iteration: sample.iteration(),
            value: sample.value(),
        }
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    #[must_use]
    pub const fn ordinal(&self) -> u32 {
        self.ordinal
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub const fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }
}

/// Logger for writing samples to a file (JSON lines)
pub struct SampleLog {
    output_path: PathBuf,
}

impl SampleLog {
    #[must_use]
    pub const fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }

    /// Append every sample of one scenario
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be written or JSON serialization fails
    pub fn append(&self, scenario: &str, samples: &[Sample]) -> Result<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .map_err(|e| ProfilerError::ReportWrite(e.to_string()))?;

        for sample in samples {
            let json = serde_json::to_string(&SampleRecord::new(scenario, sample))?;
            writeln!(file, "{json}").map_err(|e| ProfilerError::ReportWrite(e.to_string()))?;
        }

        Ok(())
    }

    /// Read all records from the log file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or JSON parsing fails
    pub fn read_records(&self) -> Result<Vec<SampleRecord>> {
        if !Path::new(&self.output_path).exists() {
            return Ok(Vec::new());
        }

        let file =
            File::open(&self.output_path).map_err(|e| ProfilerError::Io(e.to_string()))?;

        BufReader::new(file)
            .lines()
            .map(|line_result| {
                let line = line_result.map_err(|e| ProfilerError::Io(e.to_string()))?;
                serde_json::from_str(&line).map_err(Into::into)
            })
            .collect()
    }
}
