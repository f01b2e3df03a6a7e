//! Least-squares trend estimation over a sample series.
//!
//! The regression runs on sample *position* (0, 1, 2, ...), not on the iteration
//! at which each sample was taken. Samples are treated as equally spaced points
//! even when the stride leaves the final one off-grid.
//!
//! `percent_change` extrapolates the slope over the number of samples `n`, not
//! over the number of iterations performed. A coarser stride therefore reports a
//! smaller percentage for the same underlying growth. Scenario thresholds are
//! calibrated against this normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fewer samples than this cannot produce a trend.
pub const MIN_SAMPLES: usize = 3;

/// One measurement of the tracked metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position in collection order
    ordinal: u32,

    /// Operations completed when the sample was taken
    iteration: u32,

    value: f64,
}

impl Sample {
    #[must_use]
    pub const fn new(ordinal: u32, iteration: u32, value: f64) -> Self {
        Self {
            ordinal,
            iteration,
            value,
        }
    }

    #[must_use]
    pub const fn ordinal(&self) -> u32 {
        self.ordinal
    }

    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }
}

/// A numeric trend over at least [`MIN_SAMPLES`] samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    slope: f64,
    sample_count: usize,
    percent_change: f64,
}

impl TrendResult {
    /// Change in value per sample position.
    #[must_use]
    pub const fn slope(&self) -> f64 {
        self.slope
    }

    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Projected change over the run relative to the baseline, in percent.
    #[must_use]
    pub const fn percent_change(&self) -> f64 {
        self.percent_change
    }
}

/// Why a series produced no numeric trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Insufficiency {
    InsufficientData { sample_count: usize },
    NoVariance,
    /// Growth cannot be normalized against a zero first sample.
    ZeroBaseline { slope: f64 },
}

impl fmt::Display for Insufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { sample_count } => {
                write!(f, "Not enough samples ({sample_count} < {MIN_SAMPLES})")
            }
            Self::NoVariance => f.write_str("No variance in data"),
            Self::ZeroBaseline { .. } => f.write_str("Initial memory is zero (zero baseline)"),
        }
    }
}

/// Outcome of trend estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trend {
    Measured(TrendResult),
    Undefined(Insufficiency),
}

impl Trend {
    #[must_use]
    pub const fn percent_change(&self) -> Option<f64> {
        match self {
            Self::Measured(result) => Some(result.percent_change),
            Self::Undefined(_) => None,
        }
    }

    #[must_use]
    pub const fn slope(&self) -> Option<f64> {
        match self {
            Self::Measured(result) => Some(result.slope),
            Self::Undefined(Insufficiency::ZeroBaseline { slope }) => Some(*slope),
            Self::Undefined(_) => None,
        }
    }
}

/// Estimate the linear trend of `samples` by ordinary least squares.
#[must_use]
pub fn estimate(samples: &[Sample]) -> Trend {
    let n = samples.len();
    if n < MIN_SAMPLES {
        return Trend::Undefined(Insufficiency::InsufficientData { sample_count: n });
    }

    let baseline = samples.first().map_or(0.0, Sample::value);
    let count = n as f64;
    let x_mean = (count - 1.0) / 2.0;
    // Values are shifted by the baseline; the slope is unchanged and a flat
    // series sums to exactly zero.
    let y_mean = samples.iter().map(|s| s.value - baseline).sum::<f64>() / count;

    let (numerator, denominator) = samples.iter().enumerate().fold(
        (0.0_f64, 0.0_f64),
        |(num, den), (position, sample)| {
            let dx = position as f64 - x_mean;
            (
                dx.mul_add(sample.value - baseline - y_mean, num),
                dx.mul_add(dx, den),
            )
        },
    );

    if denominator == 0.0 {
        return Trend::Undefined(Insufficiency::NoVariance);
    }

    let slope = numerator / denominator;

    if baseline == 0.0 {
        return Trend::Undefined(Insufficiency::ZeroBaseline { slope });
    }

    Trend::Measured(TrendResult {
        slope,
        sample_count: n,
        percent_change: slope * count * 100.0 / baseline,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::float_cmp)]

    use super::*;
    use proptest::prelude::*;

    fn series(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(u32::try_from(i).unwrap(), u32::try_from(i).unwrap(), *v))
            .collect()
    }

    fn measured(trend: Trend) -> TrendResult {
        match trend {
            Trend::Measured(result) => result,
            Trend::Undefined(reason) => panic!("expected a trend, got {reason:?}"),
        }
    }

    #[test]
    fn test_rising_tail_series() {
        let result = measured(estimate(&series(&[1000.0, 1000.0, 1000.0, 1050.0, 1100.0])));
        assert!((result.slope() - 25.0).abs() < 1e-9);
        assert_eq!(result.sample_count(), 5);
        assert!((result.percent_change() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_flat_series() {
        let result = measured(estimate(&series(&[5000.0, 5002.0, 4998.0, 5001.0, 4999.0])));
        assert!((result.slope() + 0.3).abs() < 1e-9);
        assert!((result.percent_change() + 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_regression_ignores_iteration_spacing() {
        // Off-grid final sample is still one position to the right.
        let samples = vec![
            Sample::new(0, 0, 100.0),
            Sample::new(1, 3, 110.0),
            Sample::new(2, 6, 120.0),
            Sample::new(3, 10, 130.0),
        ];
        let result = measured(estimate(&samples));
        assert!((result.slope() - 10.0).abs() < 1e-9);
        assert!((result.percent_change() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_samples() {
        assert_eq!(
            estimate(&series(&[1.0, 2.0])),
            Trend::Undefined(Insufficiency::InsufficientData { sample_count: 2 })
        );
        assert_eq!(
            estimate(&[]),
            Trend::Undefined(Insufficiency::InsufficientData { sample_count: 0 })
        );
    }

    #[test]
    fn test_zero_baseline() {
        let trend = estimate(&series(&[0.0, 100.0, 200.0]));
        assert!(matches!(
            trend,
            Trend::Undefined(Insufficiency::ZeroBaseline { .. })
        ));
        assert_eq!(trend.percent_change(), None);
        assert!((trend.slope().unwrap() - 100.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_constant_series_has_zero_change(value in 1.0_f64..1e9, n in 3_usize..64) {
            let result = measured(estimate(&series(&vec![value; n])));
            prop_assert_eq!(result.percent_change(), 0.0);
        }

        #[test]
        fn prop_linear_growth_scales_with_slope(
            baseline in 1.0_f64..1e6,
            slope in 0.1_f64..1e4,
            n in 3_usize..64,
        ) {
            let values: Vec<f64> = (0..n).map(|i| (i as f64).mul_add(slope, baseline)).collect();
            let doubled: Vec<f64> = (0..n).map(|i| (i as f64).mul_add(2.0 * slope, baseline)).collect();

            let single = measured(estimate(&series(&values)));
            let double = measured(estimate(&series(&doubled)));

            prop_assert!(single.percent_change() > 0.0);
            let ratio = double.percent_change() / single.percent_change();
            prop_assert!((ratio - 2.0).abs() < 1e-6);
        }

        #[test]
        fn prop_estimate_is_deterministic(values in prop::collection::vec(0.0_f64..1e9, 0..40)) {
            let samples = series(&values);
            prop_assert_eq!(estimate(&samples), estimate(&samples));
        }
    }
}
