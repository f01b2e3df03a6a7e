//! Leak verdicts from trend estimates.

use serde::{Deserialize, Serialize};

use crate::trend::Trend;

/// Boolean leak classification with its explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakVerdict {
    is_leak: bool,
    rationale: String,
}

impl LeakVerdict {
    #[must_use]
    pub const fn is_leak(&self) -> bool {
        self.is_leak
    }

    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    #[must_use]
    pub fn into_parts(self) -> (bool, String) {
        (self.is_leak, self.rationale)
    }
}

/// Classify a trend against a per-scenario threshold, expressed in percent.
///
/// A leak requires `percent_change > threshold`; an undefined trend is never a
/// leak and its rationale names the reason.
#[must_use]
pub fn classify(trend: &Trend, threshold: f64) -> LeakVerdict {
    match trend {
        Trend::Undefined(reason) => LeakVerdict {
            is_leak: false,
            rationale: reason.to_string(),
        },
        Trend::Measured(result) => {
            let percent = result.percent_change();
            if percent > threshold {
                LeakVerdict {
                    is_leak: true,
                    rationale: format!("Memory increasing at {percent:.2}% per operation"),
                }
            } else {
                LeakVerdict {
                    is_leak: false,
                    rationale: format!("Memory stable (trend: {percent:.2}%)"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::trend::{Sample, estimate};
    use proptest::prelude::*;

    fn trend_of(values: &[f64]) -> Trend {
        let samples: Vec<Sample> = values
            .iter()
            .zip(0_u32..)
            .map(|(value, i)| Sample::new(i, i, *value))
            .collect();
        estimate(&samples)
    }

    #[test]
    fn test_rising_series_is_leak() {
        let verdict = classify(&trend_of(&[1000.0, 1000.0, 1000.0, 1050.0, 1100.0]), 0.1);
        assert!(verdict.is_leak());
        assert_eq!(verdict.rationale(), "Memory increasing at 12.50% per operation");
    }

    #[test]
    fn test_noisy_flat_series_is_stable() {
        let verdict = classify(&trend_of(&[5000.0, 5002.0, 4998.0, 5001.0, 4999.0]), 0.1);
        assert!(!verdict.is_leak());
        assert_eq!(verdict.rationale(), "Memory stable (trend: -0.03%)");
    }

    #[test]
    fn test_threshold_is_strict() {
        // 100 -> 101 -> 102 gives exactly 3% projected change.
        let trend = trend_of(&[100.0, 101.0, 102.0]);
        assert!(!classify(&trend, 3.0).is_leak());
        assert!(classify(&trend, 2.99).is_leak());
    }

    #[test]
    fn test_undefined_trends_never_leak() {
        let short = classify(&trend_of(&[1.0, 1_000_000.0]), 0.0);
        assert!(!short.is_leak());
        assert!(short.rationale().contains("Not enough samples"));

        let zero = classify(&trend_of(&[0.0, 500.0, 1000.0, 5000.0]), 0.0);
        assert!(!zero.is_leak());
        assert!(zero.rationale().contains("zero baseline"));
    }

    proptest! {
        #[test]
        fn prop_constant_series_never_leaks(value in 1.0_f64..1e9, n in 0_usize..50) {
            prop_assert!(!classify(&trend_of(&vec![value; n]), 0.0).is_leak());
        }

        #[test]
        fn prop_zero_baseline_never_leaks(growth in prop::collection::vec(0.0_f64..1e9, 2..30)) {
            let mut values = vec![0.0];
            values.extend(growth);
            let verdict = classify(&trend_of(&values), 0.0);
            prop_assert!(!verdict.is_leak());
        }
    }
}
