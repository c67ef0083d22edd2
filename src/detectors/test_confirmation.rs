//! Test confirmation detector
//!
//! After a Spring recovers, supply should be exhausted: a retest that holds
//! above the Spring low on less volume than the Spring bar confirms it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers;
use super::spring::Spring;
use crate::params::{check_params, get_period, ParamMeta, Parameterized};
use crate::rejection::{Rejection, RejectionReason};
use crate::volume::VolumeCache;
use crate::{Result, WyckoffError, OHLCV};

impl_with_defaults!(TestConfirmationDetector);

/// Look-ahead window, measured in bars after the Spring bar (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDetectorConfig {
    pub min_bars_after: usize,
    pub max_bars_after: usize,
}

impl Default for TestDetectorConfig {
    fn default() -> Self {
        Self {
            min_bars_after: helpers::MIN_TEST_OFFSET,
            max_bars_after: helpers::MAX_TEST_OFFSET,
        }
    }
}

const TEST_PARAMS: &[ParamMeta] = &[
    ParamMeta::period(
        "min_bars_after",
        helpers::MIN_TEST_OFFSET as f64,
        (1.0, 10.0, 1.0),
        "Earliest bar after the Spring that may be a Test",
    ),
    ParamMeta::period(
        "max_bars_after",
        helpers::MAX_TEST_OFFSET as f64,
        (5.0, 30.0, 1.0),
        "Latest bar after the Spring that may be a Test",
    ),
];

impl Parameterized for TestDetectorConfig {
    fn param_meta() -> &'static [ParamMeta] {
        TEST_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(TEST_PARAMS, params)?;
        Ok(Self {
            min_bars_after: get_period(params, "min_bars_after", helpers::MIN_TEST_OFFSET)?.get(),
            max_bars_after: get_period(params, "max_bars_after", helpers::MAX_TEST_OFFSET)?.get(),
        })
    }

    fn config_name() -> &'static str {
        "test_detector"
    }
}

/// A confirming retest of a Spring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub bar_index: usize,
    pub timestamp: i64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Volume versus the trailing average
    pub volume_ratio: f64,
    /// Volume versus the Spring bar's volume, always below 1.0
    pub spring_volume_fraction: f64,
    pub bars_after_spring: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TestConfirmationDetector {
    pub config: TestDetectorConfig,
}

impl TestConfirmationDetector {
    pub fn new(config: TestDetectorConfig) -> Self {
        Self { config }
    }

    pub fn validate_config(&self) -> Result<()> {
        let TestDetectorConfig {
            min_bars_after,
            max_bars_after,
        } = self.config;
        if min_bars_after == 0 || min_bars_after > max_bars_after {
            return Err(WyckoffError::InvalidConfig(format!(
                "test window {min_bars_after}..={max_bars_after} is empty"
            )));
        }
        Ok(())
    }

    /// First qualifying Test for `spring`, or a `NoTest` rejection.
    ///
    /// Only bars strictly after the recovery bar and within the window count.
    pub fn find<T: OHLCV>(
        &self,
        spring: &Spring,
        bars: &[T],
        volumes: &VolumeCache,
    ) -> std::result::Result<Test, Rejection> {
        let first = (spring.bar_index + self.config.min_bars_after).max(spring.recovery_index + 1);
        let last = spring.bar_index + self.config.max_bars_after;
        // Average volume at the Spring, for bars the cache has no ratio for
        let spring_avg = spring.volume / spring.volume_ratio;

        for index in first..=last.min(bars.len().saturating_sub(1)) {
            let bar = &bars[index];
            if bar.low() < spring.spring_low || bar.volume() >= spring.volume {
                continue;
            }
            let volume_ratio = volumes.ratio_at(index).unwrap_or_else(|| {
                if spring_avg > f64::EPSILON {
                    bar.volume() / spring_avg
                } else {
                    0.0
                }
            });
            return Ok(Test {
                bar_index: index,
                timestamp: bar.timestamp(),
                low: bar.low(),
                close: bar.close(),
                volume: bar.volume(),
                volume_ratio,
                spring_volume_fraction: if spring.volume > f64::EPSILON {
                    bar.volume() / spring.volume
                } else {
                    0.0
                },
                bars_after_spring: index - spring.bar_index,
            });
        }

        Err(Rejection::new(
            RejectionReason::NoTest {
                min_bars_after: self.config.min_bars_after,
                max_bars_after: self.config.max_bars_after,
            },
            spring.bar_index,
            spring.timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn spring_at(index: usize, recovery_bars: usize) -> Spring {
        Spring {
            bar_index: index,
            timestamp: index as i64,
            creek: 100.0,
            spring_low: 98.0,
            close: 99.0,
            volume: 400.0,
            penetration_pct: 0.02,
            volume_ratio: 0.4,
            recovery_bars,
            recovery_index: index + recovery_bars,
        }
    }

    /// Bars above the Spring low at high volume
    fn series(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::new(i as i64, 101.0, 102.0, 100.5, 101.5, 1000.0))
            .collect()
    }

    fn find(spring: &Spring, bars: &[Bar]) -> std::result::Result<Test, Rejection> {
        let volumes = VolumeCache::new(bars).unwrap();
        TestConfirmationDetector::with_defaults().find(spring, bars, &volumes)
    }

    #[test]
    fn test_first_qualifying_bar_in_window() {
        let mut bars = series(40);
        bars[24].volume = 300.0;
        bars[26].volume = 200.0;
        let spring = spring_at(20, 1);

        let test = find(&spring, &bars).unwrap();
        assert_eq!(test.bar_index, 24);
        assert_eq!(test.bars_after_spring, 4);
        assert!((test.spring_volume_fraction - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_bars_before_min_offset_ignored() {
        let mut bars = series(40);
        bars[22].volume = 100.0;
        let spring = spring_at(20, 1);
        assert!(find(&spring, &bars).is_err());
    }

    #[test]
    fn test_window_starts_after_recovery() {
        let mut bars = series(40);
        bars[23].volume = 100.0;
        bars[26].volume = 100.0;
        let spring = spring_at(20, 4);
        assert_eq!(find(&spring, &bars).unwrap().bar_index, 26);
    }

    #[test]
    fn test_low_below_spring_low_disqualifies() {
        let mut bars = series(40);
        bars[24].volume = 100.0;
        bars[24].low = 97.5;
        let spring = spring_at(20, 1);
        assert!(find(&spring, &bars).is_err());
    }

    #[test]
    fn test_equal_volume_disqualifies() {
        let mut bars = series(40);
        bars[24].volume = 400.0;
        let spring = spring_at(20, 1);
        assert!(find(&spring, &bars).is_err());
    }

    #[test]
    fn test_outside_window_is_no_test() {
        let mut bars = series(40);
        bars[36].volume = 100.0;
        let spring = spring_at(20, 1);
        let rejection = find(&spring, &bars).unwrap_err();
        assert_eq!(
            rejection.reason,
            RejectionReason::NoTest {
                min_bars_after: 3,
                max_bars_after: 15
            }
        );
        assert_eq!(rejection.bar_index, 20);
    }

    #[test]
    fn test_window_truncated_by_series_end() {
        let bars = series(22);
        let spring = spring_at(20, 1);
        assert!(find(&spring, &bars).is_err());
    }

    #[test]
    fn test_empty_window_config_rejected() {
        let detector = TestConfirmationDetector::new(TestDetectorConfig {
            min_bars_after: 10,
            max_bars_after: 5,
        });
        assert!(detector.validate_config().is_err());
    }
}
