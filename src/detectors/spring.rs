//! Spring detector
//!
//! A Spring is a bar whose low dips below Creek on low volume, followed within a
//! few bars by a close back above Creek. Three gates apply in order:
//!
//! 1. penetration depth `(creek - low) / creek` at most `max_penetration`
//!    (deeper is a breakdown and ends the scan),
//! 2. volume ratio strictly below `max_volume_ratio`,
//! 3. a close above Creek within `max_recovery_bars`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{self, penetration_pct};
use crate::params::{check_params, get_period, get_ratio, ParamMeta, Parameterized};
use crate::range::TradingRange;
use crate::rejection::{Rejection, RejectionReason};
use crate::volume::VolumeCache;
use crate::{Period, Ratio, Result, WyckoffError, OHLCV};

impl_with_defaults!(SpringDetector);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringDetectorConfig {
    pub max_penetration: Ratio,
    pub max_volume_ratio: Ratio,
    pub max_recovery_bars: Period,
}

impl Default for SpringDetectorConfig {
    fn default() -> Self {
        Self {
            max_penetration: Ratio::new_const(helpers::MAX_PENETRATION_PCT),
            max_volume_ratio: Ratio::new_const(helpers::MAX_SPRING_VOLUME_RATIO),
            max_recovery_bars: Period::new_const(helpers::MAX_RECOVERY_BARS),
        }
    }
}

const SPRING_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "max_penetration",
        helpers::MAX_PENETRATION_PCT,
        (0.01, 0.10, 0.01),
        "Deepest low below Creek still treated as a Spring",
    ),
    ParamMeta::ratio(
        "max_volume_ratio",
        helpers::MAX_SPRING_VOLUME_RATIO,
        (0.3, 1.0, 0.05),
        "Spring volume must be strictly below this multiple of average",
    ),
    ParamMeta::period(
        "max_recovery_bars",
        helpers::MAX_RECOVERY_BARS as f64,
        (1.0, 10.0, 1.0),
        "Bars allowed for a close back above Creek",
    ),
];

impl Parameterized for SpringDetectorConfig {
    fn param_meta() -> &'static [ParamMeta] {
        SPRING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(SPRING_PARAMS, params)?;
        Ok(Self {
            max_penetration: get_ratio(params, "max_penetration", helpers::MAX_PENETRATION_PCT)?,
            max_volume_ratio: get_ratio(
                params,
                "max_volume_ratio",
                helpers::MAX_SPRING_VOLUME_RATIO,
            )?,
            max_recovery_bars: get_period(params, "max_recovery_bars", helpers::MAX_RECOVERY_BARS)?,
        })
    }

    fn config_name() -> &'static str {
        "spring_detector"
    }
}

/// A detected Spring. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub bar_index: usize,
    pub timestamp: i64,
    pub creek: f64,
    pub spring_low: f64,
    pub close: f64,
    pub volume: f64,
    /// Fraction of Creek below which the low reached, in (0, max_penetration]
    pub penetration_pct: f64,
    pub volume_ratio: f64,
    /// Bars from the Spring bar to the first close above Creek
    pub recovery_bars: usize,
    pub recovery_index: usize,
}

/// Output of one scan over a range.
#[derive(Debug, Clone, Default)]
pub struct SpringScan {
    /// Qualifying Springs in chronological order
    pub springs: Vec<Spring>,
    pub rejections: Vec<Rejection>,
    /// Present when the scan ended on a breakdown
    pub breakdown: Option<Rejection>,
}

impl SpringScan {
    #[inline]
    pub fn is_broken_down(&self) -> bool {
        self.breakdown.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpringDetector {
    pub config: SpringDetectorConfig,
}

impl SpringDetector {
    pub fn new(config: SpringDetectorConfig) -> Self {
        Self { config }
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.config.max_penetration.get() <= 0.0 {
            return Err(WyckoffError::InvalidConfig(
                "max_penetration must be positive".into(),
            ));
        }
        if self.config.max_volume_ratio.get() <= 0.0 {
            return Err(WyckoffError::InvalidConfig(
                "max_volume_ratio must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Scan the range window for every qualifying Spring.
    ///
    /// After a Spring is accepted the scan resumes past its recovery bar. A
    /// breakdown stops the scan: the range no longer supports Springs.
    pub fn scan<T: OHLCV>(
        &self,
        range: &TradingRange,
        bars: &[T],
        volumes: &VolumeCache,
    ) -> Result<SpringScan> {
        range.validate()?;
        if volumes.len() != bars.len() {
            return Err(WyckoffError::InvalidValue(
                "volume cache does not match bar series",
            ));
        }

        let mut scan = SpringScan::default();
        let mut i = bars
            .iter()
            .position(|b| range.contains_timestamp(b.timestamp()))
            .unwrap_or(bars.len());

        while i < bars.len() {
            if bars[i].low() >= range.creek {
                i += 1;
                continue;
            }

            match self.evaluate_candidate(range, bars, volumes, i) {
                Ok(spring) => {
                    tracing::debug!(
                        "[{}] spring at bar {} ({:.2}% below creek, {:.2}x volume, {} bar recovery)",
                        range.id,
                        spring.bar_index,
                        spring.penetration_pct * 100.0,
                        spring.volume_ratio,
                        spring.recovery_bars
                    );
                    i = spring.recovery_index + 1;
                    scan.springs.push(spring);
                }
                Err(rejection) => {
                    rejection.log(&range.id);
                    if matches!(rejection.reason, RejectionReason::Breakdown { .. }) {
                        tracing::info!(
                            "[{}] range broken at bar {}, spring scan stopped",
                            range.id,
                            rejection.bar_index
                        );
                        scan.breakdown = Some(rejection);
                        break;
                    }
                    scan.rejections.push(rejection);
                    i += 1;
                }
            }
        }

        Ok(scan)
    }

    /// Evaluate the bar at `index` as a Spring candidate.
    ///
    /// The caller guarantees the bar's low is below Creek.
    pub fn evaluate_candidate<T: OHLCV>(
        &self,
        range: &TradingRange,
        bars: &[T],
        volumes: &VolumeCache,
        index: usize,
    ) -> std::result::Result<Spring, Rejection> {
        let bar = &bars[index];
        let timestamp = bar.timestamp();
        let creek = range.creek;
        let max_penetration = self.config.max_penetration.get();
        let reject = |reason| Rejection::new(reason, index, timestamp);

        let penetration = penetration_pct(creek, bar.low());
        if penetration > max_penetration {
            return Err(reject(RejectionReason::Breakdown {
                penetration_pct: penetration,
                max_penetration_pct: max_penetration,
            }));
        }

        let volume_ratio = volumes.ratio_at(index).ok_or_else(|| {
            reject(RejectionReason::InsufficientVolumeHistory {
                required_bars: volumes.period().get(),
            })
        })?;
        let max_volume_ratio = self.config.max_volume_ratio.get();
        if volume_ratio >= max_volume_ratio {
            return Err(reject(RejectionReason::VolumeTooHigh {
                volume_ratio,
                max_volume_ratio,
            }));
        }

        let max_recovery = self.config.max_recovery_bars.get();
        for offset in 1..=max_recovery {
            let Some(next) = bars.get(index + offset) else {
                break;
            };
            if next.close() > creek {
                return Ok(Spring {
                    bar_index: index,
                    timestamp,
                    creek,
                    spring_low: bar.low(),
                    close: bar.close(),
                    volume: bar.volume(),
                    penetration_pct: penetration,
                    volume_ratio,
                    recovery_bars: offset,
                    recovery_index: index + offset,
                });
            }
            // Still below Creek; a deeper low on the way is a breakdown
            let deeper = penetration_pct(creek, next.low());
            if deeper > max_penetration {
                return Err(Rejection::new(
                    RejectionReason::Breakdown {
                        penetration_pct: deeper,
                        max_penetration_pct: max_penetration,
                    },
                    index + offset,
                    next.timestamp(),
                ));
            }
        }

        Err(reject(RejectionReason::NoRecovery {
            max_recovery_bars: max_recovery,
        }))
    }
}
