//! Sign of Strength detector
//!
//! A Sign of Strength (SOS) is a wide, high-volume close above Ice. The
//! preferred entry is the Last Point of Support (LPS): a quiet pullback that
//! holds near Ice after the breakout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{self, breakout_pct, trailing_avg_range};
use crate::params::{check_params, get_period, get_ratio, get_value, ParamMeta, Parameterized};
use crate::range::TradingRange;
use crate::scoring::SosConfidence;
use crate::volume::VolumeCache;
use crate::{OHLCVExt, Period, Ratio, Result, WyckoffError, OHLCV};

impl_with_defaults!(SosDetector);

/// How a position would be entered after a breakout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Entry on a confirmed retest of Ice as support
    Lps,
    /// Entry on the breakout bar itself
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SosDetectorConfig {
    pub min_volume_ratio: f64,
    pub min_breakout_pct: Ratio,
    /// Trailing window for the spread (bar range) average
    pub spread_period: Period,
    /// Bars after the breakout searched for an LPS
    pub lps_window: Period,
    /// How far above Ice an LPS low may sit, as a fraction of Ice
    pub lps_tolerance: Ratio,
}

impl Default for SosDetectorConfig {
    fn default() -> Self {
        Self {
            min_volume_ratio: helpers::MIN_SOS_VOLUME_RATIO,
            min_breakout_pct: Ratio::new_const(helpers::MIN_BREAKOUT_PCT),
            spread_period: Period::new_const(20),
            lps_window: Period::new_const(10),
            lps_tolerance: Ratio::new_const(0.02),
        }
    }
}

const SOS_PARAMS: &[ParamMeta] = &[
    ParamMeta::value(
        "min_volume_ratio",
        helpers::MIN_SOS_VOLUME_RATIO,
        (1.0, 3.0, 0.25),
        "Breakout volume must reach this multiple of average",
    ),
    ParamMeta::ratio(
        "min_breakout_pct",
        helpers::MIN_BREAKOUT_PCT,
        (0.0, 0.05, 0.005),
        "Close must clear Ice by this fraction",
    ),
    ParamMeta::period("spread_period", 20.0, (5.0, 50.0, 5.0), "Spread average window"),
    ParamMeta::period("lps_window", 10.0, (3.0, 20.0, 1.0), "Bars searched for an LPS"),
    ParamMeta::ratio(
        "lps_tolerance",
        0.02,
        (0.0, 0.05, 0.005),
        "Highest LPS low above Ice, as a fraction of Ice",
    ),
];

impl Parameterized for SosDetectorConfig {
    fn param_meta() -> &'static [ParamMeta] {
        SOS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(SOS_PARAMS, params)?;
        Ok(Self {
            min_volume_ratio: get_value(params, "min_volume_ratio", helpers::MIN_SOS_VOLUME_RATIO)?,
            min_breakout_pct: get_ratio(params, "min_breakout_pct", helpers::MIN_BREAKOUT_PCT)?,
            spread_period: get_period(params, "spread_period", 20)?,
            lps_window: get_period(params, "lps_window", 10)?,
            lps_tolerance: get_ratio(params, "lps_tolerance", 0.02)?,
        })
    }

    fn config_name() -> &'static str {
        "sos_detector"
    }
}

/// A detected breakout above Ice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosBreakout {
    pub bar_index: usize,
    pub timestamp: i64,
    pub ice: f64,
    pub close: f64,
    /// Fraction of Ice the close sits above it
    pub breakout_pct: f64,
    pub volume_ratio: f64,
    /// Bar range versus trailing average range
    pub spread_ratio: f64,
    /// Close location inside the bar, 0.0 low to 1.0 high
    pub close_position: f64,
}

/// Last Point of Support found after a breakout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastPointOfSupport {
    pub bar_index: usize,
    pub timestamp: i64,
    pub low: f64,
    pub close: f64,
}

/// A breakout with its entry classification and score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSos {
    pub breakout: SosBreakout,
    pub lps: Option<LastPointOfSupport>,
    pub confidence: SosConfidence,
}

#[derive(Debug, Clone, Default)]
pub struct SosDetector {
    pub config: SosDetectorConfig,
}

impl SosDetector {
    pub fn new(config: SosDetectorConfig) -> Self {
        Self { config }
    }

    pub fn validate_config(&self) -> Result<()> {
        if !self.config.min_volume_ratio.is_finite() || self.config.min_volume_ratio <= 0.0 {
            return Err(WyckoffError::InvalidConfig(
                "min_volume_ratio must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Every fresh cross above Ice on sufficient volume.
    ///
    /// A bar only counts when the previous close had not already cleared the
    /// breakout threshold.
    pub fn scan<T: OHLCV>(
        &self,
        range: &TradingRange,
        bars: &[T],
        volumes: &VolumeCache,
    ) -> Result<Vec<SosBreakout>> {
        range.validate()?;
        let threshold = self.config.min_breakout_pct.get();
        let mut breakouts = Vec::new();
        let mut above = false;

        for (i, bar) in bars.iter().enumerate() {
            if !range.contains_timestamp(bar.timestamp()) {
                continue;
            }
            let pct = breakout_pct(range.ice, bar.close());
            let was_above = above;
            above = pct >= threshold;
            if !above || was_above {
                continue;
            }
            let Some(volume_ratio) = volumes.ratio_at(i) else {
                continue;
            };
            if volume_ratio < self.config.min_volume_ratio {
                continue;
            }

            let avg_range = trailing_avg_range(bars, i, self.config.spread_period.get());
            let spread_ratio = if avg_range > f64::EPSILON {
                bar.range() / avg_range
            } else {
                1.0
            };

            tracing::debug!(
                "[{}] sign of strength at bar {} ({:.2}% above ice, {:.2}x volume)",
                range.id,
                i,
                pct * 100.0,
                volume_ratio
            );
            breakouts.push(SosBreakout {
                bar_index: i,
                timestamp: bar.timestamp(),
                ice: range.ice,
                close: bar.close(),
                breakout_pct: pct,
                volume_ratio,
                spread_ratio,
                close_position: bar.close_position().unwrap_or(0.5),
            });
        }

        Ok(breakouts)
    }

    /// First pullback after `breakout` whose low holds Ice within tolerance,
    /// closes above Ice and trades on less volume than the breakout bar.
    pub fn find_lps<T: OHLCV>(
        &self,
        range: &TradingRange,
        bars: &[T],
        breakout: &SosBreakout,
    ) -> Option<LastPointOfSupport> {
        let breakout_volume = bars.get(breakout.bar_index)?.volume();
        let ceiling = range.ice * (1.0 + self.config.lps_tolerance.get());
        let start = breakout.bar_index + 1;
        let end = (start + self.config.lps_window.get()).min(bars.len());

        bars.get(start..end)?
            .iter()
            .enumerate()
            .find(|(_, bar)| {
                bar.low() <= ceiling && bar.close() > range.ice && bar.volume() < breakout_volume
            })
            .map(|(offset, bar)| LastPointOfSupport {
                bar_index: start + offset,
                timestamp: bar.timestamp(),
                low: bar.low(),
                close: bar.close(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn range() -> TradingRange {
        TradingRange::new("R", 100.0, 110.0, 125.0)
    }

    fn base() -> Vec<Bar> {
        (0..20)
            .map(|i| Bar::new(i, 105.0, 106.0, 104.0, 105.5, 1000.0))
            .collect()
    }

    fn push(bars: &mut Vec<Bar>, low: f64, high: f64, close: f64, volume: f64) {
        let ts = bars.len() as i64;
        bars.push(Bar::new(ts, low, high, low, close, volume));
    }

    #[test]
    fn test_detects_fresh_breakout() {
        let mut bars = base();
        push(&mut bars, 108.0, 113.0, 112.5, 2500.0);
        push(&mut bars, 112.0, 114.0, 113.5, 2500.0);

        let volumes = VolumeCache::new(&bars).unwrap();
        let found = SosDetector::with_defaults()
            .scan(&range(), &bars, &volumes)
            .unwrap();

        assert_eq!(found.len(), 1);
        let sos = &found[0];
        assert_eq!(sos.bar_index, 20);
        assert!((sos.volume_ratio - 2.5).abs() < 1e-12);
        assert!((sos.spread_ratio - 2.5).abs() < 1e-12);
        assert!((sos.close_position - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_low_volume_breakout_ignored() {
        let mut bars = base();
        push(&mut bars, 108.0, 113.0, 112.5, 1200.0);

        let volumes = VolumeCache::new(&bars).unwrap();
        let found = SosDetector::with_defaults()
            .scan(&range(), &bars, &volumes)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_finds_lps() {
        let mut bars = base();
        push(&mut bars, 108.0, 113.0, 112.5, 2500.0);
        push(&mut bars, 112.5, 113.5, 113.0, 900.0);
        push(&mut bars, 110.5, 112.0, 111.5, 600.0);

        let volumes = VolumeCache::new(&bars).unwrap();
        let detector = SosDetector::with_defaults();
        let found = detector.scan(&range(), &bars, &volumes).unwrap();
        let lps = detector.find_lps(&range(), &bars, &found[0]).unwrap();
        assert_eq!(lps.bar_index, 22);
    }

    #[test]
    fn test_no_lps_when_pullback_fails_ice() {
        let mut bars = base();
        push(&mut bars, 108.0, 113.0, 112.5, 2500.0);
        push(&mut bars, 108.5, 111.0, 109.0, 600.0);

        let volumes = VolumeCache::new(&bars).unwrap();
        let detector = SosDetector::with_defaults();
        let found = detector.scan(&range(), &bars, &volumes).unwrap();
        assert!(detector.find_lps(&range(), &bars, &found[0]).is_none());
    }
}
