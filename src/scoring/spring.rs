//! Spring confidence scorer
//!
//! | Factor | Max | Source |
//! |---|---|---|
//! | Volume quality | 40 | Spring volume ratio, lower is better |
//! | Penetration depth | 35 | Shallower is better |
//! | Recovery speed | 25 | Fewer bars back above Creek is better |
//! | Test confirmation | 20 | Test volume versus its trailing average |
//! | Volume trend | +10 | Test volume versus earlier Tests in the range |
//! | Creek strength | +10 | Strength of the support level |
//! | Phase | <= 0 | Penalty outside Phase C |
//! | Market | +/-5 | Broad market direction |

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::{saturate, Interpolation, MarketCondition, PhaseAdjustments, TierCurve};
use crate::detectors::{Spring, Test};
use crate::range::{PhaseClassification, TradingRange};
use crate::{Result, WyckoffError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringScorerConfig {
    pub volume: TierCurve,
    pub penetration: TierCurve,
    pub recovery: TierCurve,
    /// Test bar volume ratio against its trailing average
    pub test_confirmation: TierCurve,
    pub creek_strength: TierCurve,
    /// Relative change versus the mean of earlier Tests that counts as a trend
    pub trend_threshold: f64,
    pub trend_declining_points: f64,
    pub trend_stable_points: f64,
    pub phase: PhaseAdjustments,
    pub market_points: f64,
}

impl Default for SpringScorerConfig {
    fn default() -> Self {
        Self {
            volume: TierCurve::lower_is_better(&[
                (0.3, 40.0),
                (0.4, 30.0),
                (0.5, 20.0),
                (0.6, 10.0),
                (0.7, 5.0),
            ])
            .exclusive_best(),
            penetration: TierCurve::lower_is_better(&[
                (0.02, 35.0),
                (0.03, 25.0),
                (0.04, 15.0),
                (0.05, 5.0),
            ]),
            recovery: TierCurve::lower_is_better(&[(1.0, 25.0), (2.0, 20.0), (3.0, 15.0), (5.0, 10.0)]),
            test_confirmation: TierCurve::lower_is_better(&[(0.4, 20.0), (0.6, 15.0), (0.8, 10.0)]),
            creek_strength: TierCurve::higher_is_better(&[(80.0, 10.0), (70.0, 7.0), (60.0, 5.0)]),
            trend_threshold: 0.2,
            trend_declining_points: 10.0,
            trend_stable_points: 5.0,
            phase: PhaseAdjustments::SPRING,
            market_points: 5.0,
        }
    }
}

/// Per-factor score breakdown of one Spring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringConfidence {
    pub volume_score: f64,
    pub penetration_score: f64,
    pub recovery_score: f64,
    pub test_score: f64,
    pub volume_trend_bonus: f64,
    pub creek_bonus: f64,
    pub phase_adjustment: f64,
    pub market_modifier: f64,
    /// Sum of all components before saturation
    pub raw_total: f64,
    /// `raw_total` clamped to `0..=100`
    pub total_score: f64,
    pub penetration_pct: f64,
}

/// Orders two scored Springs, `Greater` meaning `a` ranks higher.
///
/// Higher total first, then higher volume score, then shallower penetration.
pub fn compare_candidates(a: &SpringConfidence, b: &SpringConfidence) -> Ordering {
    a.total_score
        .total_cmp(&b.total_score)
        .then(a.volume_score.total_cmp(&b.volume_score))
        .then(b.penetration_pct.total_cmp(&a.penetration_pct))
}

#[derive(Debug, Clone, Default)]
pub struct SpringScorer {
    pub config: SpringScorerConfig,
}

impl SpringScorer {
    pub fn new(config: SpringScorerConfig) -> Self {
        Self { config }
    }

    /// Switch every curve to `interpolation`.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        let c = &mut self.config;
        for curve in [
            &mut c.volume,
            &mut c.penetration,
            &mut c.recovery,
            &mut c.test_confirmation,
            &mut c.creek_strength,
        ] {
            curve.interpolation = interpolation;
        }
        self
    }

    pub fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        c.volume.validate("volume")?;
        c.penetration.validate("penetration")?;
        c.recovery.validate("recovery")?;
        c.test_confirmation.validate("test_confirmation")?;
        c.creek_strength.validate("creek_strength")?;
        c.phase.validate()?;
        for (name, value) in [
            ("trend_threshold", c.trend_threshold),
            ("trend_declining_points", c.trend_declining_points),
            ("trend_stable_points", c.trend_stable_points),
            ("market_points", c.market_points),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(WyckoffError::InvalidConfig(format!(
                    "{name} must be finite and non-negative"
                )));
            }
        }
        Ok(())
    }

    /// Score a confirmed Spring.
    ///
    /// `previous_tests` are the Tests of earlier Springs in the same range,
    /// oldest first.
    pub fn score(
        &self,
        spring: &Spring,
        test: &Test,
        range: &TradingRange,
        phase: Option<&PhaseClassification>,
        previous_tests: &[Test],
        market: Option<MarketCondition>,
    ) -> SpringConfidence {
        let c = &self.config;
        let volume_score = c.volume.eval(spring.volume_ratio);
        let penetration_score = c.penetration.eval(spring.penetration_pct);
        let recovery_score = c.recovery.eval(spring.recovery_bars as f64);
        let test_score = c.test_confirmation.eval(test.volume_ratio);
        let volume_trend_bonus = self.volume_trend_bonus(test, previous_tests);
        let creek_bonus = c.creek_strength.eval(range.creek_strength);
        let phase_adjustment = c.phase.adjustment(phase);
        let market_modifier = market.map_or(0.0, |m| m.modifier(c.market_points));

        let raw_total = volume_score
            + penetration_score
            + recovery_score
            + test_score
            + volume_trend_bonus
            + creek_bonus
            + phase_adjustment
            + market_modifier;

        tracing::debug!(
            "[{}] spring at bar {} scored {:.1} (raw {:.1})",
            range.id,
            spring.bar_index,
            saturate(raw_total),
            raw_total
        );

        SpringConfidence {
            volume_score,
            penetration_score,
            recovery_score,
            test_score,
            volume_trend_bonus,
            creek_bonus,
            phase_adjustment,
            market_modifier,
            raw_total,
            total_score: saturate(raw_total),
            penetration_pct: spring.penetration_pct,
        }
    }

    fn volume_trend_bonus(&self, test: &Test, previous_tests: &[Test]) -> f64 {
        if previous_tests.is_empty() {
            return 0.0;
        }
        let mean = previous_tests.iter().map(|t| t.volume).sum::<f64>() / previous_tests.len() as f64;
        if mean <= f64::EPSILON {
            return 0.0;
        }
        let change = (test.volume - mean) / mean;
        let c = &self.config;
        if change <= -c.trend_threshold {
            c.trend_declining_points
        } else if change < c.trend_threshold {
            c.trend_stable_points
        } else {
            0.0
        }
    }
}
