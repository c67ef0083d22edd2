//! Sign of Strength confidence scorer
//!
//! Same construction as the Spring scorer with its own tables: volume
//! strength, breakout margin, spread, close position and an entry-type
//! baseline, then phase and market modifiers.

use serde::{Deserialize, Serialize};

use super::{saturate, MarketCondition, PhaseAdjustments, TierCurve};
use crate::detectors::{EntryType, SosBreakout};
use crate::range::PhaseClassification;
use crate::{Result, WyckoffError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosScorerConfig {
    pub volume: TierCurve,
    pub breakout: TierCurve,
    pub spread: TierCurve,
    pub close_position: TierCurve,
    pub lps_baseline: f64,
    pub direct_baseline: f64,
    pub phase: PhaseAdjustments,
    pub market_points: f64,
}

impl Default for SosScorerConfig {
    fn default() -> Self {
        Self {
            volume: TierCurve::higher_is_better(&[(2.5, 35.0), (2.0, 30.0), (1.75, 20.0), (1.5, 10.0)]),
            breakout: TierCurve::higher_is_better(&[(0.03, 20.0), (0.02, 15.0), (0.01, 10.0)]),
            spread: TierCurve::higher_is_better(&[(1.5, 15.0), (1.2, 10.0), (1.0, 5.0)]),
            close_position: TierCurve::higher_is_better(&[(0.75, 10.0), (0.5, 5.0)]),
            lps_baseline: 25.0,
            direct_baseline: 10.0,
            phase: PhaseAdjustments::SOS,
            market_points: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosConfidence {
    pub entry_type: EntryType,
    pub volume_score: f64,
    pub breakout_score: f64,
    pub spread_score: f64,
    pub close_score: f64,
    pub entry_score: f64,
    pub phase_adjustment: f64,
    pub market_modifier: f64,
    pub raw_total: f64,
    pub total_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SosScorer {
    pub config: SosScorerConfig,
}

impl SosScorer {
    pub fn new(config: SosScorerConfig) -> Self {
        Self { config }
    }

    pub fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        c.volume.validate("sos.volume")?;
        c.breakout.validate("sos.breakout")?;
        c.spread.validate("sos.spread")?;
        c.close_position.validate("sos.close_position")?;
        c.phase.validate()?;
        if [c.lps_baseline, c.direct_baseline, c.market_points]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(WyckoffError::InvalidConfig(
                "sos baselines and market points must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn score(
        &self,
        breakout: &SosBreakout,
        entry_type: EntryType,
        phase: Option<&PhaseClassification>,
        market: Option<MarketCondition>,
    ) -> SosConfidence {
        let c = &self.config;
        let volume_score = c.volume.eval(breakout.volume_ratio);
        let breakout_score = c.breakout.eval(breakout.breakout_pct);
        let spread_score = c.spread.eval(breakout.spread_ratio);
        let close_score = c.close_position.eval(breakout.close_position);
        let entry_score = match entry_type {
            EntryType::Lps => c.lps_baseline,
            EntryType::Direct => c.direct_baseline,
        };
        let phase_adjustment = c.phase.adjustment(phase);
        let market_modifier = market.map_or(0.0, |m| m.modifier(c.market_points));

        let raw_total = volume_score
            + breakout_score
            + spread_score
            + close_score
            + entry_score
            + phase_adjustment
            + market_modifier;

        SosConfidence {
            entry_type,
            volume_score,
            breakout_score,
            spread_score,
            close_score,
            entry_score,
            phase_adjustment,
            market_modifier,
            raw_total,
            total_score: saturate(raw_total),
        }
    }
}
