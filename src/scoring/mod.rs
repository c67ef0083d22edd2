//! Confidence scoring
//!
//! Every factor is a [`TierCurve`]: an ordered table of thresholds where the
//! best tier comes first. Scores are summed into a raw total and saturated to
//! `0..=100`; the uncapped raw total is kept in the breakdown.

use serde::{Deserialize, Serialize};

use crate::range::{PhaseClassification, WyckoffPhase};
use crate::{Result, WyckoffError};

pub mod market;
pub mod sos;
pub mod spring;

pub use market::*;
pub use sos::*;
pub use spring::*;

/// Upper bound of every reported confidence score
pub const MAX_SCORE: f64 = 100.0;

/// Clamp a raw point total into `0..=MAX_SCORE`.
#[inline]
pub fn saturate(raw: f64) -> f64 {
    raw.clamp(0.0, MAX_SCORE)
}

// ============================================================
// TIER CURVES
// ============================================================

/// How a curve treats values between two thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Value of the tier the input falls into
    #[default]
    Stepped,
    /// Linear ramp from the better neighbour's points down to this tier's
    Linear,
}

/// Which direction of the input is rewarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Tier `k` covers inputs up to `bound`
    LowerIsBetter,
    /// Tier `k` covers inputs down to `bound`
    HigherIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub bound: f64,
    pub points: f64,
    /// Whether an input exactly at `bound` still belongs to this tier
    #[serde(default = "inclusive_default")]
    pub inclusive: bool,
}

fn inclusive_default() -> bool {
    true
}

/// Tiered, monotone scoring table. Inputs beyond the last tier score zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCurve {
    pub orientation: Orientation,
    /// Best tier first
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl TierCurve {
    /// Build from `(bound, points)` pairs ordered best first.
    pub fn lower_is_better(tiers: &[(f64, f64)]) -> Self {
        Self::from_pairs(Orientation::LowerIsBetter, tiers)
    }

    pub fn higher_is_better(tiers: &[(f64, f64)]) -> Self {
        Self::from_pairs(Orientation::HigherIsBetter, tiers)
    }

    fn from_pairs(orientation: Orientation, tiers: &[(f64, f64)]) -> Self {
        Self {
            orientation,
            tiers: tiers
                .iter()
                .map(|&(bound, points)| Tier {
                    bound,
                    points,
                    inclusive: true,
                })
                .collect(),
            interpolation: Interpolation::Stepped,
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Make the best tier exclusive of its bound, so an input exactly at the
    /// bound falls into the next tier.
    pub fn exclusive_best(mut self) -> Self {
        if let Some(tier) = self.tiers.first_mut() {
            tier.inclusive = false;
        }
        self
    }

    /// Points of the best tier
    pub fn max_points(&self) -> f64 {
        self.tiers.first().map_or(0.0, |t| t.points)
    }

    pub fn eval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return 0.0;
        }
        // Mirror higher-is-better curves so a single walk handles both.
        let sign = match self.orientation {
            Orientation::LowerIsBetter => 1.0,
            Orientation::HigherIsBetter => -1.0,
        };
        let x = x * sign;

        let mut prev: Option<(f64, f64)> = None;
        for tier in &self.tiers {
            let bound = tier.bound * sign;
            let within = if tier.inclusive { x <= bound } else { x < bound };
            if within {
                return match (self.interpolation, prev) {
                    (Interpolation::Linear, Some((prev_bound, prev_points))) => {
                        let t = (x - prev_bound) / (bound - prev_bound);
                        prev_points + (tier.points - prev_points) * t
                    }
                    _ => tier.points,
                };
            }
            prev = Some((bound, tier.points));
        }
        0.0
    }

    /// Bounds strictly ordered from best to worst, points non-increasing and
    /// non-negative.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(WyckoffError::InvalidConfig(format!("{name}: curve has no tiers")));
        }
        let sign = match self.orientation {
            Orientation::LowerIsBetter => 1.0,
            Orientation::HigherIsBetter => -1.0,
        };
        for pair in self.tiers.windows(2) {
            if pair[1].bound * sign <= pair[0].bound * sign {
                return Err(WyckoffError::InvalidConfig(format!(
                    "{name}: tier bounds must move away from the best tier"
                )));
            }
            if pair[1].points > pair[0].points {
                return Err(WyckoffError::InvalidConfig(format!(
                    "{name}: tier points must not increase"
                )));
            }
        }
        if self
            .tiers
            .iter()
            .any(|t| !t.bound.is_finite() || !t.points.is_finite() || t.points < 0.0)
        {
            return Err(WyckoffError::InvalidConfig(format!(
                "{name}: tiers must be finite with non-negative points"
            )));
        }
        Ok(())
    }
}

// ============================================================
// PHASE ADJUSTMENT
// ============================================================

/// Non-positive point adjustment per Wyckoff phase, applied only when the
/// phase classifier is at least `min_confidence` sure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseAdjustments {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub min_confidence: f64,
}

impl PhaseAdjustments {
    /// Phase C is where Springs belong.
    pub const SPRING: Self = Self {
        a: -20.0,
        b: -10.0,
        c: 0.0,
        d: -5.0,
        e: -20.0,
        min_confidence: 60.0,
    };

    /// Phase D is where Signs of Strength belong.
    pub const SOS: Self = Self {
        a: -20.0,
        b: -10.0,
        c: -5.0,
        d: 0.0,
        e: -5.0,
        min_confidence: 60.0,
    };

    pub fn adjustment(&self, phase: Option<&PhaseClassification>) -> f64 {
        let Some(phase) = phase else {
            return 0.0;
        };
        if phase.confidence < self.min_confidence {
            return 0.0;
        }
        match phase.phase {
            WyckoffPhase::A => self.a,
            WyckoffPhase::B => self.b,
            WyckoffPhase::C => self.c,
            WyckoffPhase::D => self.d,
            WyckoffPhase::E => self.e,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.a, self.b, self.c, self.d, self.e];
        if values.iter().any(|v| !v.is_finite() || *v > 0.0) {
            return Err(WyckoffError::InvalidConfig(
                "phase adjustments must be finite and non-positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(WyckoffError::OutOfRange {
                field: "phase.min_confidence",
                value: self.min_confidence,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(())
    }
}
