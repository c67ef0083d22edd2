//! Per-range Spring history
//!
//! Keeps every Spring found in one trading range in chronological order,
//! together with the signals they produced, and derives the volume trend and
//! risk profile across them.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detectors::{Spring, Test};
use crate::params::{check_params, get_ratio, get_value, ParamMeta, Parameterized};
use crate::risk::SpringSignal;
use crate::scoring::{compare_candidates, SpringConfidence};
use crate::{Ratio, Result, WyckoffError};

/// Slack on the per-step decline comparison
const TREND_EPSILON: f64 = 1e-9;

// ============================================================
// CONFIG
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Minimum drop in volume ratio between consecutive Springs for a decline
    pub decline_margin: Ratio,
    /// Relative band around the mean volume ratio that counts as stable
    pub stable_band: Ratio,
    /// Confidence a lone Spring needs to be called tradeable
    pub tradeable_confidence: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            decline_margin: Ratio::new_const(0.05),
            stable_band: Ratio::new_const(0.15),
            tradeable_confidence: 80.0,
        }
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.tradeable_confidence) {
            return Err(WyckoffError::OutOfRange {
                field: "tradeable_confidence",
                value: self.tradeable_confidence,
                min: 0.0,
                max: 100.0,
            });
        }
        if self.decline_margin.get() <= 0.0 {
            return Err(WyckoffError::InvalidConfig(
                "decline_margin must be positive".into(),
            ));
        }
        Ok(())
    }
}

const HISTORY_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "decline_margin",
        0.05,
        (0.01, 0.2, 0.01),
        "Per-step volume ratio drop for a declining trend",
    ),
    ParamMeta::ratio(
        "stable_band",
        0.15,
        (0.05, 0.3, 0.05),
        "Band around the mean volume ratio counted as stable",
    ),
    ParamMeta::value(
        "tradeable_confidence",
        80.0,
        (60.0, 95.0, 5.0),
        "Confidence a single Spring needs to be tradeable",
    ),
];

impl Parameterized for HistoryConfig {
    fn param_meta() -> &'static [ParamMeta] {
        HISTORY_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(HISTORY_PARAMS, params)?;
        Ok(Self {
            decline_margin: get_ratio(params, "decline_margin", 0.05)?,
            stable_band: get_ratio(params, "stable_band", 0.15)?,
            tradeable_confidence: get_value(params, "tradeable_confidence", 80.0)?,
        })
    }

    fn config_name() -> &'static str {
        "history"
    }
}

// ============================================================
// RECORDS AND PROFILES
// ============================================================

/// One Spring and, when confirmed, its Test and score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringRecord {
    pub spring: Spring,
    pub test: Option<Test>,
    pub confidence: Option<SpringConfidence>,
}

impl SpringRecord {
    pub fn unconfirmed(spring: Spring) -> Self {
        Self {
            spring,
            test: None,
            confidence: None,
        }
    }

    pub fn confirmed(spring: Spring, test: Test, confidence: SpringConfidence) -> Self {
        Self {
            spring,
            test: Some(test),
            confidence: Some(confidence),
        }
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.test.is_some()
    }

    #[inline]
    pub fn total_score(&self) -> Option<f64> {
        self.confidence.as_ref().map(|c| c.total_score)
    }
}

/// Scored records outrank unscored ones; unscored records fall back to
/// lower volume ratio, then shallower penetration.
fn rank(a: &SpringRecord, b: &SpringRecord) -> Ordering {
    match (&a.confidence, &b.confidence) {
        (Some(ca), Some(cb)) => compare_candidates(ca, cb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => b
            .spring
            .volume_ratio
            .total_cmp(&a.spring.volume_ratio)
            .then(b.spring.penetration_pct.total_cmp(&a.spring.penetration_pct)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    /// Each Spring drew less volume than the one before: supply is drying up
    Declining,
    Stable,
    /// Volume is not contracting; supply is still present
    Rising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    NoSprings,
    HighlyTradeable,
    Tradeable,
    Monitor,
    Avoid,
}

/// Summary of how risky the range's Springs look as a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub spring_count: usize,
    pub volume_trend: VolumeTrend,
    pub avg_volume_ratio: Option<f64>,
    pub best_confidence: Option<f64>,
}

// ============================================================
// HISTORY
// ============================================================

/// All Springs and signals of one trading range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringHistory {
    range_id: String,
    config: HistoryConfig,
    records: Vec<SpringRecord>,
    signals: Vec<SpringSignal>,
}

impl SpringHistory {
    pub fn new(range_id: impl Into<String>) -> Self {
        Self::with_config(range_id, HistoryConfig::default())
    }

    pub fn with_config(range_id: impl Into<String>, config: HistoryConfig) -> Self {
        Self {
            range_id: range_id.into(),
            config,
            records: Vec::new(),
            signals: Vec::new(),
        }
    }

    #[inline]
    pub fn range_id(&self) -> &str {
        &self.range_id
    }

    /// Insert keeping chronological order by Spring timestamp.
    pub fn add_spring(&mut self, record: SpringRecord) {
        let ts = record.spring.timestamp;
        let at = self.records.partition_point(|r| r.spring.timestamp <= ts);
        self.records.insert(at, record);
    }

    pub fn add_signal(&mut self, signal: SpringSignal) {
        tracing::debug!(
            "[{}] recorded signal for spring at bar {}",
            self.range_id,
            signal.spring_bar_index
        );
        self.signals.push(signal);
    }

    #[inline]
    pub fn springs(&self) -> &[SpringRecord] {
        &self.records
    }

    #[inline]
    pub fn signals(&self) -> &[SpringSignal] {
        &self.signals
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest-ranked Spring.
    pub fn best_spring(&self) -> Option<&SpringRecord> {
        self.records.iter().reduce(|best, r| match rank(r, best) {
            Ordering::Greater => r,
            _ => best,
        })
    }

    /// Signal of the highest-ranked Spring that produced one.
    pub fn best_signal(&self) -> Option<&SpringSignal> {
        let record_of = |signal: &SpringSignal| {
            self.records
                .iter()
                .find(|r| r.spring.bar_index == signal.spring_bar_index)
        };
        self.signals.iter().reduce(|best, signal| {
            let better = match (record_of(signal), record_of(best)) {
                (Some(a), Some(b)) => rank(a, b) == Ordering::Greater,
                _ => signal.confidence > best.confidence,
            };
            if better {
                signal
            } else {
                best
            }
        })
    }

    pub fn avg_volume_ratio(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let sum: f64 = self.records.iter().map(|r| r.spring.volume_ratio).sum();
        Some(sum / self.records.len() as f64)
    }

    pub fn volume_trend(&self) -> VolumeTrend {
        let ratios: Vec<f64> = self.records.iter().map(|r| r.spring.volume_ratio).collect();
        if ratios.len() < 2 {
            return VolumeTrend::Stable;
        }

        let margin = self.config.decline_margin.get();
        if ratios
            .windows(2)
            .all(|w| w[1] <= w[0] - margin + TREND_EPSILON)
        {
            return VolumeTrend::Declining;
        }

        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        let band = mean * self.config.stable_band.get();
        if ratios.iter().all(|r| (r - mean).abs() <= band + TREND_EPSILON) {
            VolumeTrend::Stable
        } else {
            VolumeTrend::Rising
        }
    }

    pub fn analyze_spring_risk_profile(&self) -> RiskProfile {
        let volume_trend = self.volume_trend();
        let best_confidence = self.best_spring().and_then(SpringRecord::total_score);

        let (risk_level, recommendation) = match self.records.len() {
            0 => (RiskLevel::None, Recommendation::NoSprings),
            1 => match best_confidence {
                Some(score) if score >= self.config.tradeable_confidence => {
                    (RiskLevel::Low, Recommendation::Tradeable)
                }
                _ => (RiskLevel::Moderate, Recommendation::Monitor),
            },
            _ => match volume_trend {
                VolumeTrend::Declining => (RiskLevel::Low, Recommendation::HighlyTradeable),
                VolumeTrend::Stable => (RiskLevel::Moderate, Recommendation::Monitor),
                VolumeTrend::Rising => (RiskLevel::High, Recommendation::Avoid),
            },
        };

        RiskProfile {
            risk_level,
            recommendation,
            spring_count: self.records.len(),
            volume_trend,
            avg_volume_ratio: self.avg_volume_ratio(),
            best_confidence,
        }
    }
}
