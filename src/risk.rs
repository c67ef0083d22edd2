//! Risk engine: turns a scored, confirmed Spring into a sized trade signal.
//!
//! Stages, in order: confidence floor, adaptive stop, fixed-fractional size,
//! reward/risk gate, urgency. The first failing stage produces a
//! [`Rejection`]; later stages are never computed for it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detectors::{Spring, Test, TestDetectorConfig};
use crate::params::{check_params, get_ratio, get_value, ParamMeta, Parameterized};
use crate::range::TradingRange;
use crate::rejection::{Rejection, RejectionReason};
use crate::scoring::SpringConfidence;
use crate::{Ratio, Result, WyckoffError};

/// Tolerance on the minimum r-multiple comparison
const R_MULTIPLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of the account risked per trade
    pub risk_per_trade_pct: Ratio,
    pub min_r_multiple: f64,
    /// Signals below this confidence are rejected before sizing
    pub min_confidence: f64,
    /// Stop buffer below the Spring low for penetration up to 2%
    pub shallow_stop_buffer: Ratio,
    /// Stop buffer for penetration up to 3%
    pub medium_stop_buffer: Ratio,
    /// Stop buffer for deeper penetration
    pub deep_stop_buffer: Ratio,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: Ratio::new_const(0.01),
            min_r_multiple: 2.0,
            min_confidence: 70.0,
            shallow_stop_buffer: Ratio::new_const(0.02),
            medium_stop_buffer: Ratio::new_const(0.015),
            deep_stop_buffer: Ratio::new_const(0.01),
        }
    }
}

const RISK_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "risk_per_trade_pct",
        0.01,
        (0.0025, 0.05, 0.0025),
        "Fraction of account risked per trade",
    ),
    ParamMeta::value("min_r_multiple", 2.0, (1.0, 5.0, 0.5), "Minimum reward/risk ratio"),
    ParamMeta::value("min_confidence", 70.0, (50.0, 95.0, 5.0), "Confidence floor for signals"),
    ParamMeta::ratio(
        "shallow_stop_buffer",
        0.02,
        (0.005, 0.05, 0.005),
        "Stop buffer for penetration up to 2%",
    ),
    ParamMeta::ratio(
        "medium_stop_buffer",
        0.015,
        (0.005, 0.05, 0.005),
        "Stop buffer for penetration up to 3%",
    ),
    ParamMeta::ratio(
        "deep_stop_buffer",
        0.01,
        (0.005, 0.05, 0.005),
        "Stop buffer for deeper penetration",
    ),
];

impl Parameterized for RiskConfig {
    fn param_meta() -> &'static [ParamMeta] {
        RISK_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(RISK_PARAMS, params)?;
        Ok(Self {
            risk_per_trade_pct: get_ratio(params, "risk_per_trade_pct", 0.01)?,
            min_r_multiple: get_value(params, "min_r_multiple", 2.0)?,
            min_confidence: get_value(params, "min_confidence", 70.0)?,
            shallow_stop_buffer: get_ratio(params, "shallow_stop_buffer", 0.02)?,
            medium_stop_buffer: get_ratio(params, "medium_stop_buffer", 0.015)?,
            deep_stop_buffer: get_ratio(params, "deep_stop_buffer", 0.01)?,
        })
    }

    fn config_name() -> &'static str {
        "risk"
    }
}

/// How soon a signal should be acted on, from the Spring's recovery speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Recovered on the next bar
    Immediate,
    /// Recovered within 2-3 bars
    Moderate,
    /// Recovered within 4-5 bars
    Low,
}

impl Urgency {
    pub fn from_recovery_bars(recovery_bars: usize) -> Self {
        match recovery_bars {
            0 | 1 => Self::Immediate,
            2 | 3 => Self::Moderate,
            _ => Self::Low,
        }
    }
}

/// A sized, risk-bounded long signal. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringSignal {
    pub range_id: String,
    pub spring_bar_index: usize,
    pub test_bar_index: usize,
    /// Timestamp of the Test bar, when the signal becomes actionable
    pub timestamp: i64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub r_multiple: f64,
    pub position_size: u64,
    pub risk_per_trade_pct: f64,
    pub risk_amount: f64,
    pub urgency: Urgency,
    pub confidence: f64,
}

/// Everything the risk engine needs for one candidate
#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub spring: &'a Spring,
    pub test: Option<&'a Test>,
    pub confidence: &'a SpringConfidence,
    pub range: &'a TradingRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalOutcome {
    Signal(SpringSignal),
    Rejected(Rejection),
}

impl SignalOutcome {
    #[inline]
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Signal(_))
    }

    pub fn signal(&self) -> Option<&SpringSignal> {
        match self {
            Self::Signal(signal) => Some(signal),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Signal(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    pub config: RiskConfig,
    /// Test search window reported when a candidate arrives without a Test
    test_window: TestDetectorConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            test_window: TestDetectorConfig::default(),
        }
    }

    /// Report `window` in NoTest rejections.
    pub fn with_test_window(mut self, window: TestDetectorConfig) -> Self {
        self.test_window = window;
        self
    }

    pub fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        if !c.min_r_multiple.is_finite() || c.min_r_multiple <= 0.0 {
            return Err(WyckoffError::InvalidConfig(
                "min_r_multiple must be positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&c.min_confidence) {
            return Err(WyckoffError::OutOfRange {
                field: "min_confidence",
                value: c.min_confidence,
                min: 0.0,
                max: 100.0,
            });
        }
        if c.risk_per_trade_pct.get() <= 0.0 {
            return Err(WyckoffError::InvalidConfig(
                "risk_per_trade_pct must be positive".into(),
            ));
        }
        let (shallow, medium, deep) = (
            c.shallow_stop_buffer.get(),
            c.medium_stop_buffer.get(),
            c.deep_stop_buffer.get(),
        );
        if !(shallow >= medium && medium >= deep) || shallow >= 1.0 {
            return Err(WyckoffError::InvalidConfig(
                "stop buffers must not grow with penetration depth".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_account(account_size: f64) -> Result<()> {
        if !account_size.is_finite() || account_size <= 0.0 {
            return Err(WyckoffError::InvalidAccountSize(account_size));
        }
        Ok(())
    }

    /// Buffer below the Spring low; never grows with penetration depth.
    pub fn stop_buffer(&self, penetration_pct: f64) -> f64 {
        if penetration_pct <= 0.02 {
            self.config.shallow_stop_buffer.get()
        } else if penetration_pct <= 0.03 {
            self.config.medium_stop_buffer.get()
        } else {
            self.config.deep_stop_buffer.get()
        }
    }

    #[inline]
    pub fn stop_loss(&self, spring: &Spring) -> f64 {
        spring.spring_low * (1.0 - self.stop_buffer(spring.penetration_pct))
    }

    /// Fixed-fractional size: whole units whose stop-out loses at most
    /// `account_size * risk_per_trade_pct`.
    pub fn position_size(&self, account_size: f64, entry: f64, stop: f64) -> u64 {
        let risk_per_unit = entry - stop;
        if risk_per_unit <= 0.0 || !risk_per_unit.is_finite() {
            return 0;
        }
        let units = (account_size * self.config.risk_per_trade_pct.get() / risk_per_unit).floor();
        if units.is_finite() && units > 0.0 {
            units as u64
        } else {
            0
        }
    }

    #[inline]
    pub fn r_multiple(entry: f64, stop: f64, target: f64) -> f64 {
        (target - entry) / (entry - stop)
    }

    #[inline]
    pub fn meets_min_r_multiple(&self, r_multiple: f64) -> bool {
        r_multiple + R_MULTIPLE_EPSILON >= self.config.min_r_multiple
    }

    /// Run every stage for one candidate.
    ///
    /// `Err` only for a non-positive account or an invalid range.
    pub fn evaluate(&self, input: SignalInput<'_>, account_size: f64) -> Result<SignalOutcome> {
        Self::validate_account(account_size)?;
        input.range.validate()?;

        let SignalInput {
            spring,
            test,
            confidence,
            range,
        } = input;

        let Some(test) = test else {
            return Ok(SignalOutcome::Rejected(Rejection::new(
                RejectionReason::NoTest {
                    min_bars_after: self.test_window.min_bars_after,
                    max_bars_after: self.test_window.max_bars_after,
                },
                spring.bar_index,
                spring.timestamp,
            )));
        };
        let reject =
            |reason| Ok(SignalOutcome::Rejected(Rejection::new(reason, test.bar_index, test.timestamp)));

        if confidence.total_score < self.config.min_confidence {
            return reject(RejectionReason::ConfidenceBelowFloor {
                score: confidence.total_score,
                floor: self.config.min_confidence,
            });
        }

        let entry_price = test.close;
        let target_price = range.jump;
        let stop_loss = self.stop_loss(spring);
        if stop_loss >= entry_price {
            return reject(RejectionReason::InvalidStop {
                stop_loss,
                entry_price,
            });
        }

        let risk_per_unit = entry_price - stop_loss;
        let risk_amount = account_size * self.config.risk_per_trade_pct.get();
        let position_size = self.position_size(account_size, entry_price, stop_loss);
        if position_size == 0 {
            return reject(RejectionReason::PositionTooSmall {
                risk_amount,
                risk_per_unit,
            });
        }

        let r_multiple = Self::r_multiple(entry_price, stop_loss, target_price);
        if !self.meets_min_r_multiple(r_multiple) {
            return reject(RejectionReason::RMultipleBelowMinimum {
                r_multiple,
                minimum: self.config.min_r_multiple,
            });
        }

        let signal = SpringSignal {
            range_id: range.id.clone(),
            spring_bar_index: spring.bar_index,
            test_bar_index: test.bar_index,
            timestamp: test.timestamp,
            entry_price,
            stop_loss,
            target_price,
            r_multiple,
            position_size,
            risk_per_trade_pct: self.config.risk_per_trade_pct.get(),
            risk_amount: position_size as f64 * risk_per_unit,
            urgency: Urgency::from_recovery_bars(spring.recovery_bars),
            confidence: confidence.total_score,
        };
        tracing::info!(
            "[{}] spring signal: entry {:.2} stop {:.2} target {:.2} ({:.2}R, {} units, {:?})",
            range.id,
            signal.entry_price,
            signal.stop_loss,
            signal.target_price,
            signal.r_multiple,
            signal.position_size,
            signal.urgency
        );
        Ok(SignalOutcome::Signal(signal))
    }
}
