//! Business rejections: candidates that were evaluated and did not qualify.
//!
//! These are normal outcomes, not errors. Each carries a tagged reason with
//! the numbers that decided it plus the bar it refers to.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Penetration beyond the Spring limit; the range is broken
    Breakdown {
        penetration_pct: f64,
        max_penetration_pct: f64,
    },
    /// Not enough preceding bars for a volume ratio
    InsufficientVolumeHistory { required_bars: usize },
    /// Binary volume gate failed
    VolumeTooHigh {
        volume_ratio: f64,
        max_volume_ratio: f64,
    },
    /// No close back above Creek within the recovery window
    NoRecovery { max_recovery_bars: usize },
    /// No confirming Test inside the look-ahead window
    NoTest {
        min_bars_after: usize,
        max_bars_after: usize,
    },
    ConfidenceBelowFloor { score: f64, floor: f64 },
    InvalidStop { stop_loss: f64, entry_price: f64 },
    PositionTooSmall { risk_amount: f64, risk_per_unit: f64 },
    RMultipleBelowMinimum { r_multiple: f64, minimum: f64 },
}

impl RejectionReason {
    /// Stable short code for metrics and log filtering
    pub fn code(&self) -> &'static str {
        match self {
            Self::Breakdown { .. } => "breakdown",
            Self::InsufficientVolumeHistory { .. } => "insufficient_volume_history",
            Self::VolumeTooHigh { .. } => "volume_too_high",
            Self::NoRecovery { .. } => "no_recovery",
            Self::NoTest { .. } => "no_test",
            Self::ConfidenceBelowFloor { .. } => "confidence_below_floor",
            Self::InvalidStop { .. } => "invalid_stop",
            Self::PositionTooSmall { .. } => "position_too_small",
            Self::RMultipleBelowMinimum { .. } => "r_multiple_below_minimum",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breakdown {
                penetration_pct,
                max_penetration_pct,
            } => write!(
                f,
                "penetration {:.2}% exceeds {:.2}%",
                penetration_pct * 100.0,
                max_penetration_pct * 100.0
            ),
            Self::InsufficientVolumeHistory { required_bars } => {
                write!(f, "needs {required_bars} preceding bars for volume ratio")
            }
            Self::VolumeTooHigh {
                volume_ratio,
                max_volume_ratio,
            } => write!(f, "volume {volume_ratio:.2}x >= {max_volume_ratio:.2}x"),
            Self::NoRecovery { max_recovery_bars } => {
                write!(f, "no close above creek within {max_recovery_bars} bars")
            }
            Self::NoTest {
                min_bars_after,
                max_bars_after,
            } => write!(
                f,
                "no test {min_bars_after}-{max_bars_after} bars after spring"
            ),
            Self::ConfidenceBelowFloor { score, floor } => {
                write!(f, "confidence {score:.1} below {floor:.1}")
            }
            Self::InvalidStop {
                stop_loss,
                entry_price,
            } => write!(f, "stop {stop_loss:.4} not below entry {entry_price:.4}"),
            Self::PositionTooSmall {
                risk_amount,
                risk_per_unit,
            } => write!(
                f,
                "risk {risk_amount:.2} buys no unit at {risk_per_unit:.4} per unit"
            ),
            Self::RMultipleBelowMinimum {
                r_multiple,
                minimum,
            } => write!(f, "r-multiple {r_multiple:.2} below {minimum:.2}"),
        }
    }
}

/// A rejected candidate and the bar it was evaluated at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    #[serde(flatten)]
    pub reason: RejectionReason,
    pub bar_index: usize,
    pub timestamp: i64,
}

impl Rejection {
    pub fn new(reason: RejectionReason, bar_index: usize, timestamp: i64) -> Self {
        Self {
            reason,
            bar_index,
            timestamp,
        }
    }

    /// Emit the rejection at debug level.
    pub fn log(&self, symbol: &str) {
        tracing::debug!(
            code = self.reason.code(),
            bar_index = self.bar_index,
            timestamp = self.timestamp,
            "[{}] candidate rejected: {}",
            symbol,
            self.reason
        );
    }
}
