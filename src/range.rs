//! Trading range and phase inputs supplied by the range/phase classifier.

use serde::{Deserialize, Serialize};

use crate::{Result, WyckoffError};

/// A consolidation structure: Creek (support), Ice (resistance), Jump (target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRange {
    pub id: String,
    pub creek: f64,
    pub ice: f64,
    pub jump: f64,
    /// First bar of the range; earlier bars only feed volume averages
    pub start_timestamp: i64,
    pub bar_count: usize,
    /// Classifier's strength rating of the Creek level, 0..=100
    pub creek_strength: f64,
}

impl TradingRange {
    pub fn new(id: impl Into<String>, creek: f64, ice: f64, jump: f64) -> Self {
        Self {
            id: id.into(),
            creek,
            ice,
            jump,
            start_timestamp: i64::MIN,
            bar_count: 0,
            creek_strength: 0.0,
        }
    }

    pub fn with_start(mut self, start_timestamp: i64, bar_count: usize) -> Self {
        self.start_timestamp = start_timestamp;
        self.bar_count = bar_count;
        self
    }

    pub fn with_creek_strength(mut self, strength: f64) -> Self {
        self.creek_strength = strength;
        self
    }

    #[inline]
    pub fn contains_timestamp(&self, timestamp: i64) -> bool {
        timestamp >= self.start_timestamp
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.ice - self.creek
    }

    /// Validate level ordering. A range whose Creek is not below Ice is no longer active.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason| {
            Err(WyckoffError::InvalidRange {
                id: self.id.clone(),
                reason,
            })
        };
        if ![self.creek, self.ice, self.jump, self.creek_strength]
            .iter()
            .all(|v| v.is_finite())
        {
            return invalid("levels must be finite");
        }
        if self.creek <= 0.0 {
            return invalid("creek must be positive");
        }
        if self.creek >= self.ice {
            return invalid("creek must be below ice");
        }
        if self.jump <= self.creek {
            return invalid("jump must be above creek");
        }
        if !(0.0..=100.0).contains(&self.creek_strength) {
            return invalid("creek strength must be within 0..=100");
        }
        Ok(())
    }
}

/// Wyckoff accumulation phase label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WyckoffPhase {
    A,
    B,
    C,
    D,
    E,
}

/// Phase label with the classifier's own confidence (0..=100)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseClassification {
    pub phase: WyckoffPhase,
    pub confidence: f64,
}

impl PhaseClassification {
    pub fn new(phase: WyckoffPhase, confidence: f64) -> Self {
        Self { phase, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        let range = TradingRange::new("R", 100.0, 110.0, 125.0).with_creek_strength(70.0);
        assert!(range.validate().is_ok());
        assert_eq!(range.height(), 10.0);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let range = TradingRange::new("R", 110.0, 100.0, 125.0);
        assert!(matches!(
            range.validate(),
            Err(WyckoffError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_creek_strength_bounds() {
        let range = TradingRange::new("R", 100.0, 110.0, 125.0).with_creek_strength(120.0);
        assert!(range.validate().is_err());
    }

    #[test]
    fn test_window_start() {
        let range = TradingRange::new("R", 100.0, 110.0, 125.0).with_start(1_000, 40);
        assert!(!range.contains_timestamp(999));
        assert!(range.contains_timestamp(1_000));
    }
}
