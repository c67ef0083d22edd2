//! Broad-market condition: an optional, injected input to scoring.

use serde::{Deserialize, Serialize};

/// Direction of the broad market at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Bullish,
    Neutral,
    Bearish,
}

impl MarketCondition {
    /// `+points` when bullish, `-points` when bearish.
    #[inline]
    pub fn modifier(self, points: f64) -> f64 {
        match self {
            Self::Bullish => points,
            Self::Neutral => 0.0,
            Self::Bearish => -points,
        }
    }
}

/// Source of market conditions. `None` means unavailable and scores as
/// neutral; providers must never block the pipeline on a failed lookup.
pub trait MarketConditionProvider: Send + Sync {
    fn condition(&self, symbol: &str, timestamp: i64) -> Option<MarketCondition>;
}

/// Provider that never has data
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralMarket;

impl MarketConditionProvider for NeutralMarket {
    #[inline]
    fn condition(&self, _symbol: &str, _timestamp: i64) -> Option<MarketCondition> {
        None
    }
}

/// Provider reporting the same condition everywhere
#[derive(Debug, Clone, Copy)]
pub struct FixedMarket(pub MarketCondition);

impl MarketConditionProvider for FixedMarket {
    #[inline]
    fn condition(&self, _symbol: &str, _timestamp: i64) -> Option<MarketCondition> {
        Some(self.0)
    }
}

impl<F> MarketConditionProvider for F
where
    F: Fn(&str, i64) -> Option<MarketCondition> + Send + Sync,
{
    #[inline]
    fn condition(&self, symbol: &str, timestamp: i64) -> Option<MarketCondition> {
        self(symbol, timestamp)
    }
}
