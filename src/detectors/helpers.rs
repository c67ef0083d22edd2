//! Common helper functions for Wyckoff pattern detection
//!
//! Default thresholds and price/volume measurements shared across detector modules.

// ============================================================
// DEFAULT THRESHOLDS
// ============================================================

/// Deeper than this below Creek is a breakdown, not a Spring
pub const MAX_PENETRATION_PCT: f64 = 0.05;
/// Spring volume must be strictly below this multiple of average volume
pub const MAX_SPRING_VOLUME_RATIO: f64 = 0.7;
/// Bars allowed for a close back above Creek
pub const MAX_RECOVERY_BARS: usize = 5;
/// Test look-ahead window, in bars after the Spring bar
pub const MIN_TEST_OFFSET: usize = 3;
pub const MAX_TEST_OFFSET: usize = 15;
/// Breakout volume must reach this multiple of average volume
pub const MIN_SOS_VOLUME_RATIO: f64 = 1.5;
/// Close must clear Ice by at least this fraction
pub const MIN_BREAKOUT_PCT: f64 = 0.01;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Fraction of `level` that `low` sits below it. Zero or negative when at/above.
#[inline]
pub fn penetration_pct(level: f64, low: f64) -> f64 {
    (level - low) / level
}

/// Fraction of `level` that `close` sits above it.
#[inline]
pub fn breakout_pct(level: f64, close: f64) -> f64 {
    (close - level) / level
}

/// Compute trailing average range at a specific bar index.
/// Uses bars[at - period..at]; falls back to the bar itself at index 0.
#[inline]
pub fn trailing_avg_range<T: crate::OHLCV>(bars: &[T], at: usize, period: usize) -> f64 {
    if at == 0 {
        return crate::OHLCVExt::range(&bars[0]);
    }
    let s = at.saturating_sub(period);
    let slice = &bars[s..at];
    let sum: f64 = slice.iter().map(|b| crate::OHLCVExt::range(b)).sum();
    sum / slice.len() as f64
}
