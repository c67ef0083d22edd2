//! Precomputed volume ratios.
//!
//! Pattern scanning asks for the same bar's volume ratio many times; the cache
//! computes every ratio once with a rolling sum so a scan stays O(n).

use std::collections::HashMap;

use crate::{Period, Result, WyckoffError, OHLCV};

/// Default trailing window for volume averages
pub const DEFAULT_VOLUME_PERIOD: usize = 20;

/// Volume ratio per bar: `volume / mean(volume of the N preceding bars)`.
///
/// Bars with fewer than N predecessors, or with a zero trailing average, have
/// no entry.
#[derive(Debug, Clone)]
pub struct VolumeCache {
    period: Period,
    ratios: Vec<Option<f64>>,
    index_by_timestamp: HashMap<i64, usize>,
}

impl VolumeCache {
    pub fn new<T: OHLCV>(bars: &[T]) -> Result<Self> {
        Self::with_period(bars, Period::new_const(DEFAULT_VOLUME_PERIOD))
    }

    /// Build the cache in one pass. Fails if timestamps are not strictly increasing.
    pub fn with_period<T: OHLCV>(bars: &[T], period: Period) -> Result<Self> {
        let n = period.get();
        let mut ratios = Vec::with_capacity(bars.len());
        let mut index_by_timestamp = HashMap::with_capacity(bars.len());
        // Sum of the (up to) n bars preceding the current one
        let mut window_sum = 0.0;
        let mut previous: Option<i64> = None;

        for (i, bar) in bars.iter().enumerate() {
            let timestamp = bar.timestamp();
            if previous.is_some_and(|p| timestamp <= p) {
                return Err(WyckoffError::NonIncreasingTimestamp { index: i, timestamp });
            }
            previous = Some(timestamp);

            let ratio = if i >= n {
                let avg = window_sum / n as f64;
                (avg > f64::EPSILON).then(|| bar.volume() / avg)
            } else {
                None
            };
            ratios.push(ratio);
            index_by_timestamp.insert(timestamp, i);

            window_sum += bar.volume();
            if i >= n {
                window_sum -= bars[i - n].volume();
            }
        }

        Ok(Self {
            period,
            ratios,
            index_by_timestamp,
        })
    }

    /// Cached ratio for the bar with this timestamp.
    #[inline]
    pub fn get_ratio(&self, timestamp: i64) -> Option<f64> {
        self.index_of(timestamp).and_then(|i| self.ratio_at(i))
    }

    /// Cached ratio for the bar at this index.
    #[inline]
    pub fn ratio_at(&self, index: usize) -> Option<f64> {
        self.ratios.get(index).copied().flatten()
    }

    #[inline]
    pub fn index_of(&self, timestamp: i64) -> Option<usize> {
        self.index_by_timestamp.get(&timestamp).copied()
    }

    #[inline]
    pub fn period(&self) -> Period {
        self.period
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}
