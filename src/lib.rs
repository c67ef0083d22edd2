//! # wyckoff-spring - Wyckoff Spring detection and signal engine
//!
//! Detects Spring shakeouts below a trading range's support (Creek), confirms
//! them with a low-volume Test, scores them, sizes a risk-bounded signal and
//! tracks every detection per range and per campaign.
//!
//! ## Quick Start
//!
//! ```rust
//! use wyckoff_spring::prelude::*;
//!
//! let bars: Vec<Bar> = vec![];
//! let range = TradingRange::new("AAPL-2024-03", 100.0, 110.0, 125.0);
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let analysis = engine.analyze("AAPL", &range, &bars, None, 100_000.0).unwrap();
//! assert!(analysis.history.is_empty());
//! ```

pub mod campaign;
pub mod detectors;
pub mod history;
pub mod params;
pub mod range;
pub mod rejection;
pub mod risk;
pub mod scoring;
pub mod volume;

pub mod prelude {
    pub use crate::{
        // Campaigns
        campaign::{
            Campaign, CampaignEvent, CampaignEventKind, CampaignId, CampaignIndex,
            CampaignObserver, CampaignPattern, CampaignState, CampaignTracker, IndexConfig,
            PatternKind, RecentWindow,
        },
        // Detectors
        detectors::{
            EntryType, LastPointOfSupport, ScoredSos, SosBreakout, SosDetector,
            SosDetectorConfig, Spring, SpringDetector, SpringDetectorConfig, SpringScan, Test,
            TestConfirmationDetector, TestDetectorConfig,
        },
        // History
        history::{
            HistoryConfig, Recommendation, RiskLevel, RiskProfile, SpringHistory, SpringRecord,
            VolumeTrend,
        },
        // Parameters
        params::{get_period, get_ratio, get_value, ParamMeta, ParamType, Parameterized},
        range::{PhaseClassification, TradingRange, WyckoffPhase},
        rejection::{Rejection, RejectionReason},
        risk::{RiskConfig, RiskEngine, SignalInput, SignalOutcome, SpringSignal, Urgency},
        // Parallel
        scan_parallel,
        // Scoring
        scoring::{
            compare_candidates, saturate, FixedMarket, Interpolation, MarketCondition,
            MarketConditionProvider, NeutralMarket, Orientation, PhaseAdjustments, SosConfidence,
            SosScorer, SosScorerConfig, SpringConfidence, SpringScorer, SpringScorerConfig, Tier,
            TierCurve, MAX_SCORE,
        },
        volume::VolumeCache,
        // Core types
        Bar,
        DefaultEngine,
        EngineBuilder,
        EngineConfig,
        Instrument,
        OHLCVExt,
        Period,
        RangeAnalysis,
        Ratio,
        Result,
        ScanError,
        SpringEngine,
        WyckoffError,
        OHLCV,
    };
}

use campaign::{CampaignId, CampaignState};
use detectors::{
    ScoredSos, SosDetector, SosDetectorConfig, SpringDetector, SpringDetectorConfig,
    TestConfirmationDetector, TestDetectorConfig,
};
use history::{HistoryConfig, RiskProfile, SpringHistory, SpringRecord};
use range::{PhaseClassification, TradingRange};
use rejection::Rejection;
use risk::{RiskConfig, RiskEngine, SignalInput, SignalOutcome, SpringSignal};
use scoring::{
    MarketCondition, MarketConditionProvider, NeutralMarket, SosScorer, SpringScorer,
};
use volume::VolumeCache;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, WyckoffError>;

/// Input-contract violations and configuration errors.
///
/// Business outcomes such as a failed volume gate or a low reward/risk ratio
/// are never errors; they are reported as [`Rejection`] values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WyckoffError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Timestamp {timestamp} at index {index} is not after the previous bar")]
    NonIncreasingTimestamp { index: usize, timestamp: i64 },

    #[error("Invalid trading range {id}: {reason}")]
    InvalidRange { id: String, reason: &'static str },

    #[error("Account size must be positive and finite, got {0}")]
    InvalidAccountSize(f64),

    #[error("Campaign {0} is already indexed")]
    DuplicateCampaign(CampaignId),

    #[error("Unknown campaign {0}")]
    UnknownCampaign(CampaignId),

    #[error("Campaign {id} is {state:?} and accepts no further updates")]
    CampaignClosed { id: CampaignId, state: CampaignState },

    #[error("Campaign {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: CampaignId,
        from: CampaignState,
        to: CampaignState,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(WyckoffError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(WyckoffError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(WyckoffError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait. Timestamps must be strictly increasing within a series.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
    fn timestamp(&self) -> i64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Where the close sits inside the bar, 0.0 at the low and 1.0 at the high.
    /// Returns None if range ≈ 0
    #[inline]
    fn close_position(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| (self.close() - self.low()) / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(WyckoffError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(WyckoffError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(WyckoffError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.volume() < 0.0 {
            return Err(WyckoffError::InvalidOHLCV {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Owned OHLCV sample, for callers without their own bar type.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

// ============================================================
// RANGE ANALYSIS - result of one pipeline pass
// ============================================================

/// Everything the pipeline learned about one trading range of one symbol.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RangeAnalysis {
    pub symbol: String,
    pub range: TradingRange,
    pub history: SpringHistory,
    /// Scored Sign-of-Strength breakouts above Ice
    pub breakouts: Vec<ScoredSos>,
    /// Candidates that did not become signals, in discovery order
    pub rejections: Vec<Rejection>,
    /// Set when a bar penetrated Creek beyond the Spring limit
    pub breakdown: Option<Rejection>,
}

impl RangeAnalysis {
    #[inline]
    pub fn signals(&self) -> &[SpringSignal] {
        self.history.signals()
    }

    /// Signal of the highest-ranked Spring that produced one
    pub fn best_signal(&self) -> Option<&SpringSignal> {
        self.history.best_signal()
    }

    #[inline]
    pub fn risk_profile(&self) -> RiskProfile {
        self.history.analyze_spring_risk_profile()
    }

    #[inline]
    pub fn is_broken_down(&self) -> bool {
        self.breakdown.is_some()
    }
}

// ============================================================
// SPRING ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Trailing window for volume ratios
    pub volume_period: Period,
    /// Validate every bar before scanning
    pub validate_data: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            volume_period: Period::new_const(volume::DEFAULT_VOLUME_PERIOD),
            validate_data: true,
        }
    }
}

/// Runs the full detection pipeline for one range:
/// volume cache, Spring scan, Test confirmation, scoring, sizing, history.
pub struct SpringEngine<M: MarketConditionProvider = NeutralMarket> {
    spring_detector: SpringDetector,
    test_detector: TestConfirmationDetector,
    sos_detector: SosDetector,
    scorer: SpringScorer,
    sos_scorer: SosScorer,
    risk: RiskEngine,
    history_config: HistoryConfig,
    market: M,
    config: EngineConfig,
}

impl<M: MarketConditionProvider> SpringEngine<M> {
    #[inline]
    pub fn risk_engine(&self) -> &RiskEngine {
        &self.risk
    }

    #[inline]
    pub fn scorer(&self) -> &SpringScorer {
        &self.scorer
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Precompute volume ratios for a bar series.
    #[inline]
    pub fn compute_volumes<T: OHLCV>(&self, bars: &[T]) -> Result<VolumeCache> {
        VolumeCache::with_period(bars, self.config.volume_period)
    }

    /// Analyze one range of one symbol.
    ///
    /// Returns `Err` only for input-contract violations (invalid range, bad bars,
    /// non-positive account size). Candidates that fail a gate are recorded in
    /// [`RangeAnalysis::rejections`] and scanning continues.
    pub fn analyze<T: OHLCV>(
        &self,
        symbol: &str,
        range: &TradingRange,
        bars: &[T],
        phase: Option<&PhaseClassification>,
        account_size: f64,
    ) -> Result<RangeAnalysis> {
        RiskEngine::validate_account(account_size)?;
        range.validate()?;
        if self.config.validate_data {
            validate_bars(bars)?;
        }

        let volumes = self.compute_volumes(bars)?;
        let scan = self.spring_detector.scan(range, bars, &volumes)?;

        let mut history = SpringHistory::with_config(range.id.clone(), self.history_config);
        let mut rejections = scan.rejections;
        let mut previous_tests = Vec::new();

        for spring in scan.springs {
            let test = match self.test_detector.find(&spring, bars, &volumes) {
                Ok(test) => test,
                Err(rejection) => {
                    rejection.log(symbol);
                    rejections.push(rejection);
                    history.add_spring(SpringRecord::unconfirmed(spring));
                    continue;
                }
            };

            let market = self.market_condition(symbol, test.timestamp);
            let confidence =
                self.scorer
                    .score(&spring, &test, range, phase, &previous_tests, market);

            let outcome = self.risk.evaluate(
                SignalInput {
                    spring: &spring,
                    test: Some(&test),
                    confidence: &confidence,
                    range,
                },
                account_size,
            )?;

            match outcome {
                SignalOutcome::Signal(signal) => history.add_signal(signal),
                SignalOutcome::Rejected(rejection) => {
                    rejection.log(symbol);
                    rejections.push(rejection);
                }
            }

            previous_tests.push(test.clone());
            history.add_spring(SpringRecord::confirmed(spring, test, confidence));
        }

        let breakouts = if scan.breakdown.is_none() {
            self.score_breakouts(symbol, range, bars, &volumes, phase)?
        } else {
            Vec::new()
        };

        Ok(RangeAnalysis {
            symbol: symbol.to_string(),
            range: range.clone(),
            history,
            breakouts,
            rejections,
            breakdown: scan.breakdown,
        })
    }

    fn score_breakouts<T: OHLCV>(
        &self,
        symbol: &str,
        range: &TradingRange,
        bars: &[T],
        volumes: &VolumeCache,
        phase: Option<&PhaseClassification>,
    ) -> Result<Vec<ScoredSos>> {
        let breakouts = self.sos_detector.scan(range, bars, volumes)?;
        Ok(breakouts
            .into_iter()
            .map(|breakout| {
                let lps = self.sos_detector.find_lps(range, bars, &breakout);
                let market = self.market_condition(symbol, breakout.timestamp);
                let entry_type = lps.as_ref().map_or(detectors::EntryType::Direct, |_| {
                    detectors::EntryType::Lps
                });
                let confidence = self.sos_scorer.score(&breakout, entry_type, phase, market);
                ScoredSos {
                    breakout,
                    lps,
                    confidence,
                }
            })
            .collect())
    }

    /// Optional market lookup; absence degrades to the neutral modifier.
    fn market_condition(&self, symbol: &str, timestamp: i64) -> Option<MarketCondition> {
        let condition = self.market.condition(symbol, timestamp);
        if condition.is_none() {
            tracing::debug!(
                "[{}] market condition unavailable at {}, using neutral modifier",
                symbol,
                timestamp
            );
        }
        condition
    }

    fn validate(&self) -> Result<()> {
        self.spring_detector.validate_config()?;
        self.test_detector.validate_config()?;
        self.sos_detector.validate_config()?;
        self.scorer.validate_config()?;
        self.sos_scorer.validate_config()?;
        self.risk.validate_config()?;
        self.history_config.validate()?;
        Ok(())
    }
}

fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            WyckoffError::InvalidOHLCV { reason, .. } => {
                WyckoffError::InvalidOHLCV { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating SpringEngine instances
pub struct EngineBuilder<M: MarketConditionProvider = NeutralMarket> {
    market: M,
    spring: SpringDetectorConfig,
    test: TestDetectorConfig,
    sos: SosDetectorConfig,
    scorer: SpringScorer,
    sos_scorer: SosScorer,
    risk: RiskConfig,
    history: HistoryConfig,
    config: EngineConfig,
}

impl Default for EngineBuilder<NeutralMarket> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<NeutralMarket> {
    pub fn new() -> Self {
        Self {
            market: NeutralMarket,
            spring: SpringDetectorConfig::default(),
            test: TestDetectorConfig::default(),
            sos: SosDetectorConfig::default(),
            scorer: SpringScorer::default(),
            sos_scorer: SosScorer::default(),
            risk: RiskConfig::default(),
            history: HistoryConfig::default(),
            config: EngineConfig::default(),
        }
    }
}

impl<M: MarketConditionProvider> EngineBuilder<M> {
    /// Change market condition provider
    pub fn market_condition<M2: MarketConditionProvider>(self, provider: M2) -> EngineBuilder<M2> {
        EngineBuilder {
            market: provider,
            spring: self.spring,
            test: self.test,
            sos: self.sos,
            scorer: self.scorer,
            sos_scorer: self.sos_scorer,
            risk: self.risk,
            history: self.history,
            config: self.config,
        }
    }

    pub fn spring_detector(mut self, config: SpringDetectorConfig) -> Self {
        self.spring = config;
        self
    }

    pub fn test_detector(mut self, config: TestDetectorConfig) -> Self {
        self.test = config;
        self
    }

    pub fn sos_detector(mut self, config: SosDetectorConfig) -> Self {
        self.sos = config;
        self
    }

    pub fn scorer(mut self, scorer: SpringScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn sos_scorer(mut self, scorer: SosScorer) -> Self {
        self.sos_scorer = scorer;
        self
    }

    pub fn risk(mut self, config: RiskConfig) -> Self {
        self.risk = config;
        self
    }

    pub fn history(mut self, config: HistoryConfig) -> Self {
        self.history = config;
        self
    }

    /// Set the trailing window used for volume ratios
    pub fn volume_period(mut self, period: Period) -> Self {
        self.config.volume_period = period;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<SpringEngine<M>> {
        let engine = SpringEngine {
            spring_detector: SpringDetector::new(self.spring),
            test_detector: TestConfirmationDetector::new(self.test),
            sos_detector: SosDetector::new(self.sos),
            scorer: self.scorer,
            sos_scorer: self.sos_scorer,
            risk: RiskEngine::new(self.risk).with_test_window(self.test),
            history_config: self.history,
            market: self.market,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// One symbol's input to [`scan_parallel`]
#[derive(Debug, Clone, Copy)]
pub struct Instrument<'a, T> {
    pub symbol: &'a str,
    pub range: &'a TradingRange,
    pub bars: &'a [T],
    pub phase: Option<&'a PhaseClassification>,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: WyckoffError,
}

/// Parallel analysis of independent instruments. A failure on one symbol
/// never affects the others.
pub fn scan_parallel<'a, T, I, M>(
    engine: &SpringEngine<M>,
    instruments: I,
    account_size: f64,
) -> (Vec<RangeAnalysis>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = Instrument<'a, T>>,
    M: MarketConditionProvider,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|inst| {
            engine
                .analyze(inst.symbol, inst.range, inst.bars, inst.phase, account_size)
                .map_err(|error| ScanError {
                    symbol: inst.symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default engine with no market condition provider
pub type DefaultEngine = SpringEngine<NeutralMarket>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use range::WyckoffPhase;

    fn flat_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::new(i as i64 * 60, 101.0, 102.0, 100.5, 101.5, 1000.0))
            .collect()
    }

    /// 25 flat bars, a Spring at 25 (1.5% below Creek 100 on 0.25x volume),
    /// recovery at 26, a low-volume Test at 29.
    fn spring_bars() -> Vec<Bar> {
        let mut bars = flat_bars(25);
        let ts = |i: i64| i * 60;
        bars.push(Bar::new(ts(25), 100.5, 100.6, 98.5, 99.5, 250.0));
        bars.push(Bar::new(ts(26), 99.5, 101.5, 99.4, 101.2, 600.0));
        bars.push(Bar::new(ts(27), 101.2, 102.0, 100.8, 101.6, 900.0));
        bars.push(Bar::new(ts(28), 101.6, 102.2, 101.0, 101.8, 900.0));
        bars.push(Bar::new(ts(29), 101.8, 102.0, 100.2, 102.0, 150.0));
        bars.push(Bar::new(ts(30), 102.0, 103.0, 101.5, 102.5, 900.0));
        bars
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Bar::new(0, 100.0, 110.0, 90.0, 105.0, 10.0);
        assert_eq!(bar.range(), 20.0);
        assert!((bar.close_position().unwrap() - 0.75).abs() < 1e-12);
        assert!(bar.validate().is_ok());

        let bad = Bar::new(0, 100.0, 90.0, 110.0, 105.0, 10.0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_engine_builder() {
        assert!(EngineBuilder::new().build().is_ok());
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let risk = RiskConfig {
            min_r_multiple: -1.0,
            ..RiskConfig::default()
        };
        assert!(EngineBuilder::new().risk(risk).build().is_err());
    }

    #[test]
    fn test_empty_scan() {
        let engine = EngineBuilder::new().build().unwrap();
        let range = TradingRange::new("R1", 100.0, 110.0, 125.0);
        let bars: Vec<Bar> = vec![];
        let analysis = engine.analyze("TEST", &range, &bars, None, 100_000.0).unwrap();
        assert!(analysis.history.is_empty());
        assert!(analysis.rejections.is_empty());
        assert!(!analysis.is_broken_down());
    }

    #[test]
    fn test_invalid_account_size_is_fatal() {
        let engine = EngineBuilder::new().build().unwrap();
        let range = TradingRange::new("R1", 100.0, 110.0, 125.0);
        let bars = spring_bars();
        assert!(matches!(
            engine.analyze("TEST", &range, &bars, None, 0.0),
            Err(WyckoffError::InvalidAccountSize(_))
        ));
    }

    #[test]
    fn test_invalid_bar_reports_index() {
        let engine = EngineBuilder::new().build().unwrap();
        let range = TradingRange::new("R1", 100.0, 110.0, 125.0);
        let mut bars = flat_bars(5);
        bars[3].high = f64::NAN;
        match engine.analyze("TEST", &range, &bars, None, 100_000.0) {
            Err(WyckoffError::InvalidOHLCV { index, .. }) => assert_eq!(index, 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_full_pipeline_produces_signal() {
        let engine = EngineBuilder::new().build().unwrap();
        let range = TradingRange::new("R1", 100.0, 110.0, 125.0).with_creek_strength(85.0);
        let phase = PhaseClassification::new(WyckoffPhase::C, 80.0);
        let bars = spring_bars();

        let analysis = engine
            .analyze("TEST", &range, &bars, Some(&phase), 100_000.0)
            .unwrap();

        assert_eq!(analysis.history.len(), 1);
        let signal = analysis.best_signal().expect("signal");
        assert_eq!(signal.urgency, risk::Urgency::Immediate);
        assert!(signal.stop_loss < signal.entry_price);
        assert!(signal.r_multiple >= 2.0);
        assert!(signal.confidence >= 95.0);
    }

    #[test]
    fn test_parallel_scan_isolates_failures() {
        let engine = EngineBuilder::new().build().unwrap();
        let good_range = TradingRange::new("R1", 100.0, 110.0, 125.0);
        let bad_range = TradingRange::new("R2", 110.0, 100.0, 125.0);
        let bars = spring_bars();

        let instruments = vec![
            Instrument {
                symbol: "AAPL",
                range: &good_range,
                bars: &bars,
                phase: None,
            },
            Instrument {
                symbol: "MSFT",
                range: &bad_range,
                bars: &bars,
                phase: None,
            },
        ];

        let (results, errors) = scan_parallel(&engine, instruments, 100_000.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "AAPL");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "MSFT");
    }
}
