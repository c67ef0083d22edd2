//! Integration tests for the Spring detection pipeline.
//!
//! Each scenario builds a bar series around a Creek of 100, Ice of 110 and
//! Jump of 125 and runs it through the public engine API.

use wyckoff_spring::prelude::*;

/// Caller-side bar type, to exercise the generic OHLCV API
#[derive(Debug, Clone, Copy)]
struct TestBar {
    ts: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        self.v
    }

    fn timestamp(&self) -> i64 {
        self.ts
    }
}

fn bar(i: usize, o: f64, h: f64, l: f64, c: f64, v: f64) -> TestBar {
    TestBar {
        ts: i as i64 * 60,
        o,
        h,
        l,
        c,
        v,
    }
}

/// Quiet bars just above Creek at volume 1000
fn filler(n: usize) -> Vec<TestBar> {
    (0..n).map(|i| bar(i, 101.0, 102.0, 100.5, 101.5, 1000.0)).collect()
}

fn set(bars: &mut [TestBar], i: usize, o: f64, h: f64, l: f64, c: f64, v: f64) {
    bars[i] = bar(i, o, h, l, c, v);
}

fn range() -> TradingRange {
    TradingRange::new("RANGE-1", 100.0, 110.0, 125.0)
}

fn engine() -> DefaultEngine {
    EngineBuilder::new().build().unwrap()
}

/// Spring at 25: 1.5% below Creek on 0.25x volume, back above Creek at 26,
/// Test at 29 on 0.4x the Spring volume.
fn ideal_bars() -> Vec<TestBar> {
    let mut bars = filler(35);
    set(&mut bars, 25, 100.5, 100.6, 98.5, 99.5, 250.0);
    set(&mut bars, 26, 99.5, 101.5, 99.4, 101.0, 800.0);
    set(&mut bars, 29, 101.0, 101.8, 100.2, 101.5, 100.0);
    bars
}

/// Spring at 25: 4% below Creek on 0.6x volume, back above Creek at 29,
/// Test at 30 on half the Spring volume.
fn marginal_bars() -> Vec<TestBar> {
    let mut bars = filler(36);
    set(&mut bars, 25, 100.0, 100.2, 96.0, 97.0, 600.0);
    for i in 26..29 {
        set(&mut bars, i, 97.0, 99.5, 97.5, 99.0, 700.0);
    }
    set(&mut bars, 29, 99.0, 101.0, 98.8, 100.5, 900.0);
    set(&mut bars, 30, 100.5, 101.2, 100.1, 100.8, 300.0);
    bars
}

// ============================================================
// SCENARIOS
// ============================================================

#[test]
fn test_ideal_spring_scores_near_max_and_signals() {
    let range = range().with_creek_strength(85.0);
    let phase = PhaseClassification::new(WyckoffPhase::C, 80.0);
    let analysis = engine()
        .analyze("AAPL", &range, &ideal_bars(), Some(&phase), 100_000.0)
        .unwrap();

    let record = &analysis.history.springs()[0];
    let confidence = record.confidence.as_ref().expect("scored");
    assert!((95.0..=100.0).contains(&confidence.total_score));
    assert!(confidence.raw_total > 100.0);

    let signal = analysis.best_signal().expect("signal");
    assert_eq!(signal.spring_bar_index, 25);
    assert_eq!(signal.test_bar_index, 29);
    assert_eq!(signal.entry_price, 101.5);
    assert!((signal.stop_loss - 98.5 * 0.98).abs() < 1e-9);
    assert_eq!(signal.target_price, 125.0);
    assert_eq!(signal.position_size, 201);
    assert_eq!(signal.urgency, Urgency::Immediate);
    assert!(signal.risk_amount <= 1_000.0);
}

#[test]
fn test_marginal_spring_rejected_at_floor() {
    let range = range().with_creek_strength(60.0);
    let analysis = engine()
        .analyze("AAPL", &range, &marginal_bars(), None, 100_000.0)
        .unwrap();

    let record = &analysis.history.springs()[0];
    assert_eq!(record.spring.recovery_bars, 4);
    let score = record.total_score().expect("scored");
    assert!((55.0..=65.0).contains(&score), "score = {score}");

    assert!(analysis.signals().is_empty());
    let rejection = analysis.rejections.last().expect("rejection");
    assert_eq!(rejection.reason.code(), "confidence_below_floor");
    assert_eq!(rejection.bar_index, 30);
}

#[test]
fn test_market_condition_shifts_score() {
    let range = range().with_creek_strength(60.0);
    let bars = marginal_bars();
    let bullish = EngineBuilder::new()
        .market_condition(FixedMarket(MarketCondition::Bullish))
        .build()
        .unwrap();
    let bearish = EngineBuilder::new()
        .market_condition(|_: &str, _: i64| Some(MarketCondition::Bearish))
        .build()
        .unwrap();

    let up = bullish.analyze("AAPL", &range, &bars, None, 100_000.0).unwrap();
    let down = bearish.analyze("AAPL", &range, &bars, None, 100_000.0).unwrap();
    let neutral = engine().analyze("AAPL", &range, &bars, None, 100_000.0).unwrap();

    let score = |a: &RangeAnalysis| a.history.springs()[0].total_score().unwrap();
    assert_eq!(score(&up), score(&neutral) + 5.0);
    assert_eq!(score(&down), score(&neutral) - 5.0);
    // Still below the 70 floor
    assert!(up.signals().is_empty());
}

#[test]
fn test_declining_multi_spring_campaign() {
    let mut bars = filler(100);
    for (k, ratio) in [0.5, 0.4, 0.25].iter().enumerate() {
        let s = 25 + 25 * k;
        let volume = ratio * 1000.0;
        set(&mut bars, s, 100.5, 100.6, 98.5, 99.5, volume);
        set(&mut bars, s + 1, 99.5, 101.5, 99.4, 101.0, 1000.0);
        set(&mut bars, s + 4, 101.0, 101.8, 100.2, 101.5, volume * 0.5);
    }
    let range = range().with_creek_strength(75.0);

    let analysis = engine()
        .analyze("MSFT", &range, &bars, None, 100_000.0)
        .unwrap();

    let ratios: Vec<f64> = analysis
        .history
        .springs()
        .iter()
        .map(|r| r.spring.volume_ratio)
        .collect();
    assert_eq!(ratios.len(), 3);
    assert!((ratios[0] - 0.5).abs() < 1e-12);
    assert!((ratios[2] - 0.25).abs() < 1e-12);

    assert_eq!(analysis.history.volume_trend(), VolumeTrend::Declining);
    let profile = analysis.risk_profile();
    assert_eq!(profile.risk_level, RiskLevel::Low);
    assert_eq!(profile.recommendation, Recommendation::HighlyTradeable);

    // Later Tests dried up against earlier ones
    let second = analysis.history.springs()[1].confidence.as_ref().unwrap();
    assert_eq!(second.volume_trend_bonus, 10.0);

    assert_eq!(analysis.signals().len(), 3);
    // Equal totals; the lowest volume Spring wins the tie-break
    assert_eq!(analysis.best_signal().unwrap().spring_bar_index, 75);
}

#[test]
fn test_breakdown_stops_scan() {
    let mut bars = filler(45);
    set(&mut bars, 25, 100.0, 100.2, 94.9, 96.0, 300.0);
    set(&mut bars, 26, 96.0, 101.0, 95.8, 100.5, 900.0);
    // Would be a clean Spring if the range were still intact
    set(&mut bars, 35, 100.5, 100.6, 98.5, 99.5, 250.0);
    set(&mut bars, 36, 99.5, 101.5, 99.4, 101.0, 800.0);

    let analysis = engine()
        .analyze("AAPL", &range(), &bars, None, 100_000.0)
        .unwrap();

    assert!(analysis.is_broken_down());
    let breakdown = analysis.breakdown.as_ref().unwrap();
    assert_eq!(breakdown.bar_index, 25);
    assert!(matches!(breakdown.reason, RejectionReason::Breakdown { .. }));
    assert!(analysis.history.is_empty());
    assert!(analysis.breakouts.is_empty());
}

#[test]
fn test_spring_without_test_never_signals() {
    let mut bars = ideal_bars();
    // Test bar now trades more than the Spring bar
    set(&mut bars, 29, 101.0, 101.8, 100.2, 101.5, 300.0);

    let analysis = engine()
        .analyze("AAPL", &range(), &bars, None, 100_000.0)
        .unwrap();

    assert_eq!(analysis.history.len(), 1);
    assert!(!analysis.history.springs()[0].is_confirmed());
    assert!(analysis.signals().is_empty());
    assert!(analysis
        .rejections
        .iter()
        .any(|r| r.reason.code() == "no_test"));
}

#[test]
fn test_sign_of_strength_with_lps() {
    let mut bars: Vec<TestBar> = (0..25)
        .map(|i| bar(i, 105.0, 106.0, 104.5, 105.5, 1000.0))
        .collect();
    bars.push(bar(25, 108.0, 113.0, 108.0, 112.5, 2500.0));
    bars.push(bar(26, 111.0, 112.0, 110.5, 111.5, 600.0));
    bars.push(bar(27, 111.5, 113.0, 111.0, 112.0, 800.0));

    let phase = PhaseClassification::new(WyckoffPhase::D, 80.0);
    let analysis = engine()
        .analyze("NVDA", &range(), &bars, Some(&phase), 100_000.0)
        .unwrap();

    assert!(analysis.history.is_empty());
    assert_eq!(analysis.breakouts.len(), 1);
    let sos = &analysis.breakouts[0];
    assert_eq!(sos.breakout.bar_index, 25);
    assert_eq!(sos.lps.as_ref().map(|l| l.bar_index), Some(26));
    assert_eq!(sos.confidence.entry_type, EntryType::Lps);
    assert_eq!(sos.confidence.volume_score, 35.0);
    assert_eq!(sos.confidence.total_score, 100.0);
}

// ============================================================
// GATES AND BOUNDARIES
// ============================================================

#[test]
fn test_volume_gate_boundary() {
    let scan = |volume: f64| {
        let mut bars = ideal_bars();
        set(&mut bars, 25, 100.5, 100.6, 98.5, 99.5, volume);
        let volumes = VolumeCache::new(&bars).unwrap();
        SpringDetector::with_defaults()
            .scan(&range(), &bars, &volumes)
            .unwrap()
    };

    let at_limit = scan(700.0);
    assert!(at_limit.springs.is_empty());
    assert!(matches!(
        at_limit.rejections[0].reason,
        RejectionReason::VolumeTooHigh { .. }
    ));

    let below = scan(690.0);
    assert_eq!(below.springs.len(), 1);
    assert!((below.springs[0].volume_ratio - 0.69).abs() < 1e-12);
}

#[test]
fn test_r_multiple_boundary() {
    let bars = ideal_bars();
    let entry = 101.5;
    let risk = entry - 98.5 * 0.98;

    let run = |multiple: f64| {
        let range = TradingRange::new("R", 100.0, 110.0, entry + multiple * risk)
            .with_creek_strength(85.0);
        engine()
            .analyze("AAPL", &range, &bars, None, 100_000.0)
            .unwrap()
    };

    let accepted = run(2.0);
    assert_eq!(accepted.signals().len(), 1);
    assert!((accepted.signals()[0].r_multiple - 2.0).abs() < 1e-9);

    let rejected = run(1.9);
    assert!(rejected.signals().is_empty());
    assert!(matches!(
        rejected.rejections.last().map(|r| &r.reason),
        Some(RejectionReason::RMultipleBelowMinimum { .. })
    ));
}

#[test]
fn test_fixed_fractional_sizing() {
    let engine = RiskEngine::default();
    assert_eq!(engine.position_size(100_000.0, 100.50, 96.00), 222);
}

#[test]
fn test_stop_buffer_never_widens_with_depth() {
    let engine = RiskEngine::default();
    let depths = [0.001, 0.01, 0.02, 0.021, 0.03, 0.031, 0.04, 0.05];
    for pair in depths.windows(2) {
        assert!(engine.stop_buffer(pair[0]) >= engine.stop_buffer(pair[1]));
    }
}

#[test]
fn test_range_window_excludes_earlier_bars() {
    let bars = ideal_bars();
    // Range starts after the Spring bar
    let range = range().with_start(bars[27].ts, 8);
    let analysis = engine()
        .analyze("AAPL", &range, &bars, None, 100_000.0)
        .unwrap();
    assert!(analysis.history.is_empty());
}

#[test]
fn test_non_increasing_timestamps_rejected() {
    let mut bars = ideal_bars();
    bars[10].ts = bars[9].ts;
    assert!(matches!(
        engine().analyze("AAPL", &range(), &bars, None, 100_000.0),
        Err(WyckoffError::NonIncreasingTimestamp { index: 10, .. })
    ));
}

// ============================================================
// PARALLEL
// ============================================================

#[test]
fn test_scan_parallel_many_symbols() {
    let engine = engine();
    let good = range().with_creek_strength(85.0);
    let broken = TradingRange::new("BAD", 100.0, 90.0, 125.0);
    let ideal = ideal_bars();
    let marginal = marginal_bars();
    let symbols: Vec<String> = (0..8).map(|i| format!("SYM{i}")).collect();

    let instruments: Vec<Instrument<'_, TestBar>> = symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| Instrument {
            symbol,
            range: if i == 7 { &broken } else { &good },
            bars: if i % 2 == 0 { &ideal } else { &marginal },
            phase: None,
        })
        .collect();

    let (results, errors) = scan_parallel(&engine, instruments, 100_000.0);
    assert_eq!(results.len(), 7);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].symbol, "SYM7");

    let with_signal = results.iter().filter(|r| !r.signals().is_empty()).count();
    assert_eq!(with_signal, 4);
}

#[test]
fn test_analysis_serializes() {
    let analysis = engine()
        .analyze("AAPL", &range(), &ideal_bars(), None, 100_000.0)
        .unwrap();
    let json = serde_json::to_string(&analysis).unwrap();
    let back: RangeAnalysis = serde_json::from_str(&json).unwrap();
    assert_eq!(back.history, analysis.history);
    assert_eq!(back.symbol, "AAPL");
}
