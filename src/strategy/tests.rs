//! Unit tests for signal generation

use super::*;
use crate::ml::{FeatureExtractor, TrainParams};
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn make_bars(n: usize, start_price: f64) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut close = start_price;
    (0..n)
        .map(|i| {
            if i > 0 {
                close *= if (i / 5) % 2 == 0 { 1.01 } else { 0.99 };
            }
            Bar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 500_000.0,
            }
        })
        .collect()
}

fn make_quote(symbol: &str, price: Decimal, volume: u64) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        price,
        volume,
        change_pct: dec!(0.01),
        timestamp: Utc::now(),
    }
}

fn trained_model() -> ScoringModel {
    let samples = FeatureExtractor::default().training_samples(&make_bars(200, 10.0));
    ScoringModel::train(&samples, &TrainParams::default(), vec![]).unwrap()
}

fn generator(threshold: Decimal) -> SignalGenerator {
    let trading = TradingConfig {
        min_ml_score_threshold: threshold,
        ..Default::default()
    };
    SignalGenerator::new(trading, RiskConfig::default())
}

#[test]
fn test_price_band_filter() {
    let gen = generator(dec!(0));
    let model = trained_model();
    let bars = make_bars(60, 10.0);

    let cheap = make_quote("PENNY", dec!(0.20), 1_000_000);
    assert_eq!(
        gen.check(&cheap, &bars, &model).unwrap_err(),
        SkipReason::PriceOutOfRange(dec!(0.20))
    );

    let pricey = make_quote("BIG", dec!(120), 1_000_000);
    assert!(matches!(
        gen.check(&pricey, &bars, &model),
        Err(SkipReason::PriceOutOfRange(_))
    ));
}

#[test]
fn test_volume_filter() {
    let gen = generator(dec!(0));
    let model = trained_model();
    let quote = make_quote("THIN", dec!(10), 50_000);
    assert_eq!(
        gen.check(&quote, &make_bars(60, 10.0), &model).unwrap_err(),
        SkipReason::LowVolume(50_000)
    );
}

#[test]
fn test_history_required() {
    let gen = generator(dec!(0));
    let model = trained_model();
    let quote = make_quote("NEW", dec!(10), 1_000_000);
    assert_eq!(
        gen.check(&quote, &make_bars(10, 10.0), &model).unwrap_err(),
        SkipReason::NotEnoughHistory(10)
    );
}

#[test]
fn test_threshold_gate() {
    let model = trained_model();
    let bars = make_bars(60, 10.0);
    let quote = make_quote("ABC", dec!(10), 1_000_000);

    if let Err(reason) = generator(dec!(100)).check(&quote, &bars, &model) {
        assert!(matches!(reason, SkipReason::ScoreBelowThreshold(_)));
    }
    let signal = generator(dec!(0)).evaluate(&quote, &bars, &model).unwrap();
    assert_eq!(signal.symbol, "ABC");
    assert_eq!(signal.price, dec!(10));
}

#[test]
fn test_exit_levels_follow_risk_config() {
    let gen = generator(dec!(75));
    let signal = gen.build_signal("XYZ", dec!(20), dec!(80), Utc::now()).unwrap();
    // defaults: SL 15%, TP1 10%, TP2 25%
    assert_eq!(signal.stop_loss, dec!(17));
    assert_eq!(signal.take_profit_1, dec!(22));
    assert_eq!(signal.take_profit_2, dec!(25));
    assert_eq!(signal.risk_reward, dec!(1.67));
}

#[test]
fn test_risk_reward_filter() {
    let trading = TradingConfig {
        min_risk_reward_ratio: dec!(2.0),
        ..Default::default()
    };
    let gen = SignalGenerator::new(trading, RiskConfig::default());
    let err = gen.build_signal("XYZ", dec!(20), dec!(90), Utc::now()).unwrap_err();
    assert_eq!(err, SkipReason::RiskRewardTooLow(dec!(1.67)));
}

fn snapshot(symbol: &str, change: Decimal, volume: u64) -> MarketSnapshot {
    let mut quote = make_quote(symbol, dec!(10), volume);
    quote.change_pct = change;
    // 500k average daily volume
    MarketSnapshot {
        quote,
        bars: make_bars(30, 10.0),
    }
}

fn scan_config(universe: &[&str]) -> TradingConfig {
    TradingConfig {
        watchlist: vec!["AAPL".to_string()],
        scan_universe: universe.iter().map(|s| s.to_string()).collect(),
        top_movers_count: 2,
        ..Default::default()
    }
}

fn sources(candidates: &[Candidate]) -> Vec<(&str, CandidateSource)> {
    candidates.iter().map(|c| (c.symbol(), c.source)).collect()
}

#[test]
fn test_symbols_to_fetch_follow_toggles() {
    let scanner = MarketScanner::new(scan_config(&["TSLA", "AAPL"]));
    assert_eq!(scanner.symbols_to_fetch(), vec!["AAPL", "TSLA"]);

    let scanner = MarketScanner::new(TradingConfig {
        enable_watchlist_trading: false,
        ..scan_config(&["TSLA"])
    });
    assert_eq!(scanner.symbols_to_fetch(), vec!["TSLA"]);

    let scanner = MarketScanner::new(TradingConfig {
        enable_pump_trading: false,
        enable_top_stock_trading: false,
        ..scan_config(&["TSLA"])
    });
    assert_eq!(scanner.symbols_to_fetch(), vec!["AAPL"]);
}

#[test]
fn test_pump_needs_move_and_volume() {
    let scanner = MarketScanner::new(scan_config(&[]));
    assert!(scanner.is_pump(&snapshot("GME", dec!(0.08), 1_500_000)));
    // strong move on ordinary volume
    assert!(!scanner.is_pump(&snapshot("GME", dec!(0.08), 600_000)));
    // heavy volume without the move
    assert!(!scanner.is_pump(&snapshot("GME", dec!(0.02), 1_500_000)));
}

#[test]
fn test_select_orders_watchlist_pumps_then_top_movers() {
    let scanner = MarketScanner::new(scan_config(&["GME", "AMC", "F", "T", "X"]));
    let candidates = scanner.select(vec![
        snapshot("F", dec!(0.02), 400_000),
        snapshot("GME", dec!(0.10), 2_000_000),
        snapshot("T", dec!(0.03), 400_000),
        snapshot("AAPL", dec!(-0.01), 400_000),
        snapshot("X", dec!(-0.04), 400_000),
        snapshot("AMC", dec!(0.01), 400_000),
    ]);

    assert_eq!(
        sources(&candidates),
        vec![
            ("AAPL", CandidateSource::Watchlist),
            ("GME", CandidateSource::Pump),
            ("T", CandidateSource::TopMover),
            ("F", CandidateSource::TopMover),
        ]
    );
}

#[test]
fn test_select_with_scanners_disabled_keeps_watchlist_only() {
    let scanner = MarketScanner::new(TradingConfig {
        enable_pump_trading: false,
        enable_top_stock_trading: false,
        ..scan_config(&["GME"])
    });
    let candidates = scanner.select(vec![
        snapshot("AAPL", dec!(0.01), 400_000),
        snapshot("GME", dec!(0.10), 2_000_000),
    ]);
    assert_eq!(sources(&candidates), vec![("AAPL", CandidateSource::Watchlist)]);
}

#[test]
fn test_average_volume_window() {
    assert_eq!(scanner::average_volume(&[], 20), None);
    let bars = make_bars(30, 10.0);
    assert_eq!(scanner::average_volume(&bars, 20), Some(dec!(500000)));
}
