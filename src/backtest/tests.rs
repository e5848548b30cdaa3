//! Backtest replay tests

use super::*;
use crate::ml::{FeatureExtractor, TrainParams, LOOKBACK};
use rust_decimal_macros::dec;

fn model() -> ScoringModel {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut close = 20.0;
    let training: Vec<Bar> = (0..200)
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
        .collect();
    let samples = FeatureExtractor::default().training_samples(&training);
    ScoringModel::train(&samples, &TrainParams::default(), vec![]).unwrap()
}

fn config() -> Config {
    let mut config = Config::default();
    // every bar with enough history produces a signal
    config.trading.min_ml_score_threshold = dec!(0);
    config
}

/// LOOKBACK + 1 quiet bars at 20, so the first entry fills at the last of them
fn quiet_bars() -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..=LOOKBACK)
        .map(|i| Bar {
            date: start + chrono::Duration::days(i as i64),
            open: 20.0,
            high: 20.2,
            low: 19.8,
            close: 20.0,
            volume: 500_000.0,
        })
        .collect()
}

fn push_bar(bars: &mut Vec<Bar>, open: f64, high: f64, low: f64, close: f64) {
    let date = bars.last().unwrap().date + chrono::Duration::days(1);
    bars.push(Bar { date, open, high, low, close, volume: 500_000.0 });
}

#[test]
fn test_no_bars_is_an_error() {
    let err = Backtester::run("AAPL", &[], &model(), &config()).unwrap_err();
    assert!(matches!(err, BotError::InsufficientData(_)));
}

#[test]
fn test_entry_fills_at_signal_close() {
    let bars = quiet_bars();
    let result = Backtester::run("aapl", &bars, &model(), &config()).unwrap();

    let entry = &result.trades[0];
    assert_eq!(entry.side, Side::Buy);
    assert_eq!(entry.price, dec!(20));
    assert_eq!(entry.shares, 50);
    // closed flat at the last bar
    assert_eq!(result.trades[1].reason, END_OF_DATA);
    assert_eq!(result.final_equity, dec!(10000));
    assert_eq!(result.symbol, "AAPL");
}

#[test]
fn test_stop_checked_before_target_on_wide_bar() {
    let mut bars = quiet_bars();
    push_bar(&mut bars, 20.0, 26.0, 16.0, 20.0);
    let result = Backtester::run("AAPL", &bars, &model(), &config()).unwrap();

    let exit = &result.trades[1];
    assert_eq!(exit.reason, "stop_loss");
    assert_eq!(exit.price, dec!(17));
    assert_eq!(exit.pnl, Some(dec!(-150)));
}

#[test]
fn test_gap_up_fills_target_at_open() {
    let mut bars = quiet_bars();
    push_bar(&mut bars, 26.0, 27.0, 25.5, 26.5);
    let result = Backtester::run("AAPL", &bars, &model(), &config()).unwrap();

    let exit = &result.trades[1];
    assert_eq!(exit.reason, "take_profit_2");
    assert_eq!(exit.price, dec!(26));
    assert_eq!(exit.shares, 50);
    assert_eq!(exit.pnl, Some(dec!(300)));
}

#[test]
fn test_first_target_sells_half_then_closes_at_end() {
    let mut bars = quiet_bars();
    push_bar(&mut bars, 20.0, 22.5, 19.5, 22.0);
    let result = Backtester::run("AAPL", &bars, &model(), &config()).unwrap();

    assert_eq!(result.trades.len(), 3);
    assert_eq!(result.trades[1].reason, "take_profit_1");
    assert_eq!(result.trades[1].shares, 25);
    assert_eq!(result.trades[1].price, dec!(22));
    assert_eq!(result.trades[2].reason, END_OF_DATA);
    assert_eq!(result.trades[2].shares, 25);

    assert_eq!(result.final_equity, dec!(10100));
    assert_eq!(result.return_pct, dec!(1));
    assert_eq!(result.stats.total_trades, 2);
    assert_eq!(result.stats.winning_trades, 2);
}

#[test]
fn test_report_name() {
    let bars = quiet_bars();
    let result = Backtester::run("AAPL", &bars, &model(), &config()).unwrap();
    assert_eq!(result.report_name(), "backtest_AAPL_2024-01-01_2024-01-21");
}
