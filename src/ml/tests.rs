//! Tests for feature extraction and the scoring model

use super::*;
use crate::error::BotError;
use crate::types::Bar;
use chrono::NaiveDate;
use tempfile::tempdir;

/// Alternating five-day up and down runs of 1% per day
fn regime_bars(n: usize) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut close = 100.0;
    (0..n)
        .map(|i| {
            let prev = close;
            if i > 0 {
                close *= if (i / 5) % 2 == 0 { 1.01 } else { 0.99 };
            }
            Bar {
                date: start + chrono::Duration::days(i as i64),
                open: prev,
                high: prev.max(close) * 1.002,
                low: prev.min(close) * 0.998,
                close,
                volume: 100_000.0 + (i % 7) as f64 * 5_000.0,
            }
        })
        .collect()
}

fn flat_bars(n: usize) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..n)
        .map(|i| Bar {
            date: start + chrono::Duration::days(i as i64),
            open: 10.0,
            high: 10.0,
            low: 10.0,
            close: 10.0,
            volume: 0.0,
        })
        .collect()
}

#[test]
fn test_extract_requires_lookback() {
    let bars = regime_bars(25);
    let extractor = FeatureExtractor::default();
    assert!(extractor.extract_at(&bars, LOOKBACK - 1).is_none());
    assert!(extractor.extract_at(&bars, LOOKBACK).is_some());
    assert!(extractor.extract_at(&bars, 25).is_none());
}

#[test]
fn test_flat_series_features() {
    let bars = flat_bars(30);
    let f = FeatureExtractor::default().latest(&bars).unwrap();
    assert_eq!(f[0], 0.0); // return_1d
    assert_eq!(f[1], 0.0); // return_5d
    assert_eq!(f[2], 0.5); // neutral RSI
    assert_eq!(f[3], 0.0); // on the SMA
    assert_eq!(f[4], 1.0); // zero volume history -> ratio 1
    assert_eq!(f[5], 0.0); // no volatility
}

#[test]
fn test_rsi_saturates_in_uptrend() {
    let bars: Vec<Bar> = regime_bars(60);
    // bar 24 closes the fifth straight up day after a down run; bar 29 the fifth down day
    let extractor = FeatureExtractor::default();
    let up = extractor.extract_at(&bars, 24).unwrap();
    let down = extractor.extract_at(&bars, 29).unwrap();
    assert!(up[0] > 0.0 && down[0] < 0.0);
    assert!(up[2] > down[2]);
}

#[test]
fn test_training_samples_labels() {
    let bars = regime_bars(60);
    let samples = FeatureExtractor::default().training_samples(&bars);
    assert_eq!(samples.len(), 60 - 1 - LOOKBACK);
    // bar 20 is an up day inside an up run, bar 21 also up
    assert!(samples[0].label);
}

#[test]
fn test_train_rejects_small_sets() {
    let samples = FeatureExtractor::default().training_samples(&regime_bars(40));
    let err = ScoringModel::train(&samples, &TrainParams::default(), vec![]).unwrap_err();
    assert!(matches!(err, BotError::InsufficientData(_)));
}

#[test]
fn test_model_learns_momentum_regime() {
    let bars = regime_bars(300);
    let extractor = FeatureExtractor::default();
    let samples = extractor.training_samples(&bars);

    let model =
        ScoringModel::train(&samples, &TrainParams::default(), vec!["SYN".to_string()]).unwrap();
    let metrics = model.evaluate(&samples);
    assert!(metrics.accuracy > 0.65, "accuracy was {}", metrics.accuracy);

    let up_day = extractor.extract_at(&bars, 201).unwrap();
    let down_day = extractor.extract_at(&bars, 206).unwrap();
    assert!(model.score(&up_day) > model.score(&down_day));
}

#[test]
fn test_score_is_bounded() {
    let samples = FeatureExtractor::default().training_samples(&regime_bars(120));
    let model = ScoringModel::train(&samples, &TrainParams::default(), vec![]).unwrap();
    let extreme = [10.0, 10.0, 1.0, 10.0, 50.0, 0.0];
    let score = model.score(&extreme);
    assert!(score >= rust_decimal::Decimal::ZERO);
    assert!(score <= rust_decimal::Decimal::ONE_HUNDRED);
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("scoring_model.json");

    let bars = regime_bars(120);
    let extractor = FeatureExtractor::default();
    let samples = extractor.training_samples(&bars);
    let model = ScoringModel::train(&samples, &TrainParams::default(), vec!["SYN".into()]).unwrap();
    model.save(&path).unwrap();

    let loaded = ScoringModel::load(&path).unwrap();
    let f = extractor.latest(&bars).unwrap();
    assert_eq!(loaded.score(&f), model.score(&f));
    assert_eq!(loaded.symbols, vec!["SYN".to_string()]);
}

#[test]
fn test_load_rejects_wrong_feature_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    let json = r#"{
        "feature_names": ["a", "b"], "weights": [0.1, 0.2], "bias": 0.0,
        "means": [0.0, 0.0], "stds": [1.0, 1.0],
        "trained_at": "2024-01-01T00:00:00Z", "training_samples": 40, "symbols": []
    }"#;
    std::fs::write(&path, json).unwrap();
    assert!(matches!(ScoringModel::load(&path), Err(BotError::Model(_))));
}
