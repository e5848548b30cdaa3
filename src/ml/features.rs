//! Technical features from daily bars

use crate::types::Bar;

/// Bars of history needed before the first feature row
pub const LOOKBACK: usize = 20;

pub const FEATURE_COUNT: usize = 6;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "return_1d",
    "return_5d",
    "rsi_14",
    "sma20_distance",
    "volume_ratio",
    "volatility_10d",
];

pub type FeatureVector = [f64; FEATURE_COUNT];

/// Training row: features at bar `i`, label = close[i + 1] > close[i]
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: FeatureVector,
    pub label: bool,
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    rsi_period: usize,
    sma_period: usize,
    volatility_period: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            sma_period: LOOKBACK,
            volatility_period: 10,
        }
    }
}

impl FeatureExtractor {
    /// Features as of the close of `bars[idx]`, or None without enough history
    pub fn extract_at(&self, bars: &[Bar], idx: usize) -> Option<FeatureVector> {
        if idx < LOOKBACK || idx >= bars.len() {
            return None;
        }
        let close = bars[idx].close;

        let return_1d = pct_change(bars[idx - 1].close, close);
        let return_5d = pct_change(bars[idx - 5].close, close);
        let rsi = self.rsi(&bars[..=idx]) / 100.0;

        let window = &bars[idx + 1 - self.sma_period..=idx];
        let sma = window.iter().map(|b| b.close).sum::<f64>() / self.sma_period as f64;
        let sma_distance = if sma > 0.0 { close / sma - 1.0 } else { 0.0 };

        let prior = &bars[idx - LOOKBACK..idx];
        let avg_volume = prior.iter().map(|b| b.volume).sum::<f64>() / prior.len() as f64;
        let volume_ratio = if avg_volume > 0.0 {
            bars[idx].volume / avg_volume
        } else {
            1.0
        };

        let returns: Vec<f64> = (idx + 1 - self.volatility_period..=idx)
            .map(|i| pct_change(bars[i - 1].close, bars[i].close))
            .collect();
        let volatility = std_dev(&returns);

        let features = [return_1d, return_5d, rsi, sma_distance, volume_ratio, volatility];
        features.iter().all(|f| f.is_finite()).then_some(features)
    }

    /// Features for the most recent bar
    pub fn latest(&self, bars: &[Bar]) -> Option<FeatureVector> {
        bars.len().checked_sub(1).and_then(|i| self.extract_at(bars, i))
    }

    /// Labelled rows for every bar that has both lookback and a next bar
    pub fn training_samples(&self, bars: &[Bar]) -> Vec<Sample> {
        (LOOKBACK..bars.len().saturating_sub(1))
            .filter_map(|i| {
                self.extract_at(bars, i).map(|features| Sample {
                    features,
                    label: bars[i + 1].close > bars[i].close,
                })
            })
            .collect()
    }

    /// Simple-average RSI over the last `rsi_period` changes
    fn rsi(&self, bars: &[Bar]) -> f64 {
        let n = self.rsi_period.min(bars.len().saturating_sub(1));
        if n == 0 {
            return 50.0;
        }
        let start = bars.len() - n;
        let (mut gains, mut losses) = (0.0, 0.0);
        for i in start..bars.len() {
            let change = bars[i].close - bars[i - 1].close;
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }
        if losses == 0.0 {
            return if gains == 0.0 { 50.0 } else { 100.0 };
        }
        let rs = (gains / n as f64) / (losses / n as f64);
        100.0 - 100.0 / (1.0 + rs)
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        to / from - 1.0
    } else {
        0.0
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
