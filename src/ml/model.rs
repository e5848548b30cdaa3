//! Logistic regression scoring model
//!
//! Inputs are z-score standardised with statistics captured at training
//! time, so a saved model scores live data the same way it scored history.

use super::features::{FeatureVector, Sample, FEATURE_COUNT, FEATURE_NAMES};
use crate::error::{BotError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Below this many rows the fit is meaningless
pub const MIN_TRAINING_SAMPLES: usize = 30;

#[derive(Debug, Clone)]
pub struct TrainParams {
    pub epochs: usize,
    pub learning_rate: f64,
    /// L2 penalty on weights (not bias)
    pub l2: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 0.1,
            l2: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringModel {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub samples: usize,
    pub accuracy: f64,
    /// Of the rows predicted up, the share that went up
    pub precision: f64,
    /// Share of rows labelled up
    pub base_rate: f64,
}

impl ScoringModel {
    /// Fit with batch gradient descent
    pub fn train(samples: &[Sample], params: &TrainParams, symbols: Vec<String>) -> Result<Self> {
        if samples.len() < MIN_TRAINING_SAMPLES {
            return Err(BotError::InsufficientData(format!(
                "need at least {} samples, got {}",
                MIN_TRAINING_SAMPLES,
                samples.len()
            )));
        }

        let n = samples.len() as f64;
        let mut means = vec![0.0; FEATURE_COUNT];
        let mut stds = vec![0.0; FEATURE_COUNT];
        for s in samples {
            for (j, v) in s.features.iter().enumerate() {
                means[j] += v / n;
            }
        }
        for s in samples {
            for (j, v) in s.features.iter().enumerate() {
                stds[j] += (v - means[j]).powi(2) / n;
            }
        }
        for sd in stds.iter_mut() {
            *sd = sd.sqrt();
            if *sd < 1e-12 {
                *sd = 1.0;
            }
        }

        let mut model = Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            weights: vec![0.0; FEATURE_COUNT],
            bias: 0.0,
            means,
            stds,
            trained_at: Utc::now(),
            training_samples: samples.len(),
            symbols,
        };

        let standardized: Vec<(Vec<f64>, f64)> = samples
            .iter()
            .map(|s| (model.standardize(&s.features), if s.label { 1.0 } else { 0.0 }))
            .collect();

        for _ in 0..params.epochs {
            let mut grad_w = vec![0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (x, y) in &standardized {
                let err = sigmoid(model.linear(x)) - y;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi / n;
                }
                grad_b += err / n;
            }
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= params.learning_rate * (g + params.l2 * *w);
            }
            model.bias -= params.learning_rate * grad_b;
        }

        if model.weights.iter().any(|w| !w.is_finite()) || !model.bias.is_finite() {
            return Err(BotError::Model("training diverged".to_string()));
        }

        Ok(model)
    }

    /// Probability that the next close is higher
    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.linear(&self.standardize(features)))
    }

    /// Probability scaled to 0..=100, two decimals
    pub fn score(&self, features: &FeatureVector) -> Decimal {
        Decimal::from_f64(self.predict_proba(features) * 100.0)
            .map(|d| d.round_dp(2))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn evaluate(&self, samples: &[Sample]) -> ModelMetrics {
        if samples.is_empty() {
            return ModelMetrics::default();
        }
        let mut correct = 0usize;
        let mut predicted_up = 0usize;
        let mut true_up = 0usize;
        let mut labelled_up = 0usize;

        for s in samples {
            let up = self.predict_proba(&s.features) >= 0.5;
            if up == s.label {
                correct += 1;
            }
            if up {
                predicted_up += 1;
                if s.label {
                    true_up += 1;
                }
            }
            if s.label {
                labelled_up += 1;
            }
        }

        let n = samples.len() as f64;
        ModelMetrics {
            samples: samples.len(),
            accuracy: correct as f64 / n,
            precision: if predicted_up > 0 {
                true_up as f64 / predicted_up as f64
            } else {
                0.0
            },
            base_rate: labelled_up as f64 / n,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;
        if model.weights.len() != FEATURE_COUNT
            || model.means.len() != FEATURE_COUNT
            || model.stds.len() != FEATURE_COUNT
        {
            return Err(BotError::Model(format!(
                "{} was trained on {} features, expected {}",
                path.display(),
                model.weights.len(),
                FEATURE_COUNT
            )));
        }
        Ok(model)
    }

    fn standardize(&self, features: &FeatureVector) -> Vec<f64> {
        features
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    fn linear(&self, x: &[f64]) -> f64 {
        self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
