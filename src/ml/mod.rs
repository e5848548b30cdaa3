//! Machine learning scoring
//!
//! - Technical feature extraction from daily bars
//! - Logistic regression trained on "next close is higher" labels
//! - Scores in 0..=100 consumed by the entry strategy

pub mod features;
pub mod model;

#[cfg(test)]
mod tests;

pub use features::{FeatureExtractor, FeatureVector, Sample, FEATURE_COUNT, FEATURE_NAMES, LOOKBACK};
pub use model::{ModelMetrics, ScoringModel, TrainParams};
