//! Entry signal generation
//!
//! A symbol becomes a candidate when its model score clears the configured
//! threshold and the price, volume and reward/risk filters pass.

pub mod scanner;

#[cfg(test)]
mod tests;

pub use scanner::{Candidate, CandidateSource, MarketScanner, MarketSnapshot};

use crate::config::{RiskConfig, TradingConfig};
use crate::ml::{FeatureExtractor, ScoringModel};
use crate::types::{Bar, Quote};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Long entry candidate with its exit levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub price: Decimal,
    /// Model score, 0-100
    pub score: Decimal,
    pub stop_loss: Decimal,
    pub take_profit_1: Decimal,
    pub take_profit_2: Decimal,
    pub risk_reward: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Why a symbol was not taken
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    PriceOutOfRange(Decimal),
    LowVolume(u64),
    NotEnoughHistory(usize),
    ScoreBelowThreshold(Decimal),
    RiskRewardTooLow(Decimal),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::PriceOutOfRange(p) => write!(f, "price {} outside allowed band", p),
            SkipReason::LowVolume(v) => write!(f, "volume {} below minimum", v),
            SkipReason::NotEnoughHistory(n) => write!(f, "only {} bars of history", n),
            SkipReason::ScoreBelowThreshold(s) => write!(f, "score {:.1} below threshold", s),
            SkipReason::RiskRewardTooLow(rr) => write!(f, "reward/risk {:.2} too low", rr),
        }
    }
}

/// Signal generator based on model scores
pub struct SignalGenerator {
    config: TradingConfig,
    risk_config: RiskConfig,
    extractor: FeatureExtractor,
}

impl SignalGenerator {
    pub fn new(config: TradingConfig, risk_config: RiskConfig) -> Self {
        Self {
            config,
            risk_config,
            extractor: FeatureExtractor::default(),
        }
    }

    /// Entry signal, if every filter passes
    pub fn evaluate(&self, quote: &Quote, bars: &[Bar], model: &ScoringModel) -> Option<Signal> {
        self.check(quote, bars, model).ok()
    }

    /// Like `evaluate`, but reports the first failed filter
    pub fn check(
        &self,
        quote: &Quote,
        bars: &[Bar],
        model: &ScoringModel,
    ) -> Result<Signal, SkipReason> {
        let price = quote.price;
        if price < self.config.min_stock_price || price > self.config.max_stock_price {
            return Err(SkipReason::PriceOutOfRange(price));
        }
        if quote.volume < self.config.min_volume {
            return Err(SkipReason::LowVolume(quote.volume));
        }

        let features = self
            .extractor
            .latest(bars)
            .ok_or(SkipReason::NotEnoughHistory(bars.len()))?;
        let score = model.score(&features);
        if score < self.config.min_ml_score_threshold {
            return Err(SkipReason::ScoreBelowThreshold(score));
        }

        self.build_signal(&quote.symbol, price, score, quote.timestamp)
    }

    /// Exit levels for an entry at `price`
    pub fn build_signal(
        &self,
        symbol: &str,
        price: Decimal,
        score: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Signal, SkipReason> {
        let risk = &self.risk_config;
        let stop_loss = price * (Decimal::ONE - risk.stop_loss_percentage);
        let take_profit_1 = price * (Decimal::ONE + risk.take_profit_1_percentage);
        let take_profit_2 = price * (Decimal::ONE + risk.take_profit_2_percentage);

        let downside = price - stop_loss;
        let risk_reward = if downside > Decimal::ZERO {
            ((take_profit_2 - price) / downside).round_dp(2)
        } else {
            Decimal::ZERO
        };
        if risk_reward < self.config.min_risk_reward_ratio {
            return Err(SkipReason::RiskRewardTooLow(risk_reward));
        }

        Ok(Signal {
            symbol: symbol.to_string(),
            price,
            score,
            stop_loss: stop_loss.round_dp(4),
            take_profit_1: take_profit_1.round_dp(4),
            take_profit_2: take_profit_2.round_dp(4),
            risk_reward,
            timestamp,
        })
    }

    pub fn threshold(&self) -> Decimal {
        self.config.min_ml_score_threshold
    }
}
