//! Automated US equities trading system
//!
//! ```text
//! QuoteSource (Yahoo) ─┐
//! NewsClient ──────────┼─> SignalGenerator (ScoringModel) ─> RiskManager ─> PaperBroker
//!                      │                                                        │
//! MarketClock ─────────┘        Notifier / TelegramBot <── TradingSystem ──> Database, StatusState
//! ```
//!
//! `TradingSystem` in [`engine`] owns the loop; everything else is a
//! building block that can be used and tested on its own.

pub mod backtest;
pub mod client;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod health;
pub mod logging;
pub mod market;
pub mod ml;
pub mod monitor;
pub mod notify;
pub mod paper;
pub mod risk;
pub mod storage;
pub mod strategy;
pub mod telegram;
pub mod types;

#[cfg(test)]
mod types_tests;
