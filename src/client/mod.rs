//! Market data and news clients

pub mod news;
pub mod yahoo;

pub use news::{NewsClient, Sentiment};
pub use yahoo::YahooClient;

use crate::error::Result;
use crate::types::{Bar, Quote};
use async_trait::async_trait;

/// Source of live quotes and daily history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Latest quote for a symbol
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Daily bars covering roughly the last `days` calendar days, oldest first
    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<Bar>>;
}
