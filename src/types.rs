//! Core domain types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest price snapshot for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    /// Shares traded in the current session
    pub volume: u64,
    /// Change vs previous close, as a fraction
    pub change_pct: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// Executed fill (paper or live)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub shares: u64,
    pub price: Decimal,
    /// shares * price
    pub value: Decimal,
    /// Realized P&L, sells only
    pub pnl: Option<Decimal>,
    pub reason: String,
    pub paper: bool,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn new(symbol: &str, side: Side, shares: u64, price: Decimal, reason: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            shares,
            price,
            value: price * Decimal::from(shares),
            pnl: None,
            reason: reason.to_string(),
            paper: true,
            timestamp: Utc::now(),
        }
    }

    pub fn with_pnl(mut self, pnl: Decimal) -> Self {
        self.pnl = Some(pnl);
        self
    }

    pub fn is_win(&self) -> bool {
        self.pnl.map(|p| p > Decimal::ZERO).unwrap_or(false)
    }
}

/// Normalize a ticker as typed by a user ("aapl " -> "AAPL")
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    valid.then_some(symbol)
}

/// Open long position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: u64,
    pub avg_entry: Decimal,
    pub current_price: Decimal,
    /// Highest price seen since entry, drives the trailing stop
    pub high_water: Decimal,
    /// First target already taken
    pub tp1_taken: bool,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn open(symbol: &str, shares: u64, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            shares,
            avg_entry: price,
            current_price: price,
            high_water: price,
            tp1_taken: false,
            opened_at: Utc::now(),
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        self.avg_entry * Decimal::from(self.shares)
    }

    pub fn market_value(&self) -> Decimal {
        self.current_price * Decimal::from(self.shares)
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.avg_entry) * Decimal::from(self.shares)
    }

    /// Unrealized return as a fraction of entry
    pub fn return_pct(&self) -> Decimal {
        if self.avg_entry.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_price - self.avg_entry) / self.avg_entry
    }

    /// Record a new price, raising the high-water mark when exceeded
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        if price > self.high_water {
            self.high_water = price;
        }
    }
}
