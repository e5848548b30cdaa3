//! Trade history persistence (SQLite)
//!
//! Money values are stored as decimal strings so they round-trip exactly.

#[cfg(test)]
mod tests;

use crate::error::{BotError, Result};
use crate::types::{Side, Trade};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::str::FromStr;

pub struct Database {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TradeRow {
    id: String,
    symbol: String,
    side: String,
    shares: i64,
    price: String,
    value: String,
    pnl: Option<String>,
    reason: String,
    paper: bool,
    executed_at: String,
}

impl TryFrom<TradeRow> for Trade {
    type Error = BotError;

    fn try_from(row: TradeRow) -> Result<Self> {
        let side = Side::from_str(&row.side).map_err(BotError::Internal)?;
        let timestamp = DateTime::parse_from_rfc3339(&row.executed_at)
            .map_err(|e| BotError::Internal(format!("Bad timestamp {}: {}", row.executed_at, e)))?
            .with_timezone(&Utc);
        Ok(Trade {
            id: row.id,
            symbol: row.symbol,
            side,
            shares: u64::try_from(row.shares).unwrap_or(0),
            price: parse_decimal(&row.price)?,
            value: parse_decimal(&row.value)?,
            pnl: row.pnl.as_deref().map(parse_decimal).transpose()?,
            reason: row.reason,
            paper: row.paper,
            timestamp,
        })
    }
}

/// Aggregates for one UTC calendar day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub trades: u32,
    pub buys: u32,
    pub sells: u32,
    pub wins: u32,
    pub losses: u32,
    pub realized_pnl: Decimal,
    /// Gross traded value
    pub volume: Decimal,
}

impl Database {
    /// Open (creating if needed) and migrate
    pub async fn connect(database_url: &str) -> Result<Self> {
        // every pooled connection to :memory: would see its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::info!("Connected to trade database");
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                shares INTEGER NOT NULL,
                price TEXT NOT NULL,
                value TEXT NOT NULL,
                pnl TEXT,
                reason TEXT NOT NULL,
                paper INTEGER NOT NULL DEFAULT 1,
                executed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_executed_at ON trades(executed_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn save_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO trades
                (id, symbol, side, shares, price, value, pnl, reason, paper, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(i64::try_from(trade.shares).unwrap_or(i64::MAX))
        .bind(trade.price.to_string())
        .bind(trade.value.to_string())
        .bind(trade.pnl.map(|p| p.to_string()))
        .bind(&trade.reason)
        .bind(trade.paper)
        .bind(timestamp_key(trade.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Newest first
    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<Trade>> {
        let rows: Vec<TradeRow> =
            sqlx::query_as("SELECT * FROM trades ORDER BY executed_at DESC LIMIT ?")
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    /// Trades in `[from, to)`, oldest first
    pub async fn trades_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Trade>> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            "SELECT * FROM trades WHERE executed_at >= ? AND executed_at < ? ORDER BY executed_at ASC",
        )
        .bind(timestamp_key(from))
        .bind(timestamp_key(to))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    pub async fn daily_stats(&self, day: NaiveDate) -> Result<DailyStats> {
        let start = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end = start + chrono::Duration::days(1);
        let trades = self.trades_between(start, end).await?;

        let mut stats = DailyStats {
            day,
            ..Default::default()
        };
        for trade in &trades {
            stats.trades += 1;
            stats.volume += trade.value;
            match trade.side {
                Side::Buy => stats.buys += 1,
                Side::Sell => stats.sells += 1,
            }
            if let Some(pnl) = trade.pnl {
                stats.realized_pnl += pnl;
                if pnl > Decimal::ZERO {
                    stats.wins += 1;
                } else if pnl < Decimal::ZERO {
                    stats.losses += 1;
                }
            }
        }
        Ok(stats)
    }

    pub async fn trade_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Fixed-width UTC timestamp so text ordering matches time ordering
fn timestamp_key(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| BotError::Internal(format!("Bad decimal {}: {}", raw, e)))
}
