//! Paper broker
//!
//! Simulated fills against live quotes, with:
//! - Auto-save of the full book on every change
//! - Trade audit trail (JSONL)
//! - Average-in buys and partial sells

#[cfg(test)]
mod tests;

use crate::error::{BotError, Result};
use crate::types::{Position, Side, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Paper broker configuration
#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub initial_capital: Decimal,
    /// State file path (auto-save)
    pub state_file: PathBuf,
    /// Audit log file
    pub audit_file: PathBuf,
    pub auto_save: bool,
}

impl PaperConfig {
    /// Standard file layout under `data_dir`
    pub fn in_dir(data_dir: &Path, initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            state_file: data_dir.join("paper_state.json"),
            audit_file: data_dir.join("trade_audit.jsonl"),
            auto_save: true,
        }
    }
}

/// Paper trading portfolio summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub initial_balance: Decimal,
    pub cash_balance: Decimal,
    /// Open positions at current prices
    pub positions_value: Decimal,
    /// cash + positions
    pub total_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub roi_percent: Decimal,
    /// Closing fills only
    pub trade_count: u32,
    /// Fraction of closing fills with positive P&L
    pub win_rate: Decimal,
    pub open_positions: u32,
    pub updated_at: DateTime<Utc>,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub symbol: String,
    pub shares: u64,
    pub price: Decimal,
    pub pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub reason: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookState {
    initial_capital: Decimal,
    cash: Decimal,
    realized_pnl: Decimal,
    positions: HashMap<String, Position>,
    history: Vec<Trade>,
}

impl BookState {
    fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            realized_pnl: Decimal::ZERO,
            positions: HashMap::new(),
            history: Vec::new(),
        }
    }
}

/// Simulated broker with persistence
pub struct PaperBroker {
    config: PaperConfig,
    state: RwLock<BookState>,
}

impl PaperBroker {
    pub fn new(config: PaperConfig) -> Self {
        let state = BookState::new(config.initial_capital);
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    pub fn config(&self) -> &PaperConfig {
        &self.config
    }

    /// Restore a previous session, if a state file exists
    pub async fn load_state(&self) -> Result<bool> {
        if !self.config.state_file.exists() {
            return Ok(false);
        }
        let json = tokio::fs::read_to_string(&self.config.state_file).await?;
        let loaded: BookState = serde_json::from_str(&json)?;
        info!(
            "Restored paper book: cash ${:.2}, {} open positions, {} fills",
            loaded.cash,
            loaded.positions.len(),
            loaded.history.len()
        );
        *self.state.write().await = loaded;
        Ok(true)
    }

    pub async fn save_state(&self) -> Result<()> {
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)?
        };
        if let Some(parent) = self.config.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.config.state_file, json).await?;
        debug!("Saved paper state to {}", self.config.state_file.display());
        Ok(())
    }

    /// Buy `shares` at `price`; adds to an existing position at the blended price
    pub async fn buy(&self, symbol: &str, price: Decimal, shares: u64, reason: &str) -> Result<Trade> {
        if shares == 0 || price <= Decimal::ZERO {
            return Err(BotError::Execution(format!(
                "Invalid order: {} shares of {} @ {}",
                shares, symbol, price
            )));
        }

        let cost = price * Decimal::from(shares);
        let (trade, balance_before, balance_after) = {
            let mut state = self.state.write().await;
            if cost > state.cash {
                return Err(BotError::Execution(format!(
                    "Insufficient cash: need ${:.2}, have ${:.2}",
                    cost, state.cash
                )));
            }

            let balance_before = state.cash;
            state.cash -= cost;

            let pos = state
                .positions
                .entry(symbol.to_string())
                .or_insert_with(|| Position::open(symbol, 0, price));
            let total = pos.shares + shares;
            pos.avg_entry = (pos.cost_basis() + cost) / Decimal::from(total);
            pos.shares = total;
            pos.mark(price);

            let trade = Trade::new(symbol, Side::Buy, shares, price, reason);
            state.history.push(trade.clone());
            (trade, balance_before, state.cash)
        };

        info!("📝 PAPER BUY {} x{} @ ${:.2} ({})", symbol, shares, price, reason);
        self.after_fill(&trade, balance_before, balance_after).await?;
        Ok(trade)
    }

    /// Sell up to `shares` of `symbol` at `price`; `None` sells everything
    pub async fn sell(
        &self,
        symbol: &str,
        price: Decimal,
        shares: Option<u64>,
        reason: &str,
    ) -> Result<Trade> {
        let (trade, balance_before, balance_after) = {
            let mut state = self.state.write().await;
            let pos = state
                .positions
                .get_mut(symbol)
                .ok_or_else(|| BotError::PositionNotFound(symbol.to_string()))?;

            let qty = shares.unwrap_or(pos.shares).min(pos.shares);
            if qty == 0 {
                return Err(BotError::Execution(format!("Nothing to sell for {}", symbol)));
            }

            let pnl = (price - pos.avg_entry) * Decimal::from(qty);
            pos.shares -= qty;
            pos.mark(price);
            let closed = pos.shares == 0;
            if closed {
                state.positions.remove(symbol);
            }

            let balance_before = state.cash;
            state.cash += price * Decimal::from(qty);
            state.realized_pnl += pnl;

            let trade = Trade::new(symbol, Side::Sell, qty, price, reason).with_pnl(pnl);
            state.history.push(trade.clone());
            (trade, balance_before, state.cash)
        };

        info!(
            "📝 PAPER SELL {} x{} @ ${:.2} P&L ${:.2} ({})",
            symbol,
            trade.shares,
            price,
            trade.pnl.unwrap_or_default(),
            reason
        );
        self.after_fill(&trade, balance_before, balance_after).await?;
        Ok(trade)
    }

    /// Update a position's price and high-water mark
    pub async fn mark(&self, symbol: &str, price: Decimal) -> Result<()> {
        let mut state = self.state.write().await;
        let pos = state
            .positions
            .get_mut(symbol)
            .ok_or_else(|| BotError::PositionNotFound(symbol.to_string()))?;
        pos.mark(price);
        Ok(())
    }

    /// Flag the first profit target as taken for `symbol`
    pub async fn set_first_target_taken(&self, symbol: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let pos = state
                .positions
                .get_mut(symbol)
                .ok_or_else(|| BotError::PositionNotFound(symbol.to_string()))?;
            pos.tp1_taken = true;
        }
        if self.config.auto_save {
            self.save_state().await?;
        }
        Ok(())
    }

    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.state.read().await.positions.get(symbol).cloned()
    }

    /// Open positions sorted by symbol
    pub async fn positions(&self) -> Vec<Position> {
        let state = self.state.read().await;
        let mut positions: Vec<Position> = state.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub async fn history(&self) -> Vec<Trade> {
        self.state.read().await.history.clone()
    }

    pub async fn cash(&self) -> Decimal {
        self.state.read().await.cash
    }

    /// Cost basis of all open positions
    pub async fn exposure(&self) -> Decimal {
        let state = self.state.read().await;
        state.positions.values().map(|p| p.cost_basis()).sum()
    }

    pub async fn equity(&self) -> Decimal {
        let state = self.state.read().await;
        state.cash + state.positions.values().map(|p| p.market_value()).sum::<Decimal>()
    }

    pub async fn summary(&self) -> PortfolioSummary {
        let state = self.state.read().await;
        let positions_value: Decimal = state.positions.values().map(|p| p.market_value()).sum();
        let unrealized_pnl: Decimal = state.positions.values().map(|p| p.unrealized_pnl()).sum();
        let total_value = state.cash + positions_value;
        let total_pnl = state.realized_pnl + unrealized_pnl;

        let closes: Vec<&Trade> = state.history.iter().filter(|t| t.pnl.is_some()).collect();
        let wins = closes.iter().filter(|t| t.is_win()).count();
        let win_rate = if closes.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(wins as u64) / Decimal::from(closes.len() as u64)
        };

        let roi_percent = if state.initial_capital > Decimal::ZERO {
            (total_value - state.initial_capital) / state.initial_capital * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        PortfolioSummary {
            initial_balance: state.initial_capital,
            cash_balance: state.cash,
            positions_value,
            total_value,
            realized_pnl: state.realized_pnl,
            unrealized_pnl,
            total_pnl,
            roi_percent: roi_percent.round_dp(2),
            trade_count: closes.len() as u32,
            win_rate: win_rate.round_dp(4),
            open_positions: state.positions.len() as u32,
            updated_at: Utc::now(),
        }
    }

    async fn after_fill(&self, trade: &Trade, balance_before: Decimal, balance_after: Decimal) -> Result<()> {
        if self.config.auto_save {
            self.save_state().await?;
        }

        let pnl_pct = match trade.pnl {
            Some(pnl) if trade.value > Decimal::ZERO => {
                let cost = trade.value - pnl;
                (cost > Decimal::ZERO).then(|| (pnl / cost * Decimal::ONE_HUNDRED).round_dp(2))
            }
            _ => None,
        };

        self.log_audit(AuditEntry {
            timestamp: trade.timestamp,
            action: trade.side.to_string(),
            symbol: trade.symbol.clone(),
            shares: trade.shares,
            price: trade.price,
            pnl: trade.pnl,
            pnl_pct,
            reason: trade.reason.clone(),
            balance_before,
            balance_after,
        })
        .await
    }

    /// Append an audit entry to the JSONL file
    async fn log_audit(&self, entry: AuditEntry) -> Result<()> {
        if let Some(parent) = self.config.audit_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.audit_file)
            .await?;

        let line = serde_json::to_string(&entry)?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;

        debug!("Logged audit entry: {} {}", entry.action, entry.symbol);
        Ok(())
    }
}

