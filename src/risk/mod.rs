//! Position sizing, entry limits and exit rules


use crate::config::RiskConfig;
use crate::error::{BotError, Result};
use crate::types::Position;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit1,
    TakeProfit2,
    MarketClose,
    Emergency,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit1 => "take_profit_1",
            ExitReason::TakeProfit2 => "take_profit_2",
            ExitReason::MarketClose => "market_close",
            ExitReason::Emergency => "emergency",
            ExitReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shares to sell and why
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    pub shares: u64,
}

/// Why new entries are blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Cleared by `reset_day`
    DailyLoss,
    ConsecutiveLosses,
    /// Cleared only by `resume`
    Drawdown,
    Manual,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HaltReason::DailyLoss => "daily loss limit reached",
            HaltReason::ConsecutiveLosses => "consecutive loss limit reached",
            HaltReason::Drawdown => "max drawdown breached",
            HaltReason::Manual => "halted by operator",
        };
        f.write_str(s)
    }
}

/// Counters that reset at the start of each trading day
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyRiskState {
    pub trades_today: u32,
    pub realized_pnl_today: Decimal,
    pub consecutive_losses: u32,
}

pub struct RiskManager {
    config: RiskConfig,
    max_daily_trades: u32,
    daily: DailyRiskState,
    peak_equity: Decimal,
    halted: Option<HaltReason>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, max_daily_trades: u32, starting_equity: Decimal) -> Self {
        Self {
            config,
            max_daily_trades,
            daily: DailyRiskState::default(),
            peak_equity: starting_equity,
            halted: None,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn daily(&self) -> &DailyRiskState {
        &self.daily
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn halted(&self) -> Option<&HaltReason> {
        self.halted.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Whole shares to buy at `price`
    ///
    /// Risk budget is `equity * risk_per_trade` lost at the stop, capped at
    /// `max_position_size_usd` notional.
    pub fn position_size(&self, equity: Decimal, price: Decimal) -> u64 {
        if price <= Decimal::ZERO || equity <= Decimal::ZERO {
            return 0;
        }
        let by_risk =
            equity * self.config.risk_per_trade_percentage / self.config.stop_loss_percentage;
        let notional = by_risk.min(self.config.max_position_size_usd);
        let shares = (notional / price).floor();
        shares.to_u64().unwrap_or(0)
    }

    /// Check all entry limits for a new position of `notional` dollars
    pub fn check_entry(
        &self,
        symbol: &str,
        notional: Decimal,
        exposure: Decimal,
        equity: Decimal,
    ) -> Result<()> {
        if let Some(reason) = &self.halted {
            return Err(BotError::RiskLimit(format!("Trading halted: {}", reason)));
        }

        if self.daily.trades_today >= self.max_daily_trades {
            return Err(BotError::RiskLimit(format!(
                "Daily trade limit ({}) reached",
                self.max_daily_trades
            )));
        }

        if self.daily.consecutive_losses >= self.config.consecutive_loss_limit {
            return Err(BotError::RiskLimit(format!(
                "{} consecutive losses",
                self.daily.consecutive_losses
            )));
        }

        let max_daily_loss = self.config.max_daily_risk_percentage * equity;
        if -self.daily.realized_pnl_today >= max_daily_loss {
            return Err(BotError::RiskLimit(format!(
                "Daily loss limit exceeded: {:.2}",
                self.daily.realized_pnl_today
            )));
        }

        let drawdown = self.drawdown(equity);
        if drawdown >= self.config.max_drawdown_percentage {
            return Err(BotError::RiskLimit(format!(
                "Drawdown {:.2}% at or above limit",
                drawdown * Decimal::ONE_HUNDRED
            )));
        }

        if notional > self.config.max_position_size_usd {
            return Err(BotError::RiskLimit(format!(
                "Position {} ${:.2} exceeds max ${:.2}",
                symbol, notional, self.config.max_position_size_usd
            )));
        }

        let new_exposure = exposure + notional;
        if new_exposure > self.config.max_total_exposure_usd {
            return Err(BotError::RiskLimit(format!(
                "Max exposure exceeded: {:.2} > {:.2}",
                new_exposure, self.config.max_total_exposure_usd
            )));
        }

        Ok(())
    }

    /// First exit rule that fires for `position` at `price`
    pub fn evaluate_exit(&self, position: &Position, price: Decimal) -> Option<ExitSignal> {
        if position.shares == 0 {
            return None;
        }
        let entry = position.avg_entry;
        let cfg = &self.config;
        let all = position.shares;

        if price <= entry * (Decimal::ONE - cfg.stop_loss_percentage) {
            return Some(ExitSignal { reason: ExitReason::StopLoss, shares: all });
        }

        let high = position.high_water.max(price);
        let armed = high >= entry * (Decimal::ONE + cfg.trailing_stop_trigger);
        if armed && price <= high * (Decimal::ONE - cfg.trailing_stop_percentage) {
            return Some(ExitSignal { reason: ExitReason::TrailingStop, shares: all });
        }

        if price >= entry * (Decimal::ONE + cfg.take_profit_2_percentage) {
            return Some(ExitSignal { reason: ExitReason::TakeProfit2, shares: all });
        }

        if !position.tp1_taken && price >= entry * (Decimal::ONE + cfg.take_profit_1_percentage) {
            // a single share is sold outright
            let half = (all / 2).max(1);
            return Some(ExitSignal { reason: ExitReason::TakeProfit1, shares: half });
        }

        None
    }

    pub fn record_entry(&mut self) {
        self.daily.trades_today += 1;
    }

    /// Book a closed trade's realized P&L
    pub fn record_close(&mut self, pnl: Decimal, equity: Decimal) {
        self.daily.realized_pnl_today += pnl;
        if pnl < Decimal::ZERO {
            self.daily.consecutive_losses += 1;
        } else if pnl > Decimal::ZERO {
            self.daily.consecutive_losses = 0;
        }

        if self.halted.is_none() {
            if self.daily.consecutive_losses >= self.config.consecutive_loss_limit {
                tracing::warn!("Consecutive loss limit hit, halting new entries");
                self.halted = Some(HaltReason::ConsecutiveLosses);
            } else if -self.daily.realized_pnl_today >= self.config.max_daily_risk_percentage * equity
            {
                tracing::warn!(
                    "Daily loss {:.2} hit limit, halting new entries",
                    self.daily.realized_pnl_today
                );
                self.halted = Some(HaltReason::DailyLoss);
            }
        }
    }

    /// Drawdown from peak as a fraction
    pub fn drawdown(&self, equity: Decimal) -> Decimal {
        if self.peak_equity <= Decimal::ZERO || equity >= self.peak_equity {
            return Decimal::ZERO;
        }
        (self.peak_equity - equity) / self.peak_equity
    }

    /// Track equity; true when the drawdown limit is freshly breached
    pub fn update_equity(&mut self, equity: Decimal) -> bool {
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        if self.drawdown(equity) >= self.config.max_drawdown_percentage
            && self.halted != Some(HaltReason::Drawdown)
        {
            tracing::error!(
                "Drawdown limit breached: equity {:.2}, peak {:.2}",
                equity,
                self.peak_equity
            );
            self.halted = Some(HaltReason::Drawdown);
            return true;
        }
        false
    }

    /// Start a new trading day. Drawdown and manual halts survive.
    pub fn reset_day(&mut self) {
        self.daily = DailyRiskState::default();
        if matches!(
            self.halted,
            Some(HaltReason::DailyLoss) | Some(HaltReason::ConsecutiveLosses)
        ) {
            self.halted = None;
        }
    }

    pub fn halt(&mut self, reason: HaltReason) {
        self.halted = Some(reason);
    }

    /// Clear any halt and re-base the peak at `equity`
    pub fn resume(&mut self, equity: Decimal) {
        self.halted = None;
        self.daily.consecutive_losses = 0;
        self.peak_equity = equity;
    }
}
