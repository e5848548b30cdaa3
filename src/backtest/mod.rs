//! Historical replay of the entry and exit rules
//!
//! Bars are walked oldest first. Entries fill at the close of the signal
//! bar. While a position is open, each bar is checked against the stop
//! rules at its low first, then against the targets at its high. Exits fill
//! at the rule's level, or at the open when the bar gaps through it.

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{BotError, Result};
use crate::ml::ScoringModel;
use crate::monitor::PerformanceStats;
use crate::risk::{ExitReason, ExitSignal, RiskManager};
use crate::strategy::SignalGenerator;
use crate::types::{Bar, Position, Quote, Side, Trade};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Reason recorded on the fill that closes a position at the last bar
pub const END_OF_DATA: &str = "end_of_backtest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bars: usize,
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    /// Percent, e.g. 12.5 for +12.5%
    pub return_pct: Decimal,
    pub trades: Vec<Trade>,
    pub stats: PerformanceStats,
}

impl BacktestResult {
    /// `backtest_{SYMBOL}_{start}_{end}`
    pub fn report_name(&self) -> String {
        format!(
            "backtest_{}_{}_{}",
            self.symbol,
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

pub struct Backtester;

impl Backtester {
    /// Replay `bars` for `symbol` with the configured strategy and risk rules
    pub fn run(symbol: &str, bars: &[Bar], model: &ScoringModel, config: &Config) -> Result<BacktestResult> {
        let (first, last) = match (bars.first(), bars.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return Err(BotError::InsufficientData(format!("no bars for {}", symbol))),
        };

        let initial = config.trading.initial_capital;
        let signals = SignalGenerator::new(config.trading.clone(), config.risk_management.clone());
        let mut risk = RiskManager::new(
            config.risk_management.clone(),
            config.trading.max_daily_trades,
            initial,
        );
        let mut book = Book::new(initial);

        for (i, bar) in bars.iter().enumerate() {
            risk.reset_day();
            let when = bar_time(bar.date);

            if let Some(pos) = book.position.clone() {
                let (low, high, open) = (dec(bar.low)?, dec(bar.high)?, dec(bar.open)?);
                let exit = stop_exit(&risk, &pos, low).or_else(|| target_exit(&risk, &pos, high));
                if let Some(exit) = exit {
                    let price = fill_price(&risk, &pos, exit.reason, open);
                    if let Some(trade) = book.sell(exit.shares, price, exit.reason.as_str(), when) {
                        debug!(
                            "{} {} {} x{} @ {:.2}",
                            bar.date, exit.reason, symbol, trade.shares, trade.price
                        );
                        risk.record_close(trade.pnl.unwrap_or_default(), book.equity());
                    }
                    if exit.reason == ExitReason::TakeProfit1 {
                        if let Some(pos) = book.position.as_mut() {
                            pos.tp1_taken = true;
                        }
                    }
                }
            }

            let close = dec(bar.close)?;
            if let Some(pos) = book.position.as_mut() {
                pos.mark(close);
            }
            risk.update_equity(book.equity());

            if book.position.is_none() {
                let quote = Quote {
                    symbol: symbol.to_string(),
                    price: close,
                    volume: bar.volume.max(0.0) as u64,
                    change_pct: Decimal::ZERO,
                    timestamp: when,
                };
                let Ok(signal) = signals.check(&quote, &bars[..=i], model) else {
                    continue;
                };
                let equity = book.equity();
                let shares = risk.position_size(equity, close);
                if shares == 0 {
                    continue;
                }
                let notional = close * Decimal::from(shares);
                if risk.check_entry(symbol, notional, Decimal::ZERO, equity).is_err() {
                    continue;
                }
                if notional > book.cash {
                    continue;
                }
                let reason = format!("signal score {:.1}", signal.score);
                book.buy(symbol, shares, close, &reason, when);
                risk.record_entry();
            }
        }

        if let Some(pos) = book.position.clone() {
            book.sell(pos.shares, pos.current_price, END_OF_DATA, bar_time(last));
        }

        let final_equity = book.equity();
        let return_pct = if initial.is_zero() {
            Decimal::ZERO
        } else {
            ((final_equity - initial) / initial * Decimal::ONE_HUNDRED).round_dp(2)
        };
        let stats = PerformanceStats::from_trades(&book.trades);
        info!(
            "Backtest {} {}..{}: {} closed trades, return {}%",
            symbol, first, last, stats.total_trades, return_pct
        );

        Ok(BacktestResult {
            symbol: symbol.to_uppercase(),
            start: first,
            end: last,
            bars: bars.len(),
            initial_capital: initial,
            final_equity,
            return_pct,
            trades: book.trades,
            stats,
        })
    }
}

/// Single-position cash book
struct Book {
    cash: Decimal,
    position: Option<Position>,
    trades: Vec<Trade>,
}

impl Book {
    fn new(cash: Decimal) -> Self {
        Self { cash, position: None, trades: Vec::new() }
    }

    fn equity(&self) -> Decimal {
        self.cash + self.position.as_ref().map_or(Decimal::ZERO, |p| p.market_value())
    }

    fn buy(&mut self, symbol: &str, shares: u64, price: Decimal, reason: &str, when: DateTime<Utc>) {
        let mut trade = Trade::new(symbol, Side::Buy, shares, price, reason);
        trade.timestamp = when;
        self.cash -= trade.value;
        let mut pos = Position::open(symbol, shares, price);
        pos.opened_at = when;
        self.position = Some(pos);
        self.trades.push(trade);
    }

    fn sell(&mut self, shares: u64, price: Decimal, reason: &str, when: DateTime<Utc>) -> Option<Trade> {
        let pos = self.position.as_mut()?;
        let shares = shares.min(pos.shares);
        let pnl = (price - pos.avg_entry) * Decimal::from(shares);
        let mut trade = Trade::new(&pos.symbol, Side::Sell, shares, price, reason).with_pnl(pnl);
        trade.timestamp = when;

        self.cash += trade.value;
        pos.shares -= shares;
        pos.current_price = price;
        if pos.shares == 0 {
            self.position = None;
        }
        self.trades.push(trade.clone());
        Some(trade)
    }
}

fn stop_exit(risk: &RiskManager, pos: &Position, low: Decimal) -> Option<ExitSignal> {
    risk.evaluate_exit(pos, low)
        .filter(|e| matches!(e.reason, ExitReason::StopLoss | ExitReason::TrailingStop))
}

fn target_exit(risk: &RiskManager, pos: &Position, high: Decimal) -> Option<ExitSignal> {
    risk.evaluate_exit(pos, high)
        .filter(|e| matches!(e.reason, ExitReason::TakeProfit1 | ExitReason::TakeProfit2))
}

/// Rule level for `reason`, adjusted for a gap at the open
fn fill_price(risk: &RiskManager, pos: &Position, reason: ExitReason, open: Decimal) -> Decimal {
    let cfg = risk.config();
    let entry = pos.avg_entry;
    let level = match reason {
        ExitReason::StopLoss => entry * (Decimal::ONE - cfg.stop_loss_percentage),
        ExitReason::TrailingStop => pos.high_water * (Decimal::ONE - cfg.trailing_stop_percentage),
        ExitReason::TakeProfit1 => entry * (Decimal::ONE + cfg.take_profit_1_percentage),
        ExitReason::TakeProfit2 => entry * (Decimal::ONE + cfg.take_profit_2_percentage),
        _ => open,
    };
    let price = match reason {
        ExitReason::StopLoss | ExitReason::TrailingStop => level.min(open),
        _ => level.max(open),
    };
    price.round_dp(4)
}

fn dec(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(4))
        .ok_or_else(|| BotError::InsufficientData(format!("unrepresentable price {}", value)))
}

/// Fills on a bar are stamped 20:00 UTC of its date
fn bar_time(date: NaiveDate) -> DateTime<Utc> {
    (date.and_time(NaiveTime::MIN) + chrono::Duration::hours(20)).and_utc()
}
