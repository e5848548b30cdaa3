//! Performance tracking, daily reports and the status API

pub mod status;

pub use status::{create_router, start_status_server, StatusSnapshot, StatusState, MAX_RECENT_TRADES};


use crate::error::Result;
use crate::paper::PortfolioSummary;
use crate::types::Trade;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Statistics over closing trades (those with realized P&L)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// 0-1
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub avg_pnl_per_trade: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    /// None when there are no losses
    pub profit_factor: Option<Decimal>,
    /// Largest peak-to-trough drop of cumulative P&L, in dollars
    pub max_drawdown: Decimal,
    /// Mean over sample std of per-trade P&L; None under 2 trades
    pub sharpe_ratio: Option<Decimal>,
}

impl PerformanceStats {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let pnls: Vec<Decimal> = trades.iter().filter_map(|t| t.pnl).collect();
        Self::from_pnls(&pnls)
    }

    pub fn from_pnls(pnls: &[Decimal]) -> Self {
        let total_trades = pnls.len();
        if total_trades == 0 {
            return Self::default();
        }

        let mut stats = Self {
            total_trades,
            ..Default::default()
        };

        let mut cumulative = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        for &pnl in pnls {
            if pnl > Decimal::ZERO {
                stats.winning_trades += 1;
                stats.gross_profit += pnl;
            } else if pnl < Decimal::ZERO {
                stats.losing_trades += 1;
                stats.gross_loss += pnl.abs();
            }
            cumulative += pnl;
            peak = peak.max(cumulative);
            stats.max_drawdown = stats.max_drawdown.max(peak - cumulative);
        }

        let n = Decimal::from(total_trades as u64);
        stats.total_pnl = cumulative;
        stats.win_rate = (Decimal::from(stats.winning_trades as u64) / n).round_dp(4);
        stats.avg_pnl_per_trade = (cumulative / n).round_dp(2);
        stats.profit_factor = (stats.gross_loss > Decimal::ZERO)
            .then(|| (stats.gross_profit / stats.gross_loss).round_dp(2));
        stats.sharpe_ratio = sharpe(pnls);
        stats
    }
}

fn sharpe(pnls: &[Decimal]) -> Option<Decimal> {
    if pnls.len() < 2 {
        return None;
    }
    let n = Decimal::from(pnls.len() as u64);
    let mean = pnls.iter().sum::<Decimal>() / n;
    let variance = pnls
        .iter()
        .map(|p| (*p - mean) * (*p - mean))
        .sum::<Decimal>()
        / (n - Decimal::ONE);
    let std_dev = variance.sqrt()?;
    (std_dev > Decimal::ZERO).then(|| (mean / std_dev).round_dp(4))
}

/// End-of-day report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub portfolio: PortfolioSummary,
    pub performance: PerformanceStats,
    pub trades: Vec<Trade>,
}

/// Writes JSON reports under the reports directory
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn daily_path(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("daily_{}.json", day.format("%Y-%m-%d")))
    }

    /// `reports/daily_YYYY-MM-DD.json`
    pub async fn write_daily(
        &self,
        day: NaiveDate,
        portfolio: &PortfolioSummary,
        trades: &[Trade],
    ) -> Result<PathBuf> {
        let report = DailyReport {
            date: day,
            generated_at: Utc::now(),
            portfolio: portfolio.clone(),
            performance: PerformanceStats::from_trades(trades),
            trades: trades.to_vec(),
        };
        let path = self.daily_path(day);
        self.write_json(&path, &report).await?;
        tracing::info!("📊 Daily report written to {}", path.display());
        Ok(path)
    }

    /// Serialize `value` to `<dir>/<name>`
    pub async fn write_named<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        self.write_json(&path, value).await?;
        Ok(path)
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
