//! Telegram notifications
//!
//! Messages use HTML parse mode. Without credentials the notifier only logs.


use crate::config::{Config, NotificationConfig, TelegramCredentials};
use crate::error::{BotError, Result};
use crate::monitor::PerformanceStats;
use crate::paper::PortfolioSummary;
use crate::types::{Position, Trade};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Clone)]
pub struct Notifier {
    http: Client,
    api_base: String,
    credentials: Option<TelegramCredentials>,
    settings: NotificationConfig,
}

impl Notifier {
    pub fn new(config: &Config) -> Self {
        Self::with_api_base(config, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(config: &Config, api_base: &str) -> Self {
        let credentials = config.telegram();
        if credentials.is_none() {
            tracing::warn!("Telegram not configured, notifications will only be logged");
        }
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            settings: config.notifications.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Send to the main chat
    pub async fn send(&self, text: &str) -> Result<()> {
        match &self.credentials {
            Some(creds) => self.send_to(&creds.chat_id, text).await,
            None => {
                tracing::info!("[notify disabled] {}", text);
                Ok(())
            }
        }
    }

    /// Send to the critical chat (falls back to the main chat)
    pub async fn send_critical(&self, text: &str) -> Result<()> {
        match &self.credentials {
            Some(creds) => self.send_to(&creds.critical_chat_id, text).await,
            None => {
                tracing::warn!("[notify disabled] {}", text);
                Ok(())
            }
        }
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<()> {
        let Some(creds) = &self.credentials else {
            return Ok(());
        };
        let url = format!("{}/bot{}/sendMessage", self.api_base, creds.bot_token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
        };

        let attempts = self.settings.notification_retry_attempts.max(1);
        let delay = Duration::from_secs(self.settings.notification_retry_delay);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.http.post(&url).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => last_error = format!("HTTP {}", resp.status()),
                Err(e) => last_error = e.to_string(),
            }
            tracing::warn!(
                "Telegram send failed (attempt {}/{}): {}",
                attempt,
                attempts,
                last_error
            );
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Err(BotError::Notification(last_error))
    }

    /// Log a failed send; notifications never stop trading
    async fn deliver(&self, text: &str) {
        if let Err(e) = self.send(text).await {
            tracing::warn!("Notification dropped: {}", e);
        }
    }

    pub async fn startup(&self, paper_trading: bool, started_at: DateTime<Utc>) {
        self.deliver(&format_startup(paper_trading, started_at)).await;
    }

    pub async fn shutdown(&self, reason: &str, summary: Option<&PortfolioSummary>) {
        self.deliver(&format_shutdown(reason, summary)).await;
    }

    pub async fn trade_opened(&self, trade: &Trade, score: Option<Decimal>) {
        if self.settings.enable_trade_notifications {
            self.deliver(&format_trade_opened(trade, score)).await;
        }
    }

    pub async fn trade_closed(&self, trade: &Trade) {
        if self.settings.enable_trade_notifications {
            self.deliver(&format_trade_closed(trade)).await;
        }
    }

    pub async fn position_update(&self, positions: &[Position], summary: &PortfolioSummary) {
        if self.settings.enable_position_updates {
            self.deliver(&format_position_update(positions, summary)).await;
        }
    }

    pub async fn daily_summary(&self, day: NaiveDate, summary: &PortfolioSummary, stats: &PerformanceStats) {
        if self.settings.enable_daily_summary {
            self.deliver(&format_daily_summary(day, summary, stats)).await;
        }
    }

    pub async fn critical_alert(&self, title: &str, detail: &str) {
        if !self.settings.enable_critical_alerts {
            return;
        }
        let text = format!(
            "🚨 <b>CRITICAL: {}</b>\n\n{}\n\n<i>{}</i>",
            escape_html(title),
            escape_html(detail),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Err(e) = self.send_critical(&text).await {
            tracing::error!("Critical alert could not be delivered: {}", e);
        }
    }

    pub async fn error(&self, context: &str, message: &str) {
        let text = format!("❌ <b>{}</b>\n\n<code>{}</code>", escape_html(context), escape_html(message));
        self.deliver(&text).await;
    }
}

pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn mode_label(paper_trading: bool) -> &'static str {
    if paper_trading {
        "📝 PAPER"
    } else {
        "💵 LIVE"
    }
}

pub fn format_startup(paper_trading: bool, started_at: DateTime<Utc>) -> String {
    format!(
        "🚀 <b>Enhanced Trading System Online</b>\n\n\
        Mode: {}\n\
        Started: <code>{}</code>\n\
        Version: {}\n\n\
        Use /help for commands",
        mode_label(paper_trading),
        started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        env!("CARGO_PKG_VERSION"),
    )
}

pub fn format_shutdown(reason: &str, summary: Option<&PortfolioSummary>) -> String {
    let mut text = format!("🛑 <b>Trading System Shutdown</b>\n\nReason: {}", escape_html(reason));
    if let Some(s) = summary {
        text.push_str(&format!(
            "\nEquity: <code>${:.2}</code>\nTotal P&amp;L: <code>{:+.2}</code>\nOpen positions: {}",
            s.total_value, s.total_pnl, s.open_positions
        ));
    }
    text
}

pub fn format_trade_opened(trade: &Trade, score: Option<Decimal>) -> String {
    let mut text = format!(
        "🟢 <b>BUY {}</b>\n\n\
        Shares: {}\n\
        Price: <code>${:.2}</code>\n\
        Value: <code>${:.2}</code>\n\
        Reason: {}",
        escape_html(&trade.symbol),
        trade.shares,
        trade.price,
        trade.value,
        escape_html(&trade.reason),
    );
    if let Some(score) = score {
        text.push_str(&format!("\nScore: {:.1}", score));
    }
    text
}

pub fn format_trade_closed(trade: &Trade) -> String {
    let pnl = trade.pnl.unwrap_or_default();
    let emoji = if pnl >= Decimal::ZERO { "✅" } else { "🔻" };
    format!(
        "{} <b>SELL {}</b>\n\n\
        Shares: {}\n\
        Price: <code>${:.2}</code>\n\
        P&amp;L: <code>{:+.2}</code>\n\
        Reason: {}",
        emoji,
        escape_html(&trade.symbol),
        trade.shares,
        trade.price,
        pnl,
        escape_html(&trade.reason),
    )
}

pub fn format_position_update(positions: &[Position], summary: &PortfolioSummary) -> String {
    let mut text = format!(
        "📊 <b>Portfolio Update</b>\n\n\
        Equity: <code>${:.2}</code>\n\
        Cash: <code>${:.2}</code>\n\
        Unrealized: <code>{:+.2}</code>\n",
        summary.total_value, summary.cash_balance, summary.unrealized_pnl
    );
    if positions.is_empty() {
        text.push_str("\n📭 No open positions");
    }
    for pos in positions {
        let emoji = if pos.unrealized_pnl() >= Decimal::ZERO { "🟢" } else { "🔴" };
        text.push_str(&format!(
            "\n{} <code>{}</code> {} @ {:.2} → {:.2} ({:+.2}%)",
            emoji,
            escape_html(&pos.symbol),
            pos.shares,
            pos.avg_entry,
            pos.current_price,
            pos.return_pct() * Decimal::ONE_HUNDRED,
        ));
    }
    text
}

pub fn format_daily_summary(day: NaiveDate, summary: &PortfolioSummary, stats: &PerformanceStats) -> String {
    let emoji = if summary.total_pnl >= Decimal::ZERO { "📈" } else { "📉" };
    format!(
        "{} <b>Daily Summary {}</b>\n\n\
        Equity: <code>${:.2}</code>\n\
        ROI: {:+.2}%\n\
        Realized P&amp;L: <code>{:+.2}</code>\n\
        Trades closed: {}\n\
        Win rate: {:.1}%\n\
        Open positions: {}",
        emoji,
        day.format("%Y-%m-%d"),
        summary.total_value,
        summary.roi_percent,
        stats.total_pnl,
        stats.total_trades,
        stats.win_rate * Decimal::ONE_HUNDRED,
        summary.open_positions,
    )
}
