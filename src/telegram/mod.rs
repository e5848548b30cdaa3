//! Telegram bot for receiving commands
//!
//! Supports /status, /trades, /stats, /positions, /buy, /sell, /pause,
//! /resume, /stop and /help from the configured chat only.


use crate::config::TelegramCredentials;
use crate::engine::TradingSystem;
use crate::error::Result;
use crate::notify::{escape_html, Notifier, TELEGRAM_API_BASE};
use crate::types::normalize_symbol;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Default and maximum for `/trades [n]`
const DEFAULT_TRADES_LIMIT: usize = 10;
const MAX_TRADES_LIMIT: usize = 50;

/// Commands that can be sent to the trading system
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    /// Mode, market, equity and loop state
    Status,
    /// Last n fills
    Trades { limit: usize },
    /// Performance statistics
    Stats,
    /// Open positions
    Positions,
    /// Manual buy for a dollar amount
    Buy { symbol: String, usd: Decimal },
    /// Manual sell; all shares when none given
    Sell { symbol: String, shares: Option<u64> },
    /// Stop opening new positions
    Pause,
    Resume,
    /// Graceful shutdown
    Stop,
    Help,
}

pub const HELP_TEXT: &str = r#"🤖 <b>Trading System Commands</b>

<b>Status</b>
/status - System, market and account status
/positions - Open positions
/trades [n] - Last n trades (default 10)
/stats - Performance statistics

<b>Trading</b>
/buy &lt;SYMBOL&gt; &lt;USD&gt; - Manual buy
/sell &lt;SYMBOL&gt; [SHARES] - Manual sell (all if omitted)
/pause - Pause new entries
/resume - Resume trading

<b>System</b>
/stop - Graceful shutdown
/help - Show this message"#;

/// Parse one chat message.
///
/// `Ok(None)` for non-command text, `Err(reply)` with a usage hint when the
/// command is unknown or its arguments are malformed.
pub fn parse_command(text: &str) -> std::result::Result<Option<BotCommand>, String> {
    let text = text.trim();
    let Some(body) = text.strip_prefix('/') else {
        return Ok(None);
    };

    let mut parts = body.split_whitespace();
    let head = parts.next().unwrap_or("");
    // "/status@my_bot" in group chats
    let cmd = head.split('@').next().unwrap_or(head).to_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match cmd.as_str() {
        "start" | "help" => BotCommand::Help,
        "status" => BotCommand::Status,
        "stats" | "performance" => BotCommand::Stats,
        "positions" | "pos" => BotCommand::Positions,
        "pause" => BotCommand::Pause,
        "resume" => BotCommand::Resume,
        "stop" => BotCommand::Stop,
        "trades" => {
            let limit = match args.first() {
                None => DEFAULT_TRADES_LIMIT,
                Some(raw) => match raw.parse::<usize>() {
                    Ok(n) if n > 0 => n.min(MAX_TRADES_LIMIT),
                    _ => return Err("❌ Usage: /trades [n]".to_string()),
                },
            };
            BotCommand::Trades { limit }
        }
        "buy" => {
            let usage = || "❌ Usage: /buy &lt;SYMBOL&gt; &lt;USD&gt;".to_string();
            if args.len() != 2 {
                return Err(usage());
            }
            let symbol = normalize_symbol(args[0]).ok_or_else(usage)?;
            let usd: Decimal = args[1].trim_start_matches('$').parse().map_err(|_| usage())?;
            if usd <= Decimal::ZERO {
                return Err(usage());
            }
            BotCommand::Buy { symbol, usd }
        }
        "sell" => {
            let usage = || "❌ Usage: /sell &lt;SYMBOL&gt; [SHARES]".to_string();
            if args.is_empty() || args.len() > 2 {
                return Err(usage());
            }
            let symbol = normalize_symbol(args[0]).ok_or_else(usage)?;
            let shares = match args.get(1) {
                None => None,
                Some(raw) => match raw.parse::<u64>() {
                    Ok(n) if n > 0 => Some(n),
                    _ => return Err(usage()),
                },
            };
            BotCommand::Sell { symbol, shares }
        }
        other => {
            return Err(format!(
                "❓ Unknown command: /{}\nUse /help for available commands",
                escape_html(other)
            ))
        }
    };
    Ok(Some(command))
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Telegram long-polling listener
pub struct TelegramBot {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    last_update_id: RwLock<i64>,
    command_tx: mpsc::Sender<BotCommand>,
}

impl TelegramBot {
    pub fn new(credentials: &TelegramCredentials, command_tx: mpsc::Sender<BotCommand>) -> Self {
        Self::with_api_base(credentials, command_tx, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(
        credentials: &TelegramCredentials,
        command_tx: mpsc::Sender<BotCommand>,
        api_base: &str,
    ) -> Self {
        Self {
            http: Client::builder()
                // above the 30s long-poll window
                .timeout(Duration::from_secs(40))
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: credentials.bot_token.clone(),
            chat_id: credentials.chat_id.clone(),
            last_update_id: RwLock::new(0),
            command_tx,
        }
    }

    /// Poll until the command receiver is dropped
    pub async fn start_polling(self: Arc<Self>) {
        tracing::info!("Starting Telegram command listener...");

        loop {
            if self.command_tx.is_closed() {
                tracing::info!("Command channel closed, stopping Telegram listener");
                return;
            }
            match self.poll_updates().await {
                Ok(updates) => self.process_updates(updates).await,
                Err(e) => {
                    tracing::error!("Failed to poll Telegram updates: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Dispatch messages from the configured chat and advance the update offset
    async fn process_updates(&self, updates: Vec<TelegramUpdate>) {
        for update in updates {
            if let Some(msg) = update.message {
                if self.is_authorized(msg.chat.id) {
                    if let Some(text) = msg.text {
                        self.handle_message(&text).await;
                    }
                } else {
                    tracing::warn!("Ignoring message from unauthorized chat {}", msg.chat.id);
                }
            }

            let mut last_id = self.last_update_id.write().await;
            *last_id = update.update_id + 1;
        }
    }

    fn is_authorized(&self, chat_id: i64) -> bool {
        chat_id.to_string() == self.chat_id
    }

    async fn poll_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let last_id = *self.last_update_id.read().await;
        let url = format!(
            "{}/bot{}/getUpdates?offset={}&timeout=30",
            self.api_base, self.bot_token, last_id
        );

        let response: GetUpdatesResponse = self.http.get(&url).send().await?.json().await?;
        if !response.ok {
            return Err(crate::error::BotError::Api(
                response.description.unwrap_or_else(|| "getUpdates failed".to_string()),
            ));
        }
        Ok(response.result)
    }

    async fn handle_message(&self, text: &str) {
        match parse_command(text) {
            Ok(None) => {}
            Ok(Some(BotCommand::Help)) => self.reply(HELP_TEXT).await,
            Ok(Some(cmd)) => {
                tracing::info!("Received command: {:?}", cmd);
                if self.command_tx.send(cmd).await.is_err() {
                    tracing::warn!("Command dropped, trading loop is gone");
                }
            }
            Err(usage) => self.reply(&usage).await,
        }
    }

    async fn reply(&self, text: &str) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };

        if let Err(e) = self.http.post(&url).json(&request).send().await {
            tracing::error!("Failed to send Telegram reply: {}", e);
        }
    }
}

/// Executes chat commands against the running system
pub struct CommandHandler {
    notifier: Notifier,
}

impl CommandHandler {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    pub async fn handle(&self, cmd: BotCommand, system: &TradingSystem) {
        let reply = self.reply_for(cmd, system).await;
        if let Err(e) = self.notifier.send(&reply).await {
            tracing::warn!("Command reply dropped: {}", e);
        }
    }

    /// Reply text for `cmd`, applying any side effects
    pub async fn reply_for(&self, cmd: BotCommand, system: &TradingSystem) -> String {
        match cmd {
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::Status => system.status_text().await,
            BotCommand::Stats => system.stats_text().await,
            BotCommand::Positions => system.positions_text().await,
            BotCommand::Trades { limit } => system.trades_text(limit).await,
            BotCommand::Pause => {
                system.set_paused(true).await;
                "⏸ Trading paused. Open positions are still managed.".to_string()
            }
            BotCommand::Resume => {
                system.resume().await;
                "▶️ Trading resumed".to_string()
            }
            BotCommand::Stop => {
                system.operator_stop();
                "🛑 Shutdown requested".to_string()
            }
            BotCommand::Buy { symbol, usd } => match system.manual_buy(&symbol, usd).await {
                Ok(trade) => format!(
                    "✅ Bought {} {} @ <code>${:.2}</code>",
                    trade.shares, trade.symbol, trade.price
                ),
                Err(e) => format!("❌ Buy {} failed: {}", symbol, escape_html(&e.to_string())),
            },
            BotCommand::Sell { symbol, shares } => match system.manual_sell(&symbol, shares).await {
                Ok(trade) => format!(
                    "✅ Sold {} {} @ <code>${:.2}</code> P&amp;L <code>{:+.2}</code>",
                    trade.shares,
                    trade.symbol,
                    trade.price,
                    trade.pnl.unwrap_or_default()
                ),
                Err(e) => format!("❌ Sell {} failed: {}", symbol, escape_html(&e.to_string())),
            },
        }
    }
}
