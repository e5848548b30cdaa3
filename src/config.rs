//! Configuration management
//!
//! Settings come from `config/trading_settings.json` (optional), then
//! `TRADING__SECTION__KEY` environment overrides, then the named secrets
//! from `.env` / the process environment.

use crate::error::{BotError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the settings file
pub const DEFAULT_CONFIG_PATH: &str = "config/trading_settings.json";

/// Placeholder values written by `init`; treated as "not configured"
const TOKEN_PLACEHOLDER: &str = "YOUR_TELEGRAM_BOT_TOKEN";
const CHAT_PLACEHOLDER: &str = "YOUR_TELEGRAM_CHAT_ID";

/// Template written next to the binary by `trading-system init`
pub const ENV_TEMPLATE: &str = "# Trading System Environment Variables
# Fill in your actual values and rename to .env

# Telegram Configuration (REQUIRED for notifications)
TELEGRAM_BOT_TOKEN=your_telegram_bot_token_here
TELEGRAM_CHAT_ID=your_telegram_chat_id_here

# API Keys
NEWS_API_KEY=your_news_api_key_here

# Optional API Keys
ALPHA_VANTAGE_KEY=your_alpha_vantage_key_here

# Database Configuration (Optional)
DATABASE_URL=sqlite:data/trades.db?mode=rwc

# Security
SECRET_KEY=your_random_secret_key_here

# Deployment Settings
ENVIRONMENT=development
DEBUG=false
";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub risk_management: RiskConfig,
    pub trading: TradingConfig,
    pub notifications: NotificationConfig,
    pub system: SystemConfig,
    /// Populated from the environment only, never serialized
    #[serde(skip)]
    pub secrets: Secrets,
    /// Settings file that was read; None when running on defaults
    #[serde(skip)]
    pub source_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_position_size_usd: Decimal,
    pub max_total_exposure_usd: Decimal,
    pub stop_loss_percentage: Decimal,
    pub take_profit_1_percentage: Decimal,
    pub take_profit_2_percentage: Decimal,
    /// Gain from entry that arms the trailing stop
    pub trailing_stop_trigger: Decimal,
    /// Distance below the high-water mark once armed
    pub trailing_stop_percentage: Decimal,
    pub risk_per_trade_percentage: Decimal,
    pub max_daily_risk_percentage: Decimal,
    pub max_drawdown_percentage: Decimal,
    pub consecutive_loss_limit: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size_usd: dec!(1000),
            max_total_exposure_usd: dec!(10000),
            stop_loss_percentage: dec!(0.15),
            take_profit_1_percentage: dec!(0.10),
            take_profit_2_percentage: dec!(0.25),
            trailing_stop_trigger: dec!(0.08),
            trailing_stop_percentage: dec!(0.05),
            risk_per_trade_percentage: dec!(0.02),
            max_daily_risk_percentage: dec!(0.10),
            max_drawdown_percentage: dec!(0.15),
            consecutive_loss_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Minimum model score (0-100) for an entry
    pub min_ml_score_threshold: Decimal,
    pub max_daily_trades: u32,
    pub min_stock_price: Decimal,
    pub max_stock_price: Decimal,
    pub min_volume: u64,
    pub min_risk_reward_ratio: Decimal,
    pub market_open_delay_minutes: u32,
    pub market_close_buffer_minutes: u32,
    pub enable_pump_trading: bool,
    pub enable_top_stock_trading: bool,
    pub enable_watchlist_trading: bool,
    /// Symbols scanned for entries every cycle
    pub watchlist: Vec<String>,
    /// Extra symbols checked by the pump and top-mover scans
    pub scan_universe: Vec<String>,
    /// Minimum day change (fraction) for a pump
    pub pump_min_change_pct: Decimal,
    /// Volume over the recent average needed for a pump
    pub pump_volume_ratio: Decimal,
    pub top_movers_count: usize,
    /// Entries pause while this index is down more than `weak_market_drop_pct` on the day
    pub market_index_symbol: String,
    pub weak_market_drop_pct: Decimal,
    /// Refit the scoring model once per trading day after the close
    pub daily_model_training: bool,
    /// Starting cash for the paper broker
    pub initial_capital: Decimal,
    pub model_path: PathBuf,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_ml_score_threshold: dec!(75),
            max_daily_trades: 20,
            min_stock_price: dec!(0.50),
            max_stock_price: dec!(50.00),
            min_volume: 100_000,
            min_risk_reward_ratio: dec!(1.5),
            market_open_delay_minutes: 30,
            market_close_buffer_minutes: 30,
            enable_pump_trading: true,
            enable_top_stock_trading: true,
            enable_watchlist_trading: true,
            watchlist: Vec::new(),
            scan_universe: Vec::new(),
            pump_min_change_pct: dec!(0.05),
            pump_volume_ratio: dec!(2),
            top_movers_count: 5,
            market_index_symbol: "SPY".to_string(),
            weak_market_drop_pct: dec!(0.01),
            daily_model_training: true,
            initial_capital: dec!(10000),
            model_path: PathBuf::from("data/models/scoring_model.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub telegram_critical_chat_id: String,
    pub enable_trade_notifications: bool,
    pub enable_position_updates: bool,
    pub enable_daily_summary: bool,
    pub enable_critical_alerts: bool,
    pub notification_retry_attempts: u32,
    /// Seconds between retries
    pub notification_retry_delay: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: TOKEN_PLACEHOLDER.to_string(),
            telegram_chat_id: CHAT_PLACEHOLDER.to_string(),
            telegram_critical_chat_id: CHAT_PLACEHOLDER.to_string(),
            enable_trade_notifications: true,
            enable_position_updates: true,
            enable_daily_summary: true,
            enable_critical_alerts: true,
            notification_retry_attempts: 3,
            notification_retry_delay: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: String,
    pub enable_paper_trading: bool,
    pub auto_restart_on_error: bool,
    /// Seconds between health checks inside the main loop
    pub health_check_interval: u64,
    pub emergency_shutdown_trigger: bool,
    pub loop_interval_secs: u64,
    pub status_port: u16,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub config_dir: PathBuf,
    pub database_url: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            enable_paper_trading: true,
            auto_restart_on_error: true,
            health_check_interval: 300,
            emergency_shutdown_trigger: true,
            loop_interval_secs: 30,
            status_port: 8080,
            data_dir: PathBuf::from("data"),
            logs_dir: PathBuf::from("logs"),
            reports_dir: PathBuf::from("reports"),
            config_dir: PathBuf::from("config"),
            database_url: "sqlite:data/trades.db?mode=rwc".to_string(),
        }
    }
}

/// Secrets and deployment flags read from the environment
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub news_api_key: Option<String>,
    pub alpha_vantage_key: Option<String>,
    pub database_url: Option<String>,
    pub secret_key: Option<String>,
    pub environment: Option<String>,
    pub debug: bool,
}

/// Usable Telegram credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
    pub critical_chat_id: String,
}

impl Config {
    /// Load configuration from a JSON file plus environment overrides.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    /// Nothing is logged here since logging is configured from the result;
    /// call `log_source` once a subscriber is installed.
    pub fn load(path: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = expand_path(path)?;
        let found = path.exists();

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("TRADING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        config.source_file = found.then_some(path);
        Ok(config)
    }

    /// Report where the settings came from, warning when defaults are in use
    pub fn log_source(&self, requested: &str) {
        match &self.source_file {
            Some(path) => tracing::info!("Configuration loaded from {}", path.display()),
            None => tracing::warn!(
                "Config file {} not found, using default configuration",
                requested
            ),
        }
    }

    /// Parse a settings document without touching the environment
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the named secrets. Telegram values from the environment win over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.notifications.telegram_bot_token = token;
        }
        if let Some(chat_id) = non_empty("TELEGRAM_CHAT_ID") {
            if is_placeholder(&self.notifications.telegram_critical_chat_id) {
                self.notifications.telegram_critical_chat_id = chat_id.clone();
            }
            self.notifications.telegram_chat_id = chat_id;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.system.database_url = url.clone();
            self.secrets.database_url = Some(url);
        }

        let secret = |key: &str| non_empty(key).filter(|v| !is_placeholder(v));
        self.secrets.news_api_key = secret("NEWS_API_KEY");
        self.secrets.alpha_vantage_key = secret("ALPHA_VANTAGE_KEY");
        self.secrets.secret_key = secret("SECRET_KEY");
        self.secrets.environment = non_empty("ENVIRONMENT");
        self.secrets.debug = non_empty("DEBUG")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
    }

    /// Reject settings that would make the risk rules meaningless
    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk_management;
        let trading = &self.trading;

        if risk.max_position_size_usd <= Decimal::ZERO {
            return Err(invalid("risk_management.max_position_size_usd must be positive"));
        }
        if risk.max_total_exposure_usd < risk.max_position_size_usd {
            return Err(invalid(
                "risk_management.max_total_exposure_usd must be >= max_position_size_usd",
            ));
        }

        let fractions = [
            ("stop_loss_percentage", risk.stop_loss_percentage),
            ("take_profit_1_percentage", risk.take_profit_1_percentage),
            ("take_profit_2_percentage", risk.take_profit_2_percentage),
            ("trailing_stop_trigger", risk.trailing_stop_trigger),
            ("trailing_stop_percentage", risk.trailing_stop_percentage),
            ("risk_per_trade_percentage", risk.risk_per_trade_percentage),
            ("max_daily_risk_percentage", risk.max_daily_risk_percentage),
            ("max_drawdown_percentage", risk.max_drawdown_percentage),
        ];
        for (name, value) in fractions {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(invalid(&format!(
                    "risk_management.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if risk.take_profit_1_percentage >= risk.take_profit_2_percentage {
            return Err(invalid(
                "risk_management.take_profit_1_percentage must be below take_profit_2_percentage",
            ));
        }
        if risk.consecutive_loss_limit == 0 {
            return Err(invalid("risk_management.consecutive_loss_limit must be at least 1"));
        }

        if trading.min_stock_price > trading.max_stock_price {
            return Err(invalid("trading.min_stock_price must not exceed max_stock_price"));
        }
        if trading.min_ml_score_threshold < Decimal::ZERO
            || trading.min_ml_score_threshold > Decimal::ONE_HUNDRED
        {
            return Err(invalid("trading.min_ml_score_threshold must be within 0..=100"));
        }
        if trading.max_daily_trades == 0 {
            return Err(invalid("trading.max_daily_trades must be at least 1"));
        }
        if trading.pump_volume_ratio <= Decimal::ZERO {
            return Err(invalid("trading.pump_volume_ratio must be positive"));
        }
        if trading.weak_market_drop_pct < Decimal::ZERO || trading.weak_market_drop_pct > Decimal::ONE {
            return Err(invalid("trading.weak_market_drop_pct must be within 0..=1"));
        }
        if trading.initial_capital <= Decimal::ZERO {
            return Err(invalid("trading.initial_capital must be positive"));
        }

        if self.system.loop_interval_secs == 0 {
            return Err(invalid("system.loop_interval_secs must be at least 1"));
        }

        Ok(())
    }

    /// Telegram credentials, if real values are present
    pub fn telegram(&self) -> Option<TelegramCredentials> {
        let n = &self.notifications;
        if is_placeholder(&n.telegram_bot_token) || is_placeholder(&n.telegram_chat_id) {
            return None;
        }

        let critical_chat_id = if is_placeholder(&n.telegram_critical_chat_id) {
            n.telegram_chat_id.clone()
        } else {
            n.telegram_critical_chat_id.clone()
        };

        Some(TelegramCredentials {
            bot_token: n.telegram_bot_token.clone(),
            chat_id: n.telegram_chat_id.clone(),
            critical_chat_id,
        })
    }

    pub fn paper_trading(&self) -> bool {
        self.system.enable_paper_trading
    }

    /// Directories the system expects to exist at runtime
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        let data = &self.system.data_dir;
        let mut dirs = vec![
            data.clone(),
            data.join("history"),
            data.join("cache"),
            self.system.logs_dir.clone(),
            self.system.reports_dir.clone(),
            self.system.config_dir.clone(),
            self.system.config_dir.join("backup"),
        ];
        if let Some(parent) = self.trading.model_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent.to_path_buf());
            }
        }
        dirs
    }

    /// Write these settings as pretty JSON, backing up any existing file first.
    ///
    /// Returns the backup path when one was made.
    pub fn write_default(&self, path: &Path) -> Result<Option<PathBuf>> {
        let backup = if path.exists() {
            let backup_dir = path
                .parent()
                .map(|p| p.join("backup"))
                .unwrap_or_else(|| PathBuf::from("backup"));
            std::fs::create_dir_all(&backup_dir)?;

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("trading_settings");
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let target = backup_dir.join(format!("{}_{}.json", stem, stamp));
            std::fs::copy(path, &target)?;
            tracing::info!("Backed up {} to {}", path.display(), target.display());
            Some(target)
        } else {
            None
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(backup)
    }
}

/// Expand `~` and `$VAR` in a user-supplied path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| BotError::Config(format!("Cannot expand path {}: {}", path, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == TOKEN_PLACEHOLDER || v == CHAT_PLACEHOLDER || v.starts_with("your_")
}

fn invalid(msg: &str) -> BotError {
    BotError::Config(msg.to_string())
}
