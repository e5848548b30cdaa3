//! Trading system entry point

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use trading_system::{
    config::{expand_path, Config, DEFAULT_CONFIG_PATH, ENV_TEMPLATE},
    engine::{prepare_directories, EngineOptions, TradingSystem},
    logging,
    market::MarketClock,
    notify::Notifier,
    paper::{PaperBroker, PaperConfig},
};

#[derive(Parser)]
#[command(name = "trading-system", version)]
#[command(about = "Automated US equities trading system with paper trading and Telegram control")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (JSON)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Force paper trading regardless of the settings file
    #[arg(long, global = true)]
    paper_trading: bool,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop (default)
    Run,
    /// Create directories, a default settings file and .env.template
    Init,
    /// Print configuration, market status and the paper portfolio
    Status,
    /// Send a test Telegram notification
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.config, cli.paper_trading, cli.debug).await,
        Commands::Init => init(&cli.config, cli.debug),
        Commands::Status => show_status(&cli.config, cli.debug).await,
        Commands::TestNotify => test_notify(&cli.config, cli.debug).await,
    }
}

async fn run(config_path: &str, force_paper: bool, debug: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("loading configuration")?;
    logging::init(
        &config.system.logs_dir,
        &config.system.log_level,
        debug || config.secrets.debug,
    )?;
    config.log_source(config_path);

    let system = TradingSystem::new(config, EngineOptions { force_paper }).await?;
    Arc::new(system).start().await?;
    Ok(())
}

fn init(config_path: &str, debug: bool) -> anyhow::Result<()> {
    logging::init_console(debug);

    let path = expand_path(config_path)?;
    let config = Config::default();
    prepare_directories(&config)?;

    if let Some(backup) = config.write_default(&path)? {
        println!("📦 Existing settings backed up to {}", backup.display());
    }
    println!("✅ Default settings written to {}", path.display());

    let template = Path::new(".env.template");
    if template.exists() {
        println!("ℹ️  {} already exists, left unchanged", template.display());
    } else {
        std::fs::write(template, ENV_TEMPLATE)?;
        println!("✅ Wrote {}", template.display());
    }

    println!("\nNext steps:");
    println!("  1. cp .env.template .env and fill in TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID");
    println!("  2. train a model: train_model --symbols AAPL,MSFT --download");
    println!("  3. start: trading-system --paper-trading");
    Ok(())
}

async fn show_status(config_path: &str, debug: bool) -> anyhow::Result<()> {
    logging::init_console(debug);
    let config = Config::load(config_path)?;
    config.log_source(config_path);
    let now = Utc::now();
    let clock = MarketClock::from_config(&config.trading);

    println!("📋 Trading System v{}", env!("CARGO_PKG_VERSION"));
    println!("  Mode:          {}", if config.paper_trading() { "PAPER" } else { "LIVE" });
    println!("  Market:        {}", clock.status(now));
    if let Some(minutes) = clock.minutes_to_close(now) {
        println!("  Closes in:     {} min", minutes);
    }
    println!("  Watchlist:     {}", config.trading.watchlist.join(", "));
    println!(
        "  Model:         {} ({})",
        config.trading.model_path.display(),
        if config.trading.model_path.exists() { "present" } else { "missing" }
    );
    println!(
        "  Telegram:      {}",
        if config.telegram().is_some() { "configured" } else { "not configured" }
    );

    let broker = PaperBroker::new(PaperConfig::in_dir(
        &config.system.data_dir,
        config.trading.initial_capital,
    ));
    if broker.load_state().await? {
        let summary = broker.summary().await;
        println!("\n💼 Paper portfolio");
        println!("  Total value:   ${:.2}", summary.total_value);
        println!("  Cash:          ${:.2}", summary.cash_balance);
        println!("  P&L:           {:+.2} ({:+.2}%)", summary.total_pnl, summary.roi_percent);
        println!("  Trades:        {} (win rate {:.1}%)", summary.trade_count, summary.win_rate * Decimal::ONE_HUNDRED);
        for pos in broker.positions().await {
            println!(
                "  {:<6} {:>6} @ {:>9.2}  now {:>9.2}  {:+.2}",
                pos.symbol,
                pos.shares,
                pos.avg_entry,
                pos.current_price,
                pos.unrealized_pnl()
            );
        }
    } else {
        println!("\n💼 No saved paper portfolio yet");
    }
    Ok(())
}

async fn test_notify(config_path: &str, debug: bool) -> anyhow::Result<()> {
    logging::init_console(debug);
    let config = Config::load(config_path)?;
    config.log_source(config_path);
    let notifier = Notifier::new(&config);

    if !notifier.is_enabled() {
        println!("⚠️  Telegram not configured; set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID");
        return Ok(());
    }

    notifier
        .send(&format!(
            "🧪 <b>Test notification</b>\n\nTrading System v{} at {}",
            env!("CARGO_PKG_VERSION"),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ))
        .await?;
    notifier
        .send_critical("🧪 <b>Test critical alert</b>\n\nCritical channel reachable")
        .await?;
    println!("✅ Test notifications sent");
    Ok(())
}
