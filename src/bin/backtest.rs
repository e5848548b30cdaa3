//! Replay historical bars through the strategy and risk rules

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use trading_system::{
    backtest::Backtester,
    config::{expand_path, Config, DEFAULT_CONFIG_PATH},
    data::{filter_range, history_path, load_bars, parse_date},
    logging,
    ml::ScoringModel,
    monitor::ReportWriter,
    types::normalize_symbol,
};

#[derive(Parser)]
#[command(name = "backtest", version)]
#[command(about = "Backtest the scoring strategy on daily bars")]
struct Args {
    /// Ticker to replay
    #[arg(short, long)]
    symbol: String,

    /// First date (YYYY-MM-DD), inclusive
    #[arg(long)]
    start: Option<String>,

    /// Last date (YYYY-MM-DD), inclusive
    #[arg(long)]
    end: Option<String>,

    /// CSV file, or a directory holding {SYMBOL}.csv
    #[arg(long)]
    data_path: Option<String>,

    /// Model file; defaults to trading.model_path
    #[arg(long)]
    model: Option<String>,

    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_console(args.debug);

    let config = Config::load(&args.config)?;
    config.log_source(&args.config);
    let symbol = normalize_symbol(&args.symbol)
        .with_context(|| format!("invalid symbol '{}'", args.symbol))?;

    let start = args.start.as_deref().map(parse_arg_date).transpose()?;
    let end = args.end.as_deref().map(parse_arg_date).transpose()?;

    let csv_path = match &args.data_path {
        Some(raw) => {
            let path = expand_path(raw)?;
            if path.is_dir() {
                path.join(format!("{}.csv", symbol))
            } else {
                path
            }
        }
        None => history_path(&config.system.data_dir, &symbol),
    };
    let bars = load_bars(&csv_path).with_context(|| format!("loading {}", csv_path.display()))?;
    let bars = filter_range(bars, start, end);
    tracing::info!("Loaded {} bars for {} from {}", bars.len(), symbol, csv_path.display());

    let model_path: PathBuf = match &args.model {
        Some(raw) => expand_path(raw)?,
        None => config.trading.model_path.clone(),
    };
    let model = ScoringModel::load(&model_path)
        .with_context(|| format!("loading model {}", model_path.display()))?;

    let result = Backtester::run(&symbol, &bars, &model, &config)?;

    let stats = &result.stats;
    println!("{}", "=".repeat(50));
    println!("📈 Backtest {} {} → {}", result.symbol, result.start, result.end);
    println!("{}", "=".repeat(50));
    println!("Bars:            {}", result.bars);
    println!("Initial capital: ${:.2}", result.initial_capital);
    println!("Final equity:    ${:.2}", result.final_equity);
    println!("Return:          {:+.2}%", result.return_pct);
    println!("Closed trades:   {} ({}W / {}L)", stats.total_trades, stats.winning_trades, stats.losing_trades);
    println!("Win rate:        {:.1}%", stats.win_rate * rust_decimal::Decimal::ONE_HUNDRED);
    println!(
        "Profit factor:   {}",
        stats.profit_factor.map_or("n/a".to_string(), |p| format!("{:.2}", p))
    );
    println!("Max drawdown:    ${:.2}", stats.max_drawdown);
    println!(
        "Sharpe:          {}",
        stats.sharpe_ratio.map_or("n/a".to_string(), |s| format!("{:.2}", s))
    );

    let writer = ReportWriter::new(config.system.reports_dir.clone());
    let path = writer
        .write_named(&format!("{}.json", result.report_name()), &result)
        .await?;
    println!("\n💾 Report saved to {}", path.display());
    Ok(())
}

fn parse_arg_date(raw: &str) -> anyhow::Result<chrono::NaiveDate> {
    parse_date(raw).with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}
