//! Train the scoring model from daily bars

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use trading_system::{
    client::{yahoo, QuoteSource, YahooClient},
    config::expand_path,
    data::{load_bars, save_bars},
    logging,
    ml::{FeatureExtractor, Sample, ScoringModel, TrainParams},
    types::normalize_symbol,
};

/// Share of each symbol's samples used for fitting; the rest is held out
const TRAIN_SPLIT: f64 = 0.8;
/// Calendar days fetched with --download
const DOWNLOAD_DAYS: u32 = 730;

#[derive(Parser)]
#[command(name = "train_model", version)]
#[command(about = "Fit the logistic scoring model on historical bars")]
struct Args {
    /// Comma-separated tickers, e.g. AAPL,MSFT
    #[arg(long, value_delimiter = ',', required = true)]
    symbols: Vec<String>,

    /// Directory of {SYMBOL}.csv files
    #[arg(long, default_value = "data/history")]
    data_path: String,

    #[arg(long, default_value = "data/models/scoring_model.json")]
    output: String,

    #[arg(long, default_value_t = 500)]
    epochs: usize,

    #[arg(long, default_value_t = 0.1)]
    learning_rate: f64,

    /// Fetch fresh history from Yahoo before training
    #[arg(long)]
    download: bool,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_console(args.debug);

    let data_dir = expand_path(&args.data_path)?;
    let output = expand_path(&args.output)?;
    let symbols: Vec<String> = args
        .symbols
        .iter()
        .filter_map(|s| normalize_symbol(s))
        .collect();
    anyhow::ensure!(!symbols.is_empty(), "no valid symbols given");

    if args.download {
        let client = YahooClient::new(yahoo::DEFAULT_BASE_URL)?;
        for symbol in &symbols {
            let bars = client.history(symbol, DOWNLOAD_DAYS).await?;
            let path = csv_path(&data_dir, symbol);
            save_bars(&path, &bars)?;
            tracing::info!("Downloaded {} bars for {} to {}", bars.len(), symbol, path.display());
        }
    }

    let extractor = FeatureExtractor::default();
    let mut train: Vec<Sample> = Vec::new();
    let mut holdout: Vec<Sample> = Vec::new();
    for symbol in &symbols {
        let path = csv_path(&data_dir, symbol);
        let bars = load_bars(&path).with_context(|| format!("loading {}", path.display()))?;
        let samples = extractor.training_samples(&bars);
        let cut = (samples.len() as f64 * TRAIN_SPLIT) as usize;
        tracing::info!("{}: {} bars, {} samples", symbol, bars.len(), samples.len());
        train.extend_from_slice(&samples[..cut]);
        holdout.extend_from_slice(&samples[cut..]);
    }

    let params = TrainParams {
        epochs: args.epochs,
        learning_rate: args.learning_rate,
        ..TrainParams::default()
    };
    let model = ScoringModel::train(&train, &params, symbols.clone())?;

    let fit = model.evaluate(&train);
    let test = model.evaluate(&holdout);
    println!("🧠 Trained on {} samples from {}", fit.samples, symbols.join(", "));
    println!(
        "  train    accuracy {:.3}  precision {:.3}  base rate {:.3}",
        fit.accuracy, fit.precision, fit.base_rate
    );
    println!(
        "  holdout  accuracy {:.3}  precision {:.3}  base rate {:.3}  ({} samples)",
        test.accuracy, test.precision, test.base_rate, test.samples
    );
    for (name, weight) in model.feature_names.iter().zip(&model.weights) {
        println!("  {:<14} {:+.4}", name, weight);
    }

    model.save(&output)?;
    println!("💾 Model saved to {}", output.display());
    Ok(())
}

fn csv_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(format!("{}.csv", symbol))
}
