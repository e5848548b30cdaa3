//! Container health probe: exit 0 when healthy, 1 otherwise

use chrono::Utc;
use clap::Parser;
use std::time::Duration;
use trading_system::{
    config::{Config, DEFAULT_CONFIG_PATH},
    health::{probe_endpoint, HealthChecker, HealthReport},
    logging,
};

#[derive(Parser)]
#[command(name = "health-check", version)]
#[command(about = "Check a running trading system")]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Seconds to wait for the status endpoint
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_console(false);

    let code = match check(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Health check failed: {}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn check(args: &Args) -> anyhow::Result<i32> {
    let config = Config::load(&args.config)?;
    let port = config.system.status_port;

    match probe_endpoint(port, Duration::from_secs(args.timeout)).await {
        Ok(report) => {
            print_report(&report, args.json)?;
            Ok(report.exit_code())
        }
        Err(e) => {
            // unreachable is unhealthy; local checks are informational
            eprintln!("⚠️  Status endpoint on port {} unreachable: {}", port, e);
            let report = HealthChecker::new(config).run_local(Utc::now());
            print_report(&report, args.json)?;
            Ok(1)
        }
    }
}

fn print_report(report: &HealthReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("System: {}", report.system_status);
    for check in &report.checks {
        println!("  {} {}: {}", check.status, check.name, check.message);
    }
    Ok(())
}
