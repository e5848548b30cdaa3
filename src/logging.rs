//! Tracing setup: stdout plus an append-only log file

use crate::error::{BotError, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE: &str = "trading_system.log";

/// Filter directive: `RUST_LOG` wins, then the debug switch, then the config level
pub fn filter_directive(rust_log: Option<&str>, config_level: &str, debug: bool) -> String {
    if let Some(env) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        return env.to_string();
    }
    if debug {
        return "debug".to_string();
    }
    match config_level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
    .to_string()
}

/// Install the global subscriber, appending to `{logs_dir}/trading_system.log`
pub fn init(logs_dir: &Path, config_level: &str, debug: bool) -> Result<()> {
    std::fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(LOG_FILE))?;

    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), config_level, debug);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .map_err(|e| BotError::Internal(format!("logging init: {}", e)))
}

/// Stdout-only logging for the helper binaries
pub fn init_console(debug: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), "info", debug);
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(directive))
        .with(fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins() {
        assert_eq!(filter_directive(Some("trading_system=trace"), "INFO", true), "trading_system=trace");
    }

    #[test]
    fn test_debug_flag_over_config() {
        assert_eq!(filter_directive(None, "WARNING", true), "debug");
        assert_eq!(filter_directive(Some("  "), "INFO", true), "debug");
    }

    #[test]
    fn test_config_level_mapping() {
        assert_eq!(filter_directive(None, "INFO", false), "info");
        assert_eq!(filter_directive(None, "WARNING", false), "warn");
        assert_eq!(filter_directive(None, "CRITICAL", false), "error");
        assert_eq!(filter_directive(None, "bogus", false), "info");
    }
}
