//! Health check tests

use super::*;
use chrono::{Duration as ChronoDuration, TimeZone};
use tempfile::tempdir;

fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.system.data_dir = root.join("data");
    config.system.logs_dir = root.join("logs");
    config.system.reports_dir = root.join("reports");
    config.system.config_dir = root.join("config");
    config
}

fn create_dirs(config: &Config) {
    for dir in config.required_dirs() {
        std::fs::create_dir_all(dir).unwrap();
    }
}

#[test]
fn test_status_ordering() {
    assert!(HealthStatus::Critical > HealthStatus::Warning);
    assert!(HealthStatus::Warning > HealthStatus::Healthy);
}

#[test]
fn test_report_takes_worst_status() {
    let at = Utc::now();
    let report = HealthReport::from_checks(
        vec![
            ComponentCheck::healthy("a", "ok"),
            ComponentCheck::warning("b", "meh"),
        ],
        true,
        MarketStatus::Closed,
        at,
    );
    assert_eq!(report.system_status, HealthStatus::Warning);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.problems().count(), 1);

    let report = HealthReport::from_checks(
        vec![ComponentCheck::critical("c", "down")],
        true,
        MarketStatus::Closed,
        at,
    );
    assert!(report.is_critical());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_missing_directories_are_critical() {
    let dir = tempdir().unwrap();
    let checker = HealthChecker::new(config_in(dir.path()));
    let checks = checker.check_directories();
    assert_eq!(checks.len(), 4);
    assert!(checks.iter().all(|c| c.status == HealthStatus::Critical));
}

#[test]
fn test_existing_directories_are_healthy() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    create_dirs(&config);
    let checker = HealthChecker::new(config);
    assert!(checker
        .check_directories()
        .iter()
        .all(|c| c.status == HealthStatus::Healthy));
    // probe file cleaned up
    assert!(!dir.path().join("data/.health_probe").exists());
}

#[test]
fn test_heartbeat_staleness() {
    let checker = HealthChecker::new(Config::default());
    let now = Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap();

    assert_eq!(checker.check_heartbeat(None, now).status, HealthStatus::Warning);
    assert_eq!(
        checker
            .check_heartbeat(Some(now - ChronoDuration::seconds(90)), now)
            .status,
        HealthStatus::Healthy
    );
    assert_eq!(
        checker
            .check_heartbeat(Some(now - ChronoDuration::seconds(91)), now)
            .status,
        HealthStatus::Critical
    );
}

#[test]
fn test_unconfigured_telegram_is_warning() {
    let checker = HealthChecker::new(Config::default());
    assert_eq!(checker.check_telegram().status, HealthStatus::Warning);

    let mut config = Config::default();
    config.notifications.telegram_bot_token = "123:abc".into();
    config.notifications.telegram_chat_id = "42".into();
    assert_eq!(HealthChecker::new(config).check_telegram().status, HealthStatus::Healthy);
}

#[test]
fn test_invalid_config_is_critical() {
    let mut config = Config::default();
    config.trading.min_stock_price = rust_decimal_macros::dec!(100);
    let checker = HealthChecker::new(config);
    assert_eq!(checker.check_config().status, HealthStatus::Critical);
}

#[test]
fn test_halted_trading_is_warning() {
    assert_eq!(check_trading(None).status, HealthStatus::Healthy);
    let check = check_trading(Some("max drawdown breached"));
    assert_eq!(check.status, HealthStatus::Warning);
    assert!(check.message.contains("drawdown"));
}

#[test]
fn test_full_run_with_fresh_heartbeat() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    create_dirs(&config);
    let checker = HealthChecker::new(config);

    let now = Utc::now();
    let runtime = RuntimeSnapshot {
        last_heartbeat: Some(now),
        halted: None,
    };
    let report = checker.run(&runtime, now);
    // only telegram is unconfigured
    assert_eq!(report.system_status, HealthStatus::Warning);
    assert!(report.paper_trading);
    assert_eq!(report.checks.len(), 8);

    let local = checker.run_local(now);
    assert_eq!(local.checks.len(), 6);
    assert!(!local.is_critical());
}

#[test]
fn test_report_json_shape() {
    let report = HealthReport::from_checks(vec![], true, MarketStatus::Open, Utc::now());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["system_status"], "healthy");
    assert_eq!(json["market_status"], "OPEN");
}
