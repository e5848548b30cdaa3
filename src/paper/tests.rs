//! Paper broker tests

use super::*;
use rust_decimal_macros::dec;
use tempfile::tempdir;

fn make_config(dir: &Path) -> PaperConfig {
    PaperConfig::in_dir(dir, dec!(1000))
}

#[tokio::test]
async fn test_buy_creates_state_and_audit_files() {
    let dir = tempdir().unwrap();
    let config = make_config(dir.path());
    let broker = PaperBroker::new(config.clone());

    let trade = broker.buy("ABC", dec!(10), 20, "signal").await.unwrap();
    assert_eq!(trade.value, dec!(200));
    assert_eq!(broker.cash().await, dec!(800));

    assert!(config.state_file.exists());
    let audit = tokio::fs::read_to_string(&config.audit_file).await.unwrap();
    assert!(audit.contains("BUY"));
}

#[tokio::test]
async fn test_insufficient_cash_rejected() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));

    let err = broker.buy("ABC", dec!(10), 101, "signal").await.unwrap_err();
    assert!(matches!(err, BotError::Execution(msg) if msg.contains("Insufficient cash")));
    assert_eq!(broker.cash().await, dec!(1000));
    assert!(broker.positions().await.is_empty());
}

#[tokio::test]
async fn test_buy_averages_in() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));

    broker.buy("ABC", dec!(10), 10, "first").await.unwrap();
    broker.buy("ABC", dec!(12), 10, "second").await.unwrap();

    let pos = broker.position("ABC").await.unwrap();
    assert_eq!(pos.shares, 20);
    assert_eq!(pos.avg_entry, dec!(11));
    assert_eq!(pos.high_water, dec!(12));
}

#[tokio::test]
async fn test_partial_then_full_sell() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));
    broker.buy("ABC", dec!(10), 20, "signal").await.unwrap();

    let half = broker.sell("ABC", dec!(11), Some(10), "take_profit_1").await.unwrap();
    assert_eq!(half.pnl, Some(dec!(10)));
    assert_eq!(broker.position("ABC").await.unwrap().shares, 10);

    let rest = broker.sell("ABC", dec!(9), None, "stop_loss").await.unwrap();
    assert_eq!(rest.shares, 10);
    assert_eq!(rest.pnl, Some(dec!(-10)));
    assert!(broker.position("ABC").await.is_none());
    assert_eq!(broker.cash().await, dec!(1000));
}

#[tokio::test]
async fn test_oversized_sell_is_clamped() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));
    broker.buy("ABC", dec!(10), 5, "signal").await.unwrap();

    let trade = broker.sell("ABC", dec!(10), Some(50), "manual").await.unwrap();
    assert_eq!(trade.shares, 5);
}

#[tokio::test]
async fn test_sell_unknown_position() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));
    let err = broker.sell("NOPE", dec!(10), None, "manual").await.unwrap_err();
    assert!(matches!(err, BotError::PositionNotFound(s) if s == "NOPE"));
}

#[tokio::test]
async fn test_summary_after_round_trip() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));

    broker.buy("ABC", dec!(10), 10, "signal").await.unwrap();
    broker.sell("ABC", dec!(15), None, "take_profit_2").await.unwrap();
    broker.buy("XYZ", dec!(20), 10, "signal").await.unwrap();
    broker.mark("XYZ", dec!(21)).await.unwrap();

    let summary = broker.summary().await;
    assert_eq!(summary.cash_balance, dec!(850));
    assert_eq!(summary.positions_value, dec!(210));
    assert_eq!(summary.total_value, dec!(1060));
    assert_eq!(summary.realized_pnl, dec!(50));
    assert_eq!(summary.unrealized_pnl, dec!(10));
    assert_eq!(summary.total_pnl, dec!(60));
    assert_eq!(summary.roi_percent, dec!(6));
    assert_eq!(summary.trade_count, 1);
    assert_eq!(summary.win_rate, dec!(1));
    assert_eq!(summary.open_positions, 1);
    assert_eq!(broker.equity().await, dec!(1060));
    assert_eq!(broker.exposure().await, dec!(200));
}

#[tokio::test]
async fn test_state_persistence() {
    let dir = tempdir().unwrap();
    let config = make_config(dir.path());

    {
        let broker = PaperBroker::new(config.clone());
        broker.buy("ABC", dec!(10), 10, "signal").await.unwrap();
        broker.set_first_target_taken("ABC").await.unwrap();
    }

    let restored = PaperBroker::new(config);
    assert!(restored.load_state().await.unwrap());
    let pos = restored.position("ABC").await.unwrap();
    assert_eq!(pos.shares, 10);
    assert!(pos.tp1_taken);
    assert_eq!(restored.cash().await, dec!(900));
    assert_eq!(restored.history().await.len(), 1);
}

#[tokio::test]
async fn test_load_without_state_file() {
    let dir = tempdir().unwrap();
    let broker = PaperBroker::new(make_config(dir.path()));
    assert!(!broker.load_state().await.unwrap());
    assert_eq!(broker.cash().await, dec!(1000));
}

#[tokio::test]
async fn test_audit_log_format() {
    let dir = tempdir().unwrap();
    let config = make_config(dir.path());
    let broker = PaperBroker::new(config.clone());

    broker.buy("ABC", dec!(10), 10, "signal").await.unwrap();
    broker.sell("ABC", dec!(12), None, "take_profit_2").await.unwrap();

    let content = tokio::fs::read_to_string(&config.audit_file).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let buy: AuditEntry = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(buy.action, "BUY");
    assert_eq!(buy.balance_before, dec!(1000));
    assert_eq!(buy.balance_after, dec!(900));
    assert!(buy.pnl.is_none());

    let sell: AuditEntry = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(sell.action, "SELL");
    assert_eq!(sell.pnl, Some(dec!(20)));
    assert_eq!(sell.pnl_pct, Some(dec!(20)));
    assert_eq!(sell.balance_after, dec!(1020));
}
