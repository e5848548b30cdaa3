//! Trade store tests

use super::*;
use chrono::{Duration, TimeZone};
use rust_decimal_macros::dec;
use tempfile::tempdir;

fn trade_at(symbol: &str, side: Side, pnl: Option<Decimal>, at: DateTime<Utc>) -> Trade {
    let mut trade = Trade::new(symbol, side, 10, dec!(12.34), "test");
    trade.pnl = pnl;
    trade.timestamp = at;
    trade
}

#[tokio::test]
async fn test_connect_memory_and_migrate_twice() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.run_migrations().await.unwrap();
    assert_eq!(db.trade_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_save_and_read_back() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let trade = Trade::new("ABC", Side::Sell, 7, dec!(3.1415), "take_profit_2").with_pnl(dec!(-0.07));
    db.save_trade(&trade).await.unwrap();

    let loaded = db.recent_trades(10).await.unwrap();
    assert_eq!(loaded.len(), 1);
    let got = &loaded[0];
    assert_eq!(got.id, trade.id);
    assert_eq!(got.side, Side::Sell);
    assert_eq!(got.shares, 7);
    assert_eq!(got.price, dec!(3.1415));
    assert_eq!(got.value, trade.value);
    assert_eq!(got.pnl, Some(dec!(-0.07)));
    assert!(got.paper);
}

#[tokio::test]
async fn test_recent_trades_newest_first_with_limit() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let base = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap();
    for i in 0..5 {
        db.save_trade(&trade_at(&format!("S{}", i), Side::Buy, None, base + Duration::minutes(i)))
            .await
            .unwrap();
    }

    let recent = db.recent_trades(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].symbol, "S4");
    assert_eq!(recent[1].symbol, "S3");
}

#[tokio::test]
async fn test_trades_between_and_daily_stats() {
    let dir = tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("trades.db").display());
    let db = Database::connect(&url).await.unwrap();

    let day = Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap();
    db.save_trade(&trade_at("A", Side::Buy, None, day)).await.unwrap();
    db.save_trade(&trade_at("A", Side::Sell, Some(dec!(20)), day + Duration::hours(1)))
        .await
        .unwrap();
    db.save_trade(&trade_at("B", Side::Sell, Some(dec!(-5)), day + Duration::hours(2)))
        .await
        .unwrap();
    db.save_trade(&trade_at("C", Side::Buy, None, day + Duration::days(1)))
        .await
        .unwrap();

    let window = db.trades_between(day, day + Duration::hours(2)).await.unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].side, Side::Buy);

    let stats = db.daily_stats(day.date_naive()).await.unwrap();
    assert_eq!(stats.trades, 3);
    assert_eq!(stats.buys, 1);
    assert_eq!(stats.sells, 2);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.realized_pnl, dec!(15));
    assert_eq!(stats.volume, dec!(370.20));
}

#[tokio::test]
async fn test_save_is_idempotent_per_id() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let trade = Trade::new("ABC", Side::Buy, 1, dec!(1), "x");
    db.save_trade(&trade).await.unwrap();
    db.save_trade(&trade).await.unwrap();
    assert_eq!(db.trade_count().await.unwrap(), 1);
}
