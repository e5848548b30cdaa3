//! Tests for the session clock

use super::*;
use chrono::TimeZone;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[test]
fn test_summer_session_bounds() {
    let clock = MarketClock::default();
    // Monday 2024-07-15, EDT = UTC-4
    assert!(!clock.is_open(utc(2024, 7, 15, 13, 29)));
    assert!(clock.is_open(utc(2024, 7, 15, 13, 30)));
    assert!(clock.is_open(utc(2024, 7, 15, 19, 59)));
    assert!(!clock.is_open(utc(2024, 7, 15, 20, 0)));
}

#[test]
fn test_winter_session_bounds() {
    let clock = MarketClock::default();
    // Tuesday 2024-01-16, EST = UTC-5
    assert!(!clock.is_open(utc(2024, 1, 16, 14, 29)));
    assert!(clock.is_open(utc(2024, 1, 16, 14, 30)));
    assert!(!clock.is_open(utc(2024, 1, 16, 21, 0)));
}

#[test]
fn test_weekend_closed() {
    let clock = MarketClock::default();
    assert!(!clock.is_open(utc(2024, 7, 13, 15, 0)));
    assert!(!clock.is_open(utc(2024, 7, 14, 15, 0)));
    assert_eq!(clock.status(utc(2024, 7, 13, 15, 0)), MarketStatus::Closed);
}

#[test]
fn test_dst_transitions() {
    // 2024: DST starts 2024-03-10 07:00 UTC, ends 2024-11-03 06:00 UTC
    assert!(!is_us_dst(utc(2024, 3, 10, 6, 59)));
    assert!(is_us_dst(utc(2024, 3, 10, 7, 0)));
    assert!(is_us_dst(utc(2024, 11, 3, 5, 59)));
    assert!(!is_us_dst(utc(2024, 11, 3, 6, 0)));
}

#[test]
fn test_trading_window_excludes_open_delay_and_close_buffer() {
    let clock = MarketClock::new(30, 30);
    assert!(!clock.trading_window_open(utc(2024, 7, 15, 13, 45))); // 09:45
    assert!(clock.trading_window_open(utc(2024, 7, 15, 14, 0))); // 10:00
    assert!(clock.trading_window_open(utc(2024, 7, 15, 19, 29))); // 15:29
    assert!(!clock.trading_window_open(utc(2024, 7, 15, 19, 30))); // 15:30
}

#[test]
fn test_should_flatten_in_final_buffer() {
    let clock = MarketClock::new(30, 30);
    assert!(!clock.should_flatten(utc(2024, 7, 15, 19, 29)));
    assert!(clock.should_flatten(utc(2024, 7, 15, 19, 30)));
    assert!(clock.should_flatten(utc(2024, 7, 15, 19, 59)));
    // closed market never flattens
    assert!(!clock.should_flatten(utc(2024, 7, 15, 20, 30)));
}

#[test]
fn test_zero_buffer_never_flattens() {
    let clock = MarketClock::new(0, 0);
    assert!(!clock.should_flatten(utc(2024, 7, 15, 19, 59)));
    assert!(clock.trading_window_open(utc(2024, 7, 15, 13, 30)));
}

#[test]
fn test_minutes_to_close() {
    let clock = MarketClock::default();
    assert_eq!(clock.minutes_to_close(utc(2024, 7, 15, 19, 0)), Some(60));
    assert_eq!(clock.minutes_to_close(utc(2024, 7, 15, 21, 0)), None);
}

#[test]
fn test_trading_day_uses_new_york_date() {
    let clock = MarketClock::default();
    // 02:00 UTC on the 16th is 22:00 EDT on the 15th
    assert_eq!(
        clock.trading_day(utc(2024, 7, 16, 2, 0)),
        NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    );
}

#[test]
fn test_after_close() {
    let clock = MarketClock::default();
    assert!(!clock.is_after_close(utc(2024, 7, 15, 19, 0)));
    assert!(clock.is_after_close(utc(2024, 7, 15, 20, 5)));
    assert!(!clock.is_after_close(utc(2024, 7, 13, 21, 0))); // Saturday
}
