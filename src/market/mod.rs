//! US equities session clock
//!
//! Regular session is 09:30-16:00 America/New_York, Monday to Friday.
//! Eastern time is derived from UTC using the US daylight-saving rule
//! (second Sunday of March to first Sunday of November, switching at 02:00 local).
//! Exchange holidays are not modelled.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::TradingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Open,
    Closed,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "🟢 OPEN"),
            MarketStatus::Closed => write!(f, "🔴 CLOSED"),
        }
    }
}

/// Session clock with the configured entry window
#[derive(Debug, Clone)]
pub struct MarketClock {
    open: NaiveTime,
    close: NaiveTime,
    open_delay: Duration,
    close_buffer: Duration,
}

impl Default for MarketClock {
    fn default() -> Self {
        Self::new(30, 30)
    }
}

impl MarketClock {
    pub fn new(open_delay_minutes: u32, close_buffer_minutes: u32) -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
            open_delay: Duration::minutes(open_delay_minutes as i64),
            close_buffer: Duration::minutes(close_buffer_minutes as i64),
        }
    }

    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(
            config.market_open_delay_minutes,
            config.market_close_buffer_minutes,
        )
    }

    /// Regular session, half-open [09:30, 16:00)
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = to_eastern(at);
        is_weekday(local.date()) && local.time() >= self.open && local.time() < self.close
    }

    pub fn status(&self, at: DateTime<Utc>) -> MarketStatus {
        if self.is_open(at) {
            MarketStatus::Open
        } else {
            MarketStatus::Closed
        }
    }

    /// Session minus the opening delay and the closing buffer; new entries only here
    pub fn trading_window_open(&self, at: DateTime<Utc>) -> bool {
        if !self.is_open(at) {
            return false;
        }
        let t = to_eastern(at).time();
        t >= self.open + self.open_delay && t < self.close - self.close_buffer
    }

    /// True during the final buffer before the close, when positions are flattened
    pub fn should_flatten(&self, at: DateTime<Utc>) -> bool {
        if !self.is_open(at) || self.close_buffer.is_zero() {
            return false;
        }
        to_eastern(at).time() >= self.close - self.close_buffer
    }

    /// Minutes until the close, None while closed
    pub fn minutes_to_close(&self, at: DateTime<Utc>) -> Option<i64> {
        if !self.is_open(at) {
            return None;
        }
        Some((self.close - to_eastern(at).time()).num_minutes())
    }

    /// New York calendar date; daily counters roll over on it
    pub fn trading_day(&self, at: DateTime<Utc>) -> NaiveDate {
        to_eastern(at).date()
    }

    /// True once the session for `at`'s trading day is over
    pub fn is_after_close(&self, at: DateTime<Utc>) -> bool {
        let local = to_eastern(at);
        is_weekday(local.date()) && local.time() >= self.close
    }
}

/// Convert a UTC instant to New York wall-clock time
pub fn to_eastern(at: DateTime<Utc>) -> NaiveDateTime {
    let hours = if is_us_dst(at) { 4 } else { 5 };
    at.naive_utc() - Duration::hours(hours)
}

/// US daylight saving: from 02:00 EST on the 2nd Sunday of March (07:00 UTC)
/// to 02:00 EDT on the 1st Sunday of November (06:00 UTC)
pub fn is_us_dst(at: DateTime<Utc>) -> bool {
    let year = at.year();
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .and_then(|d| d.and_hms_opt(7, 0, 0));
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .and_then(|d| d.and_hms_opt(6, 0, 0));

    match (start, end) {
        (Some(start), Some(end)) => {
            let now = at.naive_utc();
            now >= start && now < end
        }
        _ => false,
    }
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
