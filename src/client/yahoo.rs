//! Yahoo Finance chart API client
//!
//! Uses the public `/v8/finance/chart/{symbol}` endpoint for both the
//! live quote (from `meta`) and daily bars (from `indicators.quote`).

use super::QuoteSource;
use crate::error::{BotError, Result};
use crate::types::{Bar, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::prelude::*;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Clone)]
pub struct YahooClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_volume: Option<u64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl YahooClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; trading-system/2.0)")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_chart(&self, symbol: &str, range: &str) -> Result<ChartResponse> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!("GET {} range={}", url, range);

        let resp = self
            .http
            .get(&url)
            .query(&[("range", range), ("interval", "1d")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BotError::Api(format!(
                "Yahoo chart for {} returned {}",
                symbol,
                resp.status()
            )));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl QuoteSource for YahooClient {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let chart = self.fetch_chart(symbol, "1d").await?;
        parse_quote(chart)
    }

    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        let chart = self.fetch_chart(symbol, range_for_days(days)).await?;
        parse_bars(chart)
    }
}

/// Smallest chart range covering `days` calendar days
pub fn range_for_days(days: u32) -> &'static str {
    match days {
        0..=5 => "5d",
        6..=31 => "1mo",
        32..=93 => "3mo",
        94..=186 => "6mo",
        187..=366 => "1y",
        367..=731 => "2y",
        732..=1827 => "5y",
        _ => "max",
    }
}

fn first_result(chart: ChartResponse) -> Result<ChartResult> {
    if let Some(err) = chart.chart.error {
        return Err(BotError::Api(format!("{}: {}", err.code, err.description)));
    }
    chart
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| BotError::Api("empty chart result".to_string()))
}

pub(crate) fn parse_quote(chart: ChartResponse) -> Result<Quote> {
    let result = first_result(chart)?;
    let meta = result.meta;

    let price = meta
        .regular_market_price
        .ok_or_else(|| BotError::Api(format!("no price for {}", meta.symbol)))?;
    let previous = meta.chart_previous_close.or(meta.previous_close);

    let change_pct = match previous {
        Some(prev) if prev > 0.0 => (price - prev) / prev,
        _ => 0.0,
    };

    let timestamp = meta
        .regular_market_time
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        symbol: meta.symbol,
        price: to_decimal(price)?,
        volume: meta.regular_market_volume.unwrap_or(0),
        change_pct: to_decimal(change_pct)?.round_dp(6),
        timestamp,
    })
}

pub(crate) fn parse_bars(chart: ChartResponse) -> Result<Vec<Bar>> {
    let result = first_result(chart)?;
    let series = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        // Yahoo pads halted sessions with nulls
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&series.open),
            field(&series.high),
            field(&series.low),
            field(&series.close),
        ) else {
            continue;
        };
        let Some(date) = DateTime::<Utc>::from_timestamp(*ts, 0) else {
            continue;
        };

        bars.push(Bar {
            date: date.date_naive(),
            open,
            high,
            low,
            close,
            volume: field(&series.volume).unwrap_or(0.0),
        });
    }

    Ok(bars)
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(4))
        .ok_or_else(|| BotError::Api(format!("unrepresentable price {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {
                    "symbol": "SNDL",
                    "regularMarketPrice": 2.2,
                    "chartPreviousClose": 2.0,
                    "regularMarketVolume": 4500000,
                    "regularMarketTime": 1721073600
                },
                "timestamp": [1720791000, 1721050200, 1721136600],
                "indicators": {
                    "quote": [{
                        "open":   [1.9, null, 2.1],
                        "high":   [2.05, null, 2.3],
                        "low":    [1.85, null, 2.0],
                        "close":  [2.0, null, 2.2],
                        "volume": [3000000, null, 4500000]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    fn chart() -> ChartResponse {
        serde_json::from_str(CHART).unwrap()
    }

    #[test]
    fn test_parse_quote() {
        let quote = parse_quote(chart()).unwrap();
        assert_eq!(quote.symbol, "SNDL");
        assert_eq!(quote.price, dec!(2.2));
        assert_eq!(quote.volume, 4_500_000);
        assert_eq!(quote.change_pct, dec!(0.1));
    }

    #[test]
    fn test_parse_bars_skips_null_rows() {
        let bars = parse_bars(chart()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 2.0);
        assert_eq!(bars[1].close, 2.2);
        assert!(bars[0].date < bars[1].date);
    }

    #[test]
    fn test_chart_error_is_api_error() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let chart: ChartResponse = serde_json::from_str(json).unwrap();
        let err = parse_quote(chart).unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_range_for_days() {
        assert_eq!(range_for_days(5), "5d");
        assert_eq!(range_for_days(60), "3mo");
        assert_eq!(range_for_days(365), "1y");
        assert_eq!(range_for_days(5000), "max");
    }
}
