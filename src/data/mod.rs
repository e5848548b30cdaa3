//! Historical daily bars stored as CSV
//!
//! Layout follows the common OHLCV export: `Date,Open,High,Low,Close,Volume`
//! with an optional `Adj Close` column. Files live in `data/history/{SYMBOL}.csv`.

use crate::error::{BotError, Result};
use crate::types::Bar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date", alias = "date")]
    date: String,
    #[serde(rename = "Open", alias = "open")]
    open: f64,
    #[serde(rename = "High", alias = "high")]
    high: f64,
    #[serde(rename = "Low", alias = "low")]
    low: f64,
    #[serde(rename = "Close", alias = "close")]
    close: f64,
    #[serde(rename = "Volume", alias = "volume")]
    volume: f64,
}

#[derive(Debug, Serialize)]
struct CsvOutRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

/// Default history file for a symbol under a data directory
pub fn history_path(data_dir: &Path, symbol: &str) -> PathBuf {
    data_dir.join("history").join(format!("{}.csv", symbol.to_uppercase()))
}

/// Load bars from a CSV file, sorted by date
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let file = std::fs::File::open(path)
        .map_err(|e| BotError::Csv(format!("{}: {}", path.display(), e)))?;
    read_bars(file)
}

/// Parse bars from any CSV reader
pub fn read_bars<R: std::io::Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (line, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let date = parse_date(&row.date)
            .ok_or_else(|| BotError::Csv(format!("row {}: bad date '{}'", line + 2, row.date)))?;
        if row.close <= 0.0 || !row.close.is_finite() {
            return Err(BotError::Csv(format!(
                "row {}: non-positive close {}",
                line + 2,
                row.close
            )));
        }
        bars.push(Bar {
            date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

/// Write bars in the same layout `load_bars` reads
pub fn save_bars(path: &Path, bars: &[Bar]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for bar in bars {
        wtr.serialize(CsvOutRow {
            date: bar.date.format("%Y-%m-%d").to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Keep bars within the inclusive date range
pub fn filter_range(bars: Vec<Bar>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| start.map_or(true, |s| b.date >= s))
        .filter(|b| end.map_or(true, |e| b.date <= e))
        .collect()
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "Date,Open,High,Low,Close,Adj Close,Volume
2024-01-03,10.5,11.0,10.1,10.8,10.8,150000
2024-01-02,10.0,10.6,9.9,10.4,10.4,120000
2024-01-04 00:00:00-05:00,10.8,11.4,10.7,11.2,11.2,180000
";

    #[test]
    fn test_read_bars_sorts_and_ignores_adj_close() {
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[2].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(bars[1].close, 10.8);
        assert_eq!(bars[2].volume, 180000.0);
    }

    #[test]
    fn test_read_bars_rejects_bad_close() {
        let csv = "Date,Open,High,Low,Close,Volume\n2024-01-02,1,1,1,0,100\n";
        let err = read_bars(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, BotError::Csv(_)));
    }

    #[test]
    fn test_read_bars_rejects_bad_date() {
        let csv = "Date,Open,High,Low,Close,Volume\n01/02/2024,1,1,1,1,100\n";
        assert!(read_bars(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_lowercase_headers() {
        let csv = "date,open,high,low,close,volume\n2024-01-02,1,2,0.5,1.5,100\n";
        let bars = read_bars(csv.as_bytes()).unwrap();
        assert_eq!(bars[0].high, 2.0);
    }

    #[test]
    fn test_filter_range_inclusive() {
        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        let filtered = filter_range(
            bars,
            NaiveDate::from_ymd_opt(2024, 1, 3),
            NaiveDate::from_ymd_opt(2024, 1, 4),
        );
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = history_path(dir.path(), "aapl");
        assert!(path.ends_with("history/AAPL.csv"));

        let bars = read_bars(SAMPLE.as_bytes()).unwrap();
        save_bars(&path, &bars).unwrap();
        assert_eq!(load_bars(&path).unwrap(), bars);
    }
}
