//! Candidate selection beyond the fixed watchlist
//!
//! Symbols from `trading.scan_universe` qualify as pumps (strong move on
//! unusual volume) or top movers (best positive change of the scan).

use crate::config::TradingConfig;
use crate::types::{Bar, Quote};
use rust_decimal::prelude::*;
use std::collections::HashSet;

/// Bars averaged for the pump volume baseline
pub const VOLUME_BASELINE_BARS: usize = 20;

/// Where an entry candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Watchlist,
    Pump,
    TopMover,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Watchlist => "watchlist",
            CandidateSource::Pump => "pump",
            CandidateSource::TopMover => "top_mover",
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest quote plus daily history for one symbol
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub quote: Quote,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub snapshot: MarketSnapshot,
    pub source: CandidateSource,
}

impl Candidate {
    pub fn symbol(&self) -> &str {
        &self.snapshot.quote.symbol
    }
}

pub struct MarketScanner {
    config: TradingConfig,
}

impl MarketScanner {
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    /// Symbols whose data the scan needs, watchlist first, without duplicates
    pub fn symbols_to_fetch(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        if self.config.enable_watchlist_trading {
            symbols.extend(self.config.watchlist.iter().cloned());
        }
        if self.config.enable_pump_trading || self.config.enable_top_stock_trading {
            symbols.extend(self.config.scan_universe.iter().cloned());
        }
        symbols.retain(|s| seen.insert(s.clone()));
        symbols
    }

    /// Tag snapshots by source: watchlist, then pumps, then top movers.
    ///
    /// Universe symbols that match neither rule are dropped.
    pub fn select(&self, snapshots: Vec<MarketSnapshot>) -> Vec<Candidate> {
        let watchlist: HashSet<&str> = if self.config.enable_watchlist_trading {
            self.config.watchlist.iter().map(String::as_str).collect()
        } else {
            HashSet::new()
        };

        let mut listed = Vec::new();
        let mut pumps = Vec::new();
        let mut rest = Vec::new();
        for snapshot in snapshots {
            if watchlist.contains(snapshot.quote.symbol.as_str()) {
                listed.push(snapshot);
            } else if self.config.enable_pump_trading && self.is_pump(&snapshot) {
                pumps.push(snapshot);
            } else {
                rest.push(snapshot);
            }
        }

        let movers = if self.config.enable_top_stock_trading {
            top_movers(rest, self.config.top_movers_count)
        } else {
            Vec::new()
        };

        let tag = |source: CandidateSource| move |snapshot: MarketSnapshot| Candidate { snapshot, source };
        listed
            .into_iter()
            .map(tag(CandidateSource::Watchlist))
            .chain(pumps.into_iter().map(tag(CandidateSource::Pump)))
            .chain(movers.into_iter().map(tag(CandidateSource::TopMover)))
            .collect()
    }

    /// Day change at or above the pump threshold on volume well above the baseline
    pub fn is_pump(&self, snapshot: &MarketSnapshot) -> bool {
        if snapshot.quote.change_pct < self.config.pump_min_change_pct {
            return false;
        }
        let Some(baseline) = average_volume(&snapshot.bars, VOLUME_BASELINE_BARS) else {
            return false;
        };
        Decimal::from(snapshot.quote.volume) >= baseline * self.config.pump_volume_ratio
    }
}

/// Up to `count` snapshots with the largest positive day change
pub fn top_movers(mut snapshots: Vec<MarketSnapshot>, count: usize) -> Vec<MarketSnapshot> {
    snapshots.retain(|s| s.quote.change_pct > Decimal::ZERO);
    snapshots.sort_by(|a, b| b.quote.change_pct.cmp(&a.quote.change_pct));
    snapshots.truncate(count);
    snapshots
}

/// Mean volume of the last `n` bars; None without history
pub fn average_volume(bars: &[Bar], n: usize) -> Option<Decimal> {
    let window = &bars[bars.len().saturating_sub(n)..];
    if window.is_empty() {
        return None;
    }
    let total: f64 = window.iter().map(|b| b.volume).sum();
    Decimal::from_f64(total / window.len() as f64).filter(|v| *v > Decimal::ZERO)
}
