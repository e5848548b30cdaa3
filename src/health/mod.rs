//! System health checks
//!
//! Used by the main loop, the `/health` endpoint and the `health-check`
//! container probe. A report is critical when any single check is.

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::Result;
use crate::market::{MarketClock, MarketStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Heartbeats older than this many loop intervals are stale
pub const HEARTBEAT_STALE_FACTOR: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ HEALTHY"),
            HealthStatus::Warning => write!(f, "⚠️ WARNING"),
            HealthStatus::Critical => write!(f, "❌ CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
}

impl ComponentCheck {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn healthy(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy, message)
    }

    pub fn warning(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Warning, message)
    }

    pub fn critical(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Critical, message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub system_status: HealthStatus,
    pub paper_trading: bool,
    pub market_status: MarketStatus,
    pub checks: Vec<ComponentCheck>,
}

impl HealthReport {
    /// Overall status is the worst component status
    pub fn from_checks(
        checks: Vec<ComponentCheck>,
        paper_trading: bool,
        market_status: MarketStatus,
        at: DateTime<Utc>,
    ) -> Self {
        let system_status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            timestamp: at,
            system_status,
            paper_trading,
            market_status,
            checks,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.system_status == HealthStatus::Critical
    }

    /// Process exit code for the container probe
    pub fn exit_code(&self) -> i32 {
        if self.is_critical() {
            1
        } else {
            0
        }
    }

    pub fn problems(&self) -> impl Iterator<Item = &ComponentCheck> {
        self.checks.iter().filter(|c| c.status != HealthStatus::Healthy)
    }
}

/// Runtime facts the checker cannot derive from config alone
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub halted: Option<String>,
}

pub struct HealthChecker {
    config: Config,
    clock: MarketClock,
}

impl HealthChecker {
    pub fn new(config: Config) -> Self {
        let clock = MarketClock::from_config(&config.trading);
        Self { config, clock }
    }

    pub fn run(&self, runtime: &RuntimeSnapshot, now: DateTime<Utc>) -> HealthReport {
        let mut checks = self.check_directories();
        checks.push(self.check_config());
        checks.push(self.check_heartbeat(runtime.last_heartbeat, now));
        checks.push(check_trading(runtime.halted.as_deref()));
        checks.push(self.check_telegram());
        HealthReport::from_checks(
            checks,
            self.config.paper_trading(),
            self.clock.status(now),
            now,
        )
    }

    /// Probe checks only: no heartbeat, since no loop runs in this process
    pub fn run_local(&self, now: DateTime<Utc>) -> HealthReport {
        let mut checks = self.check_directories();
        checks.push(self.check_config());
        checks.push(self.check_telegram());
        HealthReport::from_checks(
            checks,
            self.config.paper_trading(),
            self.clock.status(now),
            now,
        )
    }

    pub fn check_directories(&self) -> Vec<ComponentCheck> {
        let system = &self.config.system;
        [
            ("data_dir", &system.data_dir),
            ("logs_dir", &system.logs_dir),
            ("reports_dir", &system.reports_dir),
            ("config_dir", &system.config_dir),
        ]
        .into_iter()
        .map(|(name, dir)| check_writable(name, dir))
        .collect()
    }

    pub fn check_config(&self) -> ComponentCheck {
        match self.config.validate() {
            Ok(()) => ComponentCheck::healthy("config", "configuration valid"),
            Err(e) => ComponentCheck::critical("config", e.to_string()),
        }
    }

    pub fn check_heartbeat(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ComponentCheck {
        let limit = self.config.system.loop_interval_secs * HEARTBEAT_STALE_FACTOR;
        match last {
            None => ComponentCheck::warning("main_loop", "no heartbeat yet"),
            Some(at) => {
                let age = (now - at).num_seconds().max(0) as u64;
                if age > limit {
                    ComponentCheck::critical(
                        "main_loop",
                        format!("heartbeat stale: {}s old (limit {}s)", age, limit),
                    )
                } else {
                    ComponentCheck::healthy("main_loop", format!("heartbeat {}s ago", age))
                }
            }
        }
    }

    pub fn check_telegram(&self) -> ComponentCheck {
        if self.config.telegram().is_some() {
            ComponentCheck::healthy("telegram", "configured")
        } else {
            ComponentCheck::warning("telegram", "not configured, notifications disabled")
        }
    }
}

pub fn check_trading(halted: Option<&str>) -> ComponentCheck {
    match halted {
        Some(reason) => ComponentCheck::warning("trading", format!("halted: {}", reason)),
        None => ComponentCheck::healthy("trading", "active"),
    }
}

/// Directory exists and accepts a file write
fn check_writable(name: &str, dir: &Path) -> ComponentCheck {
    if !dir.is_dir() {
        return ComponentCheck::critical(name, format!("{} missing", dir.display()));
    }
    let probe = dir.join(".health_probe");
    let written = std::fs::write(&probe, b"ok").and_then(|_| std::fs::remove_file(&probe));
    match written {
        Ok(()) => ComponentCheck::healthy(name, format!("{} writable", dir.display())),
        Err(e) => ComponentCheck::critical(name, format!("{} not writable: {}", dir.display(), e)),
    }
}

/// Query a running instance's `/health` endpoint
pub async fn probe_endpoint(port: u16, timeout: Duration) -> Result<HealthReport> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let url = format!("http://127.0.0.1:{}/health", port);
    // 503 still carries a report body
    let report = client.get(&url).send().await?.json::<HealthReport>().await?;
    Ok(report)
}
