//! Status API
//!
//! Read-only HTTP endpoints over the live engine state. `/health` answers
//! 503 when the system is critical so container probes can act on it.

use super::PerformanceStats;
use crate::health::{ComponentCheck, HealthReport, HealthStatus, HEARTBEAT_STALE_FACTOR};
use crate::market::MarketStatus;
use crate::paper::PortfolioSummary;
use crate::types::{Position, Trade};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Most recent trades kept for `/trades`
pub const MAX_RECENT_TRADES: usize = 200;

/// Engine-level status published each loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub paper_trading: bool,
    pub market_status: MarketStatus,
    pub paused: bool,
    pub halted: Option<String>,
    pub loop_count: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub portfolio: Option<PortfolioSummary>,
    pub model_loaded: bool,
}

/// Status state shared across handlers
pub struct StatusState {
    pub snapshot: RwLock<StatusSnapshot>,
    pub positions: RwLock<Vec<Position>>,
    pub trades: RwLock<Vec<Trade>>,
    pub last_report: RwLock<Option<HealthReport>>,
    loop_interval_secs: u64,
}

impl StatusState {
    pub fn new(paper_trading: bool, loop_interval_secs: u64) -> Self {
        Self {
            snapshot: RwLock::new(StatusSnapshot {
                version: env!("CARGO_PKG_VERSION").to_string(),
                started_at: Utc::now(),
                paper_trading,
                market_status: MarketStatus::Closed,
                paused: false,
                halted: None,
                loop_count: 0,
                last_heartbeat: None,
                portfolio: None,
                model_loaded: false,
            }),
            positions: RwLock::new(Vec::new()),
            trades: RwLock::new(Vec::new()),
            last_report: RwLock::new(None),
            loop_interval_secs,
        }
    }

    pub async fn record_trade(&self, trade: Trade) {
        let mut trades = self.trades.write().await;
        trades.push(trade);
        if trades.len() > MAX_RECENT_TRADES {
            let excess = trades.len() - MAX_RECENT_TRADES;
            trades.drain(..excess);
        }
    }

    /// Replace the buffer with stored history, oldest first
    pub async fn load_trades(&self, mut history: Vec<Trade>) {
        history.sort_by_key(|t| t.timestamp);
        let excess = history.len().saturating_sub(MAX_RECENT_TRADES);
        history.drain(..excess);
        *self.trades.write().await = history;
    }

    pub async fn set_positions(&self, positions: Vec<Position>) {
        *self.positions.write().await = positions;
    }

    pub async fn set_report(&self, report: HealthReport) {
        *self.last_report.write().await = Some(report);
    }

    /// Last full report with the heartbeat re-evaluated against `now`
    pub async fn current_health(&self, now: DateTime<Utc>) -> HealthReport {
        let snapshot = self.snapshot.read().await.clone();
        let mut checks: Vec<ComponentCheck> = match &*self.last_report.read().await {
            Some(report) => report
                .checks
                .iter()
                .filter(|c| c.name != "main_loop")
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let limit = self.loop_interval_secs * HEARTBEAT_STALE_FACTOR;
        let heartbeat = match snapshot.last_heartbeat {
            None => ComponentCheck::warning("main_loop", "starting"),
            Some(at) => {
                let age = (now - at).num_seconds().max(0) as u64;
                if age > limit {
                    ComponentCheck::critical("main_loop", format!("heartbeat stale: {}s old", age))
                } else {
                    ComponentCheck::healthy("main_loop", format!("heartbeat {}s ago", age))
                }
            }
        };
        checks.push(heartbeat);

        HealthReport::from_checks(checks, snapshot.paper_trading, snapshot.market_status, now)
    }
}

// ============ HTTP API Handlers ============

async fn health_check(
    State(state): State<Arc<StatusState>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = state.current_health(Utc::now()).await;
    let code = if report.system_status == HealthStatus::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

async fn get_status(State(state): State<Arc<StatusState>>) -> Json<StatusSnapshot> {
    Json(state.snapshot.read().await.clone())
}

async fn get_positions(State(state): State<Arc<StatusState>>) -> Json<Vec<Position>> {
    Json(state.positions.read().await.clone())
}

#[derive(Debug, Deserialize)]
struct TradesQuery {
    limit: Option<usize>,
}

/// Newest first
async fn get_trades(
    State(state): State<Arc<StatusState>>,
    Query(query): Query<TradesQuery>,
) -> Json<Vec<Trade>> {
    let limit = query.limit.unwrap_or(50);
    let trades = state.trades.read().await;
    Json(trades.iter().rev().take(limit).cloned().collect())
}

async fn get_stats(State(state): State<Arc<StatusState>>) -> Json<PerformanceStats> {
    let trades = state.trades.read().await;
    Json(PerformanceStats::from_trades(&trades))
}

/// Create status router
pub fn create_router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/positions", get(get_positions))
        .route("/trades", get(get_trades))
        .route("/stats", get(get_stats))
        .with_state(state)
}

/// Serve the status API until the listener fails
pub async fn start_status_server(state: Arc<StatusState>, port: u16) -> crate::error::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status server listening on http://{}", addr);
    serve(listener, state).await
}

pub async fn serve(listener: tokio::net::TcpListener, state: Arc<StatusState>) -> crate::error::Result<()> {
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
