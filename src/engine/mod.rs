//! Trading system lifecycle
//!
//! Startup, the periodic trading loop and graceful shutdown. One cycle:
//! roll the trading day, run health checks, manage open positions, scan
//! for entries unless the index is weak, write end-of-day reports, refit
//! the model, track drawdown and publish a heartbeat.


use crate::client::{yahoo, NewsClient, QuoteSource, Sentiment, YahooClient};
use crate::config::Config;
use crate::error::{BotError, Result};
use crate::health::{HealthChecker, RuntimeSnapshot};
use crate::market::MarketClock;
use crate::ml::{FeatureExtractor, ScoringModel, TrainParams};
use crate::monitor::{
    start_status_server, PerformanceStats, ReportWriter, StatusState, MAX_RECENT_TRADES,
};
use crate::notify::{escape_html, Notifier};
use crate::paper::{PaperBroker, PaperConfig, PortfolioSummary};
use crate::risk::{ExitReason, HaltReason, RiskManager};
use crate::storage::Database;
use crate::strategy::{Candidate, MarketScanner, MarketSnapshot, SignalGenerator};
use crate::telegram::{BotCommand, CommandHandler, TelegramBot};
use crate::types::Trade;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Calendar days of history requested per symbol for feature extraction
const HISTORY_DAYS: u32 = 90;
/// Calendar days of history per symbol for the daily refit
const TRAINING_HISTORY_DAYS: u32 = 365;
/// Minutes between position update notifications while the market is open
const POSITION_UPDATE_MINUTES: i64 = 15;

/// Startup switches from the command line
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Force paper mode regardless of the config file
    pub force_paper: bool,
}

#[derive(Debug, Default)]
struct CycleState {
    trading_day: Option<NaiveDate>,
    last_health_check: Option<DateTime<Utc>>,
    last_position_update: Option<DateTime<Utc>>,
    daily_report_for: Option<NaiveDate>,
    model_trained_for: Option<NaiveDate>,
    loop_count: u64,
}

pub struct TradingSystem {
    config: Config,
    clock: MarketClock,
    quotes: Arc<dyn QuoteSource>,
    news: Option<NewsClient>,
    signals: SignalGenerator,
    scanner: MarketScanner,
    model: RwLock<Option<Arc<ScoringModel>>>,
    broker: PaperBroker,
    risk: Mutex<RiskManager>,
    db: Option<Database>,
    notifier: Notifier,
    status: Arc<StatusState>,
    health: HealthChecker,
    reports: ReportWriter,
    paused: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    cycle: Mutex<CycleState>,
}

/// Create every directory the system writes into
pub fn prepare_directories(config: &Config) -> Result<()> {
    for dir in config.required_dirs() {
        std::fs::create_dir_all(&dir)?;
        debug!("Ensured directory {}", dir.display());
    }
    Ok(())
}

impl TradingSystem {
    /// Build the system with the Yahoo quote source
    pub async fn new(mut config: Config, opts: EngineOptions) -> Result<Self> {
        if opts.force_paper {
            config.system.enable_paper_trading = true;
        }
        if !config.paper_trading() {
            return Err(BotError::Config(
                "Live trading requested but no broker integration is available; \
                 set system.enable_paper_trading or pass --paper-trading"
                    .to_string(),
            ));
        }

        let quotes: Arc<dyn QuoteSource> = Arc::new(YahooClient::new(yahoo::DEFAULT_BASE_URL)?);
        let notifier = Notifier::new(&config);
        Self::build(config, quotes, notifier).await
    }

    /// Build with explicit collaborators
    pub async fn build(
        config: Config,
        quotes: Arc<dyn QuoteSource>,
        notifier: Notifier,
    ) -> Result<Self> {
        prepare_directories(&config)?;

        let model_path = &config.trading.model_path;
        let model = if model_path.exists() {
            let model = ScoringModel::load(model_path)?;
            info!(
                "Loaded scoring model from {} ({} samples)",
                model_path.display(),
                model.training_samples
            );
            Some(model)
        } else {
            warn!(
                "No model at {}, running in monitor-only mode (train with train_model)",
                model_path.display()
            );
            None
        };

        let broker = PaperBroker::new(PaperConfig::in_dir(
            &config.system.data_dir,
            config.trading.initial_capital,
        ));
        broker.load_state().await?;
        let equity = broker.equity().await;

        let db = match Database::connect(&config.system.database_url).await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("Trade database unavailable, continuing without it: {}", e);
                None
            }
        };

        let news = match &config.secrets.news_api_key {
            Some(key) => Some(NewsClient::new(crate::client::news::DEFAULT_BASE_URL, key)?),
            None => None,
        };

        let status = Arc::new(StatusState::new(
            config.paper_trading(),
            config.system.loop_interval_secs,
        ));
        status.snapshot.write().await.model_loaded = model.is_some();
        if let Some(db) = &db {
            match db.recent_trades(MAX_RECENT_TRADES as u32).await {
                Ok(history) => {
                    debug!("Loaded {} stored trades into the status buffer", history.len());
                    status.load_trades(history).await;
                }
                Err(e) => warn!("Could not load stored trades: {}", e),
            }
        }

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            clock: MarketClock::from_config(&config.trading),
            quotes,
            news,
            signals: SignalGenerator::new(config.trading.clone(), config.risk_management.clone()),
            scanner: MarketScanner::new(config.trading.clone()),
            model: RwLock::new(model.map(Arc::new)),
            broker,
            risk: Mutex::new(RiskManager::new(
                config.risk_management.clone(),
                config.trading.max_daily_trades,
                equity,
            )),
            db,
            notifier,
            status,
            health: HealthChecker::new(config.clone()),
            reports: ReportWriter::new(config.system.reports_dir.clone()),
            paused: AtomicBool::new(false),
            shutdown_tx,
            cycle: Mutex::new(CycleState::default()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn broker(&self) -> &PaperBroker {
        &self.broker
    }

    pub fn status_state(&self) -> Arc<StatusState> {
        self.status.clone()
    }

    pub fn model_loaded(&self) -> bool {
        self.model.read().is_some()
    }

    fn current_model(&self) -> Option<Arc<ScoringModel>> {
        self.model.read().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub async fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        info!("Trading {}", if paused { "paused" } else { "unpaused" });
        self.status.snapshot.write().await.paused = paused;
    }

    /// Unpause and clear any risk halt
    pub async fn resume(&self) {
        let equity = self.broker.equity().await;
        self.risk.lock().resume(equity);
        self.set_paused(false).await;
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.risk.lock().halted().map(|r| r.to_string())
    }

    pub fn request_stop(&self) {
        info!("Shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    pub fn stop_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Chat `/stop`: block entries for the rest of the run, then shut down
    pub fn operator_stop(&self) {
        self.risk.lock().halt(HaltReason::Manual);
        self.request_stop();
    }

    /// Run until `/stop`, Ctrl-C or a fatal cycle error
    pub async fn start(self: Arc<Self>) -> Result<()> {
        self.print_banner();

        let started_at = Utc::now();
        let report = self.health.run(&RuntimeSnapshot::default(), started_at);
        info!("Initial health check: {}", report.system_status);
        for problem in report.problems() {
            warn!("  {}: {}", problem.name, problem.message);
        }
        if report.is_critical() {
            self.notifier
                .critical_alert("Startup health check", &problem_lines(&report))
                .await;
        }
        self.status.set_report(report).await;
        self.cycle.lock().last_health_check = Some(started_at);

        self.notifier.startup(self.config.paper_trading(), started_at).await;
        self.print_config_summary();

        let status = self.status.clone();
        let port = self.config.system.status_port;
        tokio::spawn(async move {
            if let Err(e) = start_status_server(status, port).await {
                error!("Status server stopped: {}", e);
            }
        });

        let (command_tx, command_rx) = mpsc::channel::<BotCommand>(100);
        match self.config.telegram() {
            Some(creds) => {
                let bot = Arc::new(TelegramBot::new(&creds, command_tx));
                tokio::spawn(bot.start_polling());
                info!("Telegram command listener started");
            }
            None => drop(command_tx),
        }

        let system = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received");
                system.request_stop();
            }
        });

        let outcome = self.main_loop(command_rx, Utc::now).await;
        let reason = match &outcome {
            Ok(()) => "operator request".to_string(),
            Err(e) => format!("fatal error: {}", e),
        };
        self.shutdown(&reason).await;
        outcome
    }

    async fn main_loop<F>(&self, mut commands: mpsc::Receiver<BotCommand>, now: F) -> Result<()>
    where
        F: Fn() -> DateTime<Utc>,
    {
        let handler = CommandHandler::new(self.notifier.clone());
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.system.loop_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "Main loop running every {}s",
            self.config.system.loop_interval_secs
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(cmd) = commands.recv() => {
                    handler.handle(cmd, self).await;
                    continue;
                }
                _ = shutdown.changed() => {}
            }
            if self.stop_requested() {
                break;
            }

            if let Err(e) = self.run_cycle(now()).await {
                error!("Trading cycle failed: {}", e);
                if !self.config.system.auto_restart_on_error {
                    self.notifier
                        .critical_alert("Trading loop stopped", &e.to_string())
                        .await;
                    return Err(e);
                }
                self.notifier
                    .error("Trading cycle failed, continuing", &e.to_string())
                    .await;
            }
        }
        Ok(())
    }

    /// One pass of the trading loop at `now`
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<()> {
        let day = self.clock.trading_day(now);
        let (new_day, health_due) = {
            let mut cycle = self.cycle.lock();
            cycle.loop_count += 1;
            let new_day = cycle.trading_day.is_some_and(|d| d != day);
            cycle.trading_day = Some(day);
            let interval = ChronoDuration::seconds(self.config.system.health_check_interval as i64);
            let health_due = cycle
                .last_health_check
                .map_or(true, |last| now - last >= interval);
            if health_due {
                cycle.last_health_check = Some(now);
            }
            (new_day, health_due)
        };

        if new_day {
            info!("New trading day {}, resetting daily risk counters", day);
            self.risk.lock().reset_day();
        }

        if health_due {
            self.periodic_health_check(now).await;
        }

        if self.clock.is_open(now) {
            self.manage_positions(now).await?;
            self.maybe_send_position_update(now).await;

            if self.clock.trading_window_open(now) && self.entries_allowed() {
                if self.market_is_weak().await {
                    info!("Market weak, skipping entry scan");
                } else {
                    self.scan_for_entries().await?;
                }
            }
        }

        let report_due = self.clock.is_after_close(now)
            && self.cycle.lock().daily_report_for != Some(day);
        if report_due {
            self.end_of_day(day).await?;
            self.cycle.lock().daily_report_for = Some(day);
        }

        let training_due = self.config.trading.daily_model_training
            && self.clock.is_after_close(now)
            && self.cycle.lock().model_trained_for != Some(day);
        if training_due {
            self.cycle.lock().model_trained_for = Some(day);
            match self.retrain_model().await {
                Ok(samples) => info!("Daily model refit on {} samples", samples),
                Err(e) => warn!("Daily model refit failed, keeping current model: {}", e),
            }
        }

        let equity = self.broker.equity().await;
        let breached = self.risk.lock().update_equity(equity);
        if breached {
            self.emergency_stop(equity).await;
        }

        self.publish_status(now).await;
        Ok(())
    }

    fn entries_allowed(&self) -> bool {
        if self.is_paused() || !self.model_loaded() {
            return false;
        }
        !self.risk.lock().is_halted()
    }

    async fn periodic_health_check(&self, now: DateTime<Utc>) {
        let runtime = RuntimeSnapshot {
            last_heartbeat: self.status.snapshot.read().await.last_heartbeat,
            halted: self.halt_reason(),
        };
        let report = self.health.run(&runtime, now);
        info!("Health check: {}", report.system_status);
        if report.is_critical() {
            self.notifier
                .critical_alert("Health check failed", &problem_lines(&report))
                .await;
        }
        self.status.set_report(report).await;
    }

    /// Mark positions and apply exits; flatten everything near the close
    async fn manage_positions(&self, now: DateTime<Utc>) -> Result<()> {
        let flatten = self.clock.should_flatten(now);

        for position in self.broker.positions().await {
            let quote = match self.quotes.quote(&position.symbol).await {
                Ok(q) => q,
                Err(e) => {
                    warn!("No quote for held {}: {}", position.symbol, e);
                    continue;
                }
            };
            self.broker.mark(&position.symbol, quote.price).await?;

            if flatten {
                info!("Market close approaching, closing {}", position.symbol);
                self.close_position(&position.symbol, quote.price, None, ExitReason::MarketClose)
                    .await?;
                continue;
            }

            let Some(marked) = self.broker.position(&position.symbol).await else {
                continue;
            };
            let exit = self.risk.lock().evaluate_exit(&marked, quote.price);
            if let Some(exit) = exit {
                info!(
                    "{} exit for {}: {} shares @ ${:.2}",
                    exit.reason, marked.symbol, exit.shares, quote.price
                );
                self.close_position(&marked.symbol, quote.price, Some(exit.shares), exit.reason)
                    .await?;
            }
        }
        Ok(())
    }

    /// True when the market index is down more than the configured drop today
    async fn market_is_weak(&self) -> bool {
        let index = &self.config.trading.market_index_symbol;
        if index.is_empty() {
            return false;
        }
        match self.quotes.quote(index).await {
            Ok(quote) => quote.change_pct < -self.config.trading.weak_market_drop_pct,
            Err(e) => {
                warn!("Index quote for {} failed: {}", index, e);
                false
            }
        }
    }

    async fn scan_for_entries(&self) -> Result<()> {
        let Some(model) = self.current_model() else {
            return Ok(());
        };

        let mut snapshots = Vec::new();
        for symbol in self.scanner.symbols_to_fetch() {
            if self.broker.position(&symbol).await.is_some() {
                continue;
            }
            if let Some(snapshot) = self.fetch_snapshot(&symbol).await {
                snapshots.push(snapshot);
            }
        }

        for candidate in self.scanner.select(snapshots) {
            if !self.try_enter(&candidate, &model).await? {
                break;
            }
        }
        Ok(())
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Option<MarketSnapshot> {
        let quote = match self.quotes.quote(symbol).await {
            Ok(q) => q,
            Err(e) => {
                warn!("Quote failed for {}: {}", symbol, e);
                return None;
            }
        };
        match self.quotes.history(symbol, HISTORY_DAYS).await {
            Ok(bars) => Some(MarketSnapshot { quote, bars }),
            Err(e) => {
                warn!("History failed for {}: {}", symbol, e);
                None
            }
        }
    }

    /// Enter one candidate if its signal and the risk checks pass.
    ///
    /// Returns false once a halt means no further entries this cycle.
    async fn try_enter(&self, candidate: &Candidate, model: &ScoringModel) -> Result<bool> {
        let symbol = candidate.symbol();
        let MarketSnapshot { quote, bars } = &candidate.snapshot;

        let signal = match self.signals.check(quote, bars, model) {
            Ok(signal) => signal,
            Err(reason) => {
                debug!("Skip {} ({}): {}", symbol, candidate.source, reason);
                return Ok(true);
            }
        };

        if let Some(news) = &self.news {
            if news.sentiment(symbol).await == Sentiment::Negative {
                info!("Skip {}: negative news sentiment", symbol);
                return Ok(true);
            }
        }

        let equity = self.broker.equity().await;
        let exposure = self.broker.exposure().await;
        let shares = self.risk.lock().position_size(equity, signal.price);
        if shares == 0 {
            debug!("Skip {}: position size rounds to zero", symbol);
            return Ok(true);
        }
        let notional = signal.price * Decimal::from(shares);

        let checked = self.risk.lock().check_entry(symbol, notional, exposure, equity);
        match checked {
            Ok(()) => {}
            Err(e) if e.is_risk_rejection() => {
                info!("Entry blocked for {}: {}", symbol, e);
                return Ok(!self.risk.lock().is_halted());
            }
            Err(e) => return Err(e),
        }

        info!(
            "🎯 {} signal {} score {:.1} @ ${:.2} (SL {:.2} / TP1 {:.2} / TP2 {:.2}, R:R {})",
            candidate.source,
            symbol,
            signal.score,
            signal.price,
            signal.stop_loss,
            signal.take_profit_1,
            signal.take_profit_2,
            signal.risk_reward
        );
        let reason = format!("{} signal score {:.1}", candidate.source, signal.score);
        let trade = self.open_position(symbol, signal.price, shares, &reason).await?;
        self.notifier.trade_opened(&trade, Some(signal.score)).await;
        Ok(true)
    }

    /// Refit the model on fresh history for the watchlist and the model's own symbols.
    ///
    /// The new model replaces the live one and is saved to `model_path`.
    /// Returns the number of training samples.
    pub async fn retrain_model(&self) -> Result<usize> {
        let mut symbols = self.config.trading.watchlist.clone();
        if let Some(model) = self.current_model() {
            for symbol in &model.symbols {
                if !symbols.contains(symbol) {
                    symbols.push(symbol.clone());
                }
            }
        }
        if symbols.is_empty() {
            return Err(BotError::InsufficientData("no symbols to train on".to_string()));
        }

        let extractor = FeatureExtractor::default();
        let mut samples = Vec::new();
        for symbol in &symbols {
            match self.quotes.history(symbol, TRAINING_HISTORY_DAYS).await {
                Ok(bars) => samples.extend(extractor.training_samples(&bars)),
                Err(e) => warn!("Training history failed for {}: {}", symbol, e),
            }
        }

        let model = ScoringModel::train(&samples, &TrainParams::default(), symbols)?;
        model.save(&self.config.trading.model_path)?;
        let metrics = model.evaluate(&samples);
        info!(
            "Model refit: accuracy {:.3}, precision {:.3}, base rate {:.3}",
            metrics.accuracy, metrics.precision, metrics.base_rate
        );

        *self.model.write() = Some(Arc::new(model));
        self.status.snapshot.write().await.model_loaded = true;
        Ok(samples.len())
    }

    async fn open_position(&self, symbol: &str, price: Decimal, shares: u64, reason: &str) -> Result<Trade> {
        let trade = self.broker.buy(symbol, price, shares, reason).await?;
        self.risk.lock().record_entry();
        self.record_trade(&trade).await;
        Ok(trade)
    }

    /// Sell `shares` (all when None) and book the result
    async fn close_position(
        &self,
        symbol: &str,
        price: Decimal,
        shares: Option<u64>,
        reason: ExitReason,
    ) -> Result<Trade> {
        let trade = self.broker.sell(symbol, price, shares, reason.as_str()).await?;
        if reason == ExitReason::TakeProfit1 && self.broker.position(symbol).await.is_some() {
            self.broker.set_first_target_taken(symbol).await?;
        }

        let equity = self.broker.equity().await;
        self.risk
            .lock()
            .record_close(trade.pnl.unwrap_or_default(), equity);
        self.record_trade(&trade).await;
        self.notifier.trade_closed(&trade).await;
        Ok(trade)
    }

    async fn record_trade(&self, trade: &Trade) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_trade(trade).await {
                warn!("Failed to persist trade {}: {}", trade.id, e);
            }
        }
        self.status.record_trade(trade.clone()).await;
    }

    /// Close everything at the latest price, falling back to the last mark
    pub async fn close_all(&self, reason: ExitReason) -> Result<Vec<Trade>> {
        let mut closed = Vec::new();
        for position in self.broker.positions().await {
            let price = match self.quotes.quote(&position.symbol).await {
                Ok(q) => q.price,
                Err(e) => {
                    warn!(
                        "No quote for {} ({}), closing at last mark ${:.2}",
                        position.symbol, e, position.current_price
                    );
                    position.current_price
                }
            };
            closed.push(self.close_position(&position.symbol, price, None, reason).await?);
        }
        Ok(closed)
    }

    async fn emergency_stop(&self, equity: Decimal) {
        let peak = self.risk.lock().peak_equity();
        let detail = format!(
            "Drawdown limit breached: equity ${:.2} vs peak ${:.2}. New entries halted.",
            equity, peak
        );
        error!("{}", detail);

        if self.config.system.emergency_shutdown_trigger {
            match self.close_all(ExitReason::Emergency).await {
                Ok(trades) => info!("Emergency close: {} positions closed", trades.len()),
                Err(e) => error!("Emergency close failed: {}", e),
            }
        }
        self.notifier.critical_alert("Max drawdown", &detail).await;
    }

    async fn maybe_send_position_update(&self, now: DateTime<Utc>) {
        let due = {
            let mut cycle = self.cycle.lock();
            let due = cycle
                .last_position_update
                .map_or(true, |last| now - last >= ChronoDuration::minutes(POSITION_UPDATE_MINUTES));
            if due {
                cycle.last_position_update = Some(now);
            }
            due
        };
        if due {
            let positions = self.broker.positions().await;
            let summary = self.broker.summary().await;
            self.notifier.position_update(&positions, &summary).await;
        }
    }

    async fn end_of_day(&self, day: NaiveDate) -> Result<()> {
        let summary = self.broker.summary().await;
        let trades = self.trades_for_day(day).await;
        self.reports.write_daily(day, &summary, &trades).await?;

        let stats = PerformanceStats::from_trades(&trades);
        self.notifier.daily_summary(day, &summary, &stats).await;
        Ok(())
    }

    async fn trades_for_day(&self, day: NaiveDate) -> Vec<Trade> {
        self.broker
            .history()
            .await
            .into_iter()
            .filter(|t| self.clock.trading_day(t.timestamp) == day)
            .collect()
    }

    async fn publish_status(&self, now: DateTime<Utc>) {
        let summary = self.broker.summary().await;
        let positions = self.broker.positions().await;
        let loop_count = self.cycle.lock().loop_count;
        let halted = self.halt_reason();
        {
            let mut snapshot = self.status.snapshot.write().await;
            snapshot.market_status = self.clock.status(now);
            snapshot.paused = self.is_paused();
            snapshot.halted = halted;
            snapshot.loop_count = loop_count;
            snapshot.last_heartbeat = Some(now);
            snapshot.portfolio = Some(summary);
        }
        self.status.set_positions(positions).await;
    }

    /// Persist state and announce the stop
    pub async fn shutdown(&self, reason: &str) {
        info!("Shutting down: {}", reason);
        if let Err(e) = self.broker.save_state().await {
            error!("Failed to save paper state: {}", e);
        }
        let summary = self.broker.summary().await;
        self.notifier.shutdown(reason, Some(&summary)).await;
        info!(
            "Final equity ${:.2}, total P&L {:+.2}",
            summary.total_value, summary.total_pnl
        );
    }

    // ============ Manual trading ============

    pub async fn manual_buy(&self, symbol: &str, usd: Decimal) -> Result<Trade> {
        let quote = self.quotes.quote(symbol).await?;
        if quote.price <= Decimal::ZERO {
            return Err(BotError::Execution(format!("No valid price for {}", symbol)));
        }
        let shares = (usd / quote.price)
            .floor()
            .to_u64()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                BotError::Execution(format!("${:.2} buys no whole shares at ${:.2}", usd, quote.price))
            })?;

        let notional = quote.price * Decimal::from(shares);
        let equity = self.broker.equity().await;
        let exposure = self.broker.exposure().await;
        self.risk.lock().check_entry(symbol, notional, exposure, equity)?;

        let trade = self.open_position(symbol, quote.price, shares, "manual").await?;
        self.notifier.trade_opened(&trade, None).await;
        Ok(trade)
    }

    pub async fn manual_sell(&self, symbol: &str, shares: Option<u64>) -> Result<Trade> {
        let position = self
            .broker
            .position(symbol)
            .await
            .ok_or_else(|| BotError::PositionNotFound(symbol.to_string()))?;
        let price = match self.quotes.quote(symbol).await {
            Ok(q) => q.price,
            Err(e) => {
                warn!("Quote failed for {}, selling at last mark: {}", symbol, e);
                position.current_price
            }
        };
        self.close_position(symbol, price, shares, ExitReason::Manual).await
    }

    // ============ Chat replies ============

    pub async fn status_text(&self) -> String {
        let now = Utc::now();
        let summary = self.broker.summary().await;
        let snapshot = self.status.snapshot.read().await.clone();
        let daily = self.risk.lock().daily().clone();

        let state = if let Some(reason) = self.halt_reason() {
            format!("⛔ HALTED ({})", escape_html(&reason))
        } else if self.is_paused() {
            "⏸ PAUSED".to_string()
        } else {
            "▶️ RUNNING".to_string()
        };
        let uptime = (now - snapshot.started_at).num_minutes();

        format!(
            "💰 <b>System Status</b>\n\n\
            State: {}\n\
            Mode: {}\n\
            Market: {}\n\
            Model: {}\n\
            Equity: <code>${:.2}</code>\n\
            Cash: <code>${:.2}</code>\n\
            Open positions: {}\n\
            Trades today: {}\n\
            Realized today: <code>{:+.2}</code>\n\
            Loops: {} | Uptime: {}h {}m",
            state,
            if self.config.paper_trading() { "📝 PAPER" } else { "💵 LIVE" },
            self.clock.status(now),
            if self.model_loaded() { "loaded" } else { "missing (monitor only)" },
            summary.total_value,
            summary.cash_balance,
            summary.open_positions,
            daily.trades_today,
            daily.realized_pnl_today,
            snapshot.loop_count,
            uptime / 60,
            uptime % 60,
        )
    }

    pub async fn stats_text(&self) -> String {
        let history = self.broker.history().await;
        let stats = PerformanceStats::from_trades(&history);
        let summary = self.broker.summary().await;
        format_stats(&stats, &summary)
    }

    pub async fn positions_text(&self) -> String {
        let positions = self.broker.positions().await;
        if positions.is_empty() {
            return "📭 No open positions".to_string();
        }
        let mut text = String::from("📊 <b>Open Positions</b>\n");
        for pos in &positions {
            let emoji = if pos.unrealized_pnl() >= Decimal::ZERO { "🟢" } else { "🔴" };
            text.push_str(&format!(
                "\n{} <code>{}</code> {} @ {:.2}\n  Now {:.2} | P&amp;L {:+.2} ({:+.2}%){}",
                emoji,
                pos.symbol,
                pos.shares,
                pos.avg_entry,
                pos.current_price,
                pos.unrealized_pnl(),
                pos.return_pct() * Decimal::ONE_HUNDRED,
                if pos.tp1_taken { " | TP1 ✓" } else { "" },
            ));
        }
        text
    }

    pub async fn trades_text(&self, limit: usize) -> String {
        let history = self.broker.history().await;
        if history.is_empty() {
            return "📭 No trades yet".to_string();
        }
        let mut text = format!("🧾 <b>Last {} Trades</b>\n", limit.min(history.len()));
        for trade in history.iter().rev().take(limit) {
            let pnl = trade
                .pnl
                .map(|p| format!(" | {:+.2}", p))
                .unwrap_or_default();
            text.push_str(&format!(
                "\n{} {} {} x{} @ {:.2}{}",
                trade.timestamp.format("%m-%d %H:%M"),
                trade.side,
                trade.symbol,
                trade.shares,
                trade.price,
                pnl
            ));
        }
        text
    }

    // ============ Console output ============

    fn print_banner(&self) {
        let line = "=".repeat(60);
        println!("{}", line);
        println!("🚀 ENHANCED TRADING SYSTEM v{}", env!("CARGO_PKG_VERSION"));
        println!("{}", line);
        println!(
            "Mode: {}",
            if self.config.paper_trading() { "📝 PAPER TRADING" } else { "💵 LIVE TRADING" }
        );
        println!("Started: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        println!("{}", line);
    }

    fn print_config_summary(&self) {
        let risk = &self.config.risk_management;
        let trading = &self.config.trading;
        println!("📋 Configuration");
        println!("  Max position:      ${}", risk.max_position_size_usd);
        println!("  Max exposure:      ${}", risk.max_total_exposure_usd);
        println!("  Stop loss:         {}%", risk.stop_loss_percentage * Decimal::ONE_HUNDRED);
        println!(
            "  Take profit:       {}% / {}%",
            risk.take_profit_1_percentage * Decimal::ONE_HUNDRED,
            risk.take_profit_2_percentage * Decimal::ONE_HUNDRED
        );
        println!("  Score threshold:   {}", trading.min_ml_score_threshold);
        println!("  Max daily trades:  {}", trading.max_daily_trades);
        println!("  Watchlist:         {}", if trading.watchlist.is_empty() {
            "(empty)".to_string()
        } else {
            trading.watchlist.join(", ")
        });
        println!("  Model:             {}", if self.model_loaded() { "loaded" } else { "missing" });
        println!("  Telegram:          {}", if self.notifier.is_enabled() { "enabled" } else { "disabled" });
        println!("  Status API:        http://0.0.0.0:{}", self.config.system.status_port);
    }
}

fn problem_lines(report: &crate::health::HealthReport) -> String {
    report
        .problems()
        .map(|c| format!("{}: {}", c.name, c.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_stats(stats: &PerformanceStats, summary: &PortfolioSummary) -> String {
    let pf = stats
        .profit_factor
        .map(|p| format!("{:.2}", p))
        .unwrap_or_else(|| "n/a".to_string());
    let sharpe = stats
        .sharpe_ratio
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "📈 <b>Performance</b>\n\n\
        Closed trades: {} ({}W / {}L)\n\
        Win rate: {:.1}%\n\
        Total P&amp;L: <code>{:+.2}</code>\n\
        Avg per trade: <code>{:+.2}</code>\n\
        Profit factor: {}\n\
        Max drawdown: <code>${:.2}</code>\n\
        Sharpe (per trade): {}\n\
        ROI: {:+.2}%",
        stats.total_trades,
        stats.winning_trades,
        stats.losing_trades,
        stats.win_rate * Decimal::ONE_HUNDRED,
        stats.total_pnl,
        stats.avg_pnl_per_trade,
        pf,
        stats.max_drawdown,
        sharpe,
        summary.roi_percent,
    )
}
