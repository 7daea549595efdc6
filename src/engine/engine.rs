//! Trading engine
//!
//! Two cooperative loops over shared in-memory state: the scan loop
//! admits launchpad tokens and opens positions; the monitor loop
//! refreshes prices and enforces exit conditions in fixed priority
//! order. Both loops are cancellation-aware and drain within a bounded
//! grace period on stop.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{
    CloseMirror, ExecutionBackend, PositionMirror, TradeAction, TradeRequest, TradeResult,
};
use crate::config::{EngineConfig, TimeoutConfig, TradingMode};
use crate::engine::ai_overlay::{apply_decision_rule, AiAnalyzer, OverlayDecision};
use crate::engine::filters::{self, FilterResult, RISK_SCORE_BUY_THRESHOLD};
use crate::engine::strategy::Strategy;
use crate::engine::types::{
    EngineEvent, EngineStats, EngineStatus, ExitReason, Position, PositionState,
    PositionSummary, StartReport, TradeOutcome, TradeRecord,
};
use crate::error::{Error, Result};
use crate::scanner::types::TokenCandidate;
use crate::scanner::LaunchpadScanner;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parameters for one buy, with optional AI overrides
struct BuyParams {
    amount_sol: Option<f64>,
    stop_loss_frac: Option<f64>,
    take_profit_frac: Option<f64>,
    decision_summary: Option<String>,
}

impl BuyParams {
    fn plain() -> Self {
        Self {
            amount_sol: None,
            stop_loss_frac: None,
            take_profit_frac: None,
            decision_summary: None,
        }
    }
}

/// Shared mutable state between the two loops
struct SharedState {
    running: AtomicBool,
    /// Addresses seen this session (admit-once)
    scanned: RwLock<HashSet<String>>,
    /// Addresses permanently excluded this session
    blacklist: RwLock<HashSet<String>>,
    watchlist: RwLock<HashSet<String>>,
    /// Open positions keyed by token address
    positions: RwLock<HashMap<String, Position>>,
    /// Append-only trade log
    trades: RwLock<Vec<TradeRecord>>,
    stats: RwLock<EngineStats>,
    /// Tokens discovered per platform this session
    platform_scans: dashmap::DashMap<String, u64>,
}

/// The live scanner and trading engine
pub struct TradingEngine {
    config: EngineConfig,
    timeouts: TimeoutConfig,
    strategy: Arc<RwLock<Strategy>>,
    scanner: Arc<dyn LaunchpadScanner>,
    backend: Arc<dyn ExecutionBackend>,
    ai: Option<Arc<AiAnalyzer>>,
    signing_key: Option<String>,
    shared: Arc<SharedState>,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<EngineEvent>>>,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        timeouts: TimeoutConfig,
        strategy: Arc<RwLock<Strategy>>,
        scanner: Arc<dyn LaunchpadScanner>,
        backend: Arc<dyn ExecutionBackend>,
        ai: Option<Arc<AiAnalyzer>>,
        signing_key: Option<String>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            timeouts,
            strategy,
            scanner,
            backend,
            ai,
            signing_key,
            shared: Arc::new(SharedState {
                running: AtomicBool::new(false),
                scanned: RwLock::new(HashSet::new()),
                blacklist: RwLock::new(HashSet::new()),
                watchlist: RwLock::new(HashSet::new()),
                positions: RwLock::new(HashMap::new()),
                trades: RwLock::new(Vec::new()),
                stats: RwLock::new(EngineStats::default()),
                platform_scans: dashmap::DashMap::new(),
            }),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
            cancel: std::sync::Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Take the event receiver; callable once
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.events_rx.lock().expect("events lock poisoned").take()
    }

    fn emit(&self, event: EngineEvent) {
        // Events are advisory; a full or absent consumer never blocks a loop
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "Event dropped");
        }
    }

    /// Spawn the scan and monitor loops
    pub async fn start(self: Arc<Self>) -> Result<StartReport> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        if self.config.mode == TradingMode::Live && self.signing_key.is_none() {
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(Error::MissingSigningKey);
        }

        self.shared.stats.write().await.started_at = Some(chrono::Utc::now());

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock poisoned") = Some(cancel.clone());

        let mut handles = self.handles.lock().await;

        let engine = self.clone();
        let scan_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            engine.scan_loop(scan_cancel).await;
        }));

        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            engine.monitor_loop(cancel).await;
        }));

        info!(
            mode = %self.config.mode,
            platforms = ?self.config.platforms,
            "Engine started"
        );

        Ok(StartReport {
            status: "started".into(),
            mode: self.config.mode,
            platforms: self.config.platforms.clone(),
        })
    }

    /// Stop both loops, wait for drain, close-all in live mode
    pub async fn stop(&self) -> Result<EngineStats> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Err(Error::NotRunning);
        }

        if let Some(cancel) = self.cancel.lock().expect("cancel lock poisoned").take() {
            cancel.cancel();
        }

        let grace = Duration::from_millis(self.timeouts.shutdown_grace_ms);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Loop did not drain within grace period");
            }
        }
        drop(handles);

        if self.config.mode == TradingMode::Live {
            self.close_all(ExitReason::Shutdown).await;
        }

        let stats = self.shared.stats.read().await.clone();
        info!(
            closed = stats.closed_count(),
            net_pnl = stats.net_pnl_sol(),
            "Engine stopped"
        );
        Ok(stats)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    // === Scan loop ===

    async fn scan_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.scan_interval_ms));
        let mut backoff = loop_backoff();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scan loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.scan_tick().await {
                        Ok(()) => backoff.reset(),
                        Err(e) => {
                            warn!(error = %e, "Scan tick failed");
                            self.emit(EngineEvent::Error(e.to_string()));
                            if let Some(delay) = backoff.next_backoff() {
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn scan_tick(&self) -> Result<()> {
        let mut failures = 0;

        for platform in &self.config.platforms {
            match self.scanner.scan(platform).await {
                Ok(candidates) => {
                    for candidate in candidates {
                        if let Err(e) = self.process_candidate(candidate).await {
                            debug!(error = %e, "Candidate processing failed");
                        }
                    }
                }
                Err(e) => {
                    debug!(platform = %platform, error = %e, "Platform scan failed");
                    failures += 1;
                }
            }
        }

        if failures == self.config.platforms.len() && failures > 0 {
            return Err(Error::Scanner {
                platform: "all".into(),
                message: "every platform scan failed this tick".into(),
            });
        }

        Ok(())
    }

    /// Admission pipeline for one candidate:
    /// admit-once, enrich, filter, score, optional AI overlay, buy
    async fn process_candidate(&self, mut token: TokenCandidate) -> Result<()> {
        // Admit-once, serialized on the scanned set; blacklisted
        // addresses are never re-admitted
        {
            let blacklist = self.shared.blacklist.read().await;
            if blacklist.contains(&token.address) {
                return Ok(());
            }
            drop(blacklist);

            let mut scanned = self.shared.scanned.write().await;
            if !scanned.insert(token.address.clone()) {
                return Ok(());
            }
        }

        self.shared.stats.write().await.tokens_scanned += 1;
        *self
            .shared
            .platform_scans
            .entry(token.platform.clone())
            .or_insert(0) += 1;
        self.emit(EngineEvent::TokenDiscovered(token.clone()));

        // Enrichment failures leave fields unset
        match self
            .scanner
            .fetch_metadata(&token.platform, &token.address)
            .await
        {
            Ok(meta) => token.merge_metadata(meta),
            Err(e) => debug!(token = %token.address, error = %e, "Enrichment failed"),
        }

        let entry_thresholds = self.strategy.read().await.entry.clone();
        if let FilterResult::Filtered(reason) = filters::admission_check(&token, &entry_thresholds)
        {
            debug!(token = %token.address, %reason, "Token filtered");
            return Ok(());
        }

        // Position cap applies before any buy path
        let max_positions = self.strategy.read().await.sizing.max_positions;
        if self.shared.positions.read().await.len() >= max_positions {
            debug!(token = %token.address, "At position capacity, declining");
            return Ok(());
        }

        // AI overlay: a confident verdict decides; otherwise risk score
        if let Some(ai) = &self.ai {
            match ai.analyze(&token).await {
                Ok(analysis) => match apply_decision_rule(&analysis) {
                    OverlayDecision::Buy {
                        amount_sol,
                        stop_loss_frac,
                        take_profit_frac,
                        summary,
                    } => {
                        return self
                            .execute_buy(
                                token,
                                BuyParams {
                                    amount_sol,
                                    stop_loss_frac,
                                    take_profit_frac,
                                    decision_summary: Some(summary),
                                },
                            )
                            .await;
                    }
                    OverlayDecision::Veto { summary } => {
                        debug!(token = %token.address, %summary, "AI vetoed entry");
                        return Ok(());
                    }
                    OverlayDecision::FallThrough => {}
                },
                Err(e) => debug!(token = %token.address, error = %e, "AI analysis unavailable"),
            }
        }

        let score = filters::risk_score(&token);
        if score < RISK_SCORE_BUY_THRESHOLD {
            debug!(token = %token.address, score, "Risk score approved entry");
            self.execute_buy(token, BuyParams::plain()).await
        } else {
            debug!(token = %token.address, score, "Risk score declined entry");
            Ok(())
        }
    }

    // === Buy execution ===

    async fn execute_buy(&self, token: TokenCandidate, params: BuyParams) -> Result<()> {
        let strategy = self.strategy.read().await.clone();
        let amount = params.amount_sol.unwrap_or(strategy.sizing.base_amount_sol);

        let result = match self.config.mode {
            TradingMode::Simulation => TradeResult {
                success: true,
                signature: Some(format!("sim_{}", Uuid::new_v4())),
                price: Some(token.price.unwrap_or(0.001)),
                amount: Some(amount),
                proceeds: None,
                error: None,
            },
            TradingMode::Live => {
                let request = TradeRequest {
                    action: TradeAction::Buy,
                    token_address: token.address.clone(),
                    amount,
                    use_mev_protection: self.config.use_jito,
                };
                match self.with_deadline(self.backend.execute_trade(&request)).await {
                    Ok(result) => result,
                    Err(e) => {
                        // A failed buy permanently excludes the token
                        self.shared.stats.write().await.failed_trades += 1;
                        self.shared
                            .blacklist
                            .write()
                            .await
                            .insert(token.address.clone());
                        warn!(token = %token.address, error = %e, "Buy failed, blacklisted");
                        self.emit(EngineEvent::Error(e.to_string()));
                        return Err(e);
                    }
                }
            }
        };

        let entry_price = result
            .price
            .or(token.price)
            .filter(|p| *p > 0.0)
            .unwrap_or(0.001);
        let stop_loss_frac = params
            .stop_loss_frac
            .unwrap_or(strategy.exit.stop_loss_frac);
        let take_profit_frac = params
            .take_profit_frac
            .unwrap_or(strategy.exit.take_profit_frac);
        let signature = result.signature.unwrap_or_default();

        let mut position = Position {
            id: Uuid::new_v4(),
            token: token.clone(),
            entry_price,
            current_price: entry_price,
            entry_time: chrono::Utc::now(),
            notional_sol: amount,
            tokens_owned: amount / entry_price,
            stop_loss: entry_price * (1.0 - stop_loss_frac),
            take_profit: entry_price * (1.0 + take_profit_frac),
            trailing_stop_price: None,
            highest_price: entry_price,
            signature: signature.clone(),
            strategy_tag: if params.decision_summary.is_some() {
                "ai".into()
            } else {
                "scanner".into()
            },
            ai_decision: params.decision_summary,
            db_position_id: None,
            state: PositionState::Opening,
            pending_exit: None,
        };

        if !(position.stop_loss < entry_price && entry_price < position.take_profit) {
            return Err(Error::InvariantViolation(format!(
                "exit bands invalid for {}: stop {} entry {} take {}",
                token.address, position.stop_loss, entry_price, position.take_profit
            )));
        }

        if self.config.use_database {
            position.db_position_id = self
                .backend
                .mirror_open(&PositionMirror {
                    token_address: token.address.clone(),
                    symbol: token.display_symbol(),
                    entry_price,
                    amount_sol: amount,
                    signature: signature.clone(),
                    strategy_tag: position.strategy_tag.clone(),
                })
                .await;
        }

        let trade = TradeRecord {
            kind: TradeAction::Buy,
            token_address: token.address.clone(),
            amount_sol: amount,
            price: entry_price,
            timestamp: chrono::Utc::now(),
            signature,
            pnl: None,
            outcome: None,
        };

        {
            let mut stats = self.shared.stats.write().await;
            stats.trades_executed += 1;
            stats.deployed_capital_sol += amount;
        }
        self.shared.trades.write().await.push(trade.clone());

        let position_id = position.id;
        position.state = PositionState::Open;
        self.shared
            .positions
            .write()
            .await
            .insert(token.address.clone(), position);
        self.shared
            .watchlist
            .write()
            .await
            .insert(token.address.clone());

        info!(
            token = %token.address,
            amount,
            entry_price,
            "Position opened"
        );
        self.emit(EngineEvent::TradeExecuted {
            trade,
            position_id: Some(position_id),
        });

        Ok(())
    }

    // === Monitor loop ===

    async fn monitor_loop(&self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.monitor_interval_ms));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Monitor loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.monitor_tick().await;
                }
            }
        }
    }

    /// Walk open positions once: refresh prices, maintain trailing
    /// references, evaluate exits in fixed priority order
    async fn monitor_tick(&self) {
        let addresses: Vec<String> = self.shared.positions.read().await.keys().cloned().collect();

        for address in addresses {
            // A position whose sell already triggered (or failed) retries first
            let pending = {
                let positions = self.shared.positions.read().await;
                positions
                    .get(&address)
                    .filter(|p| {
                        matches!(p.state, PositionState::Closing | PositionState::Failed)
                    })
                    .and_then(|p| p.pending_exit)
            };
            if let Some(reason) = pending {
                self.close_position(&address, reason).await;
                continue;
            }

            // Price failures are transient and silent for this tick
            let price = match self
                .with_deadline(self.backend.get_current_price(&address))
                .await
            {
                Ok(price) => price,
                Err(e) => {
                    debug!(token = %address, error = %e, "Price unavailable this tick");
                    continue;
                }
            };

            let (trailing_frac, max_hold) = {
                let strategy = self.strategy.read().await;
                (
                    strategy.exit.trailing_stop_frac,
                    strategy.exit.max_hold_minutes,
                )
            };

            let triggered = {
                let mut positions = self.shared.positions.write().await;
                let Some(position) = positions.get_mut(&address) else {
                    continue;
                };

                position.observe_price(price, trailing_frac);

                let reason = evaluate_exit(position, max_hold);
                if let Some(reason) = reason {
                    position.state = PositionState::Closing;
                    position.pending_exit = Some(reason);
                }
                reason
            };

            if let Some(reason) = triggered {
                self.close_position(&address, reason).await;
            }
        }
    }

    /// Sell a position and finalize accounting. A failed sell leaves the
    /// position in Closing for the next tick to retry.
    async fn close_position(&self, address: &str, reason: ExitReason) {
        let snapshot = {
            let positions = self.shared.positions.read().await;
            match positions.get(address) {
                Some(p) => p.clone(),
                None => return,
            }
        };

        let result = match self.config.mode {
            TradingMode::Simulation => TradeResult {
                success: true,
                signature: Some(format!("sim_{}", Uuid::new_v4())),
                price: Some(snapshot.current_price),
                amount: Some(snapshot.tokens_owned),
                proceeds: Some(snapshot.tokens_owned * snapshot.current_price),
                error: None,
            },
            TradingMode::Live => {
                let request = TradeRequest {
                    action: TradeAction::Sell,
                    token_address: address.to_string(),
                    amount: snapshot.tokens_owned,
                    use_mev_protection: self.config.use_jito,
                };
                match self.with_deadline(self.backend.execute_trade(&request)).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(token = %address, error = %e, "Sell failed, will retry");
                        let mut positions = self.shared.positions.write().await;
                        if let Some(position) = positions.get_mut(address) {
                            position.state = PositionState::Failed;
                        }
                        drop(positions);
                        self.emit(EngineEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
        };

        let exit_price = result.price.unwrap_or(snapshot.current_price);
        let proceeds = result
            .proceeds
            .unwrap_or(snapshot.tokens_owned * exit_price);
        let pnl = proceeds - snapshot.notional_sol;
        let pnl_frac = if snapshot.notional_sol > 0.0 {
            pnl / snapshot.notional_sol
        } else {
            0.0
        };

        let mut closed = {
            let mut positions = self.shared.positions.write().await;
            match positions.remove(address) {
                Some(p) => p,
                None => return,
            }
        };
        self.shared.watchlist.write().await.remove(address);

        closed.state = PositionState::Closed;
        closed.current_price = exit_price;

        let trade = TradeRecord {
            kind: TradeAction::Sell,
            token_address: address.to_string(),
            amount_sol: proceeds,
            price: exit_price,
            timestamp: chrono::Utc::now(),
            signature: result.signature.unwrap_or_default(),
            pnl: Some(pnl),
            outcome: Some(if pnl >= 0.0 {
                TradeOutcome::Win
            } else {
                TradeOutcome::Loss
            }),
        };
        self.shared.trades.write().await.push(trade);
        self.shared.stats.write().await.record_close(pnl);

        if let Some(db_id) = &closed.db_position_id {
            self.backend
                .mirror_close(&CloseMirror {
                    db_position_id: db_id.clone(),
                    exit_price,
                    pnl,
                    reason: reason.to_string(),
                })
                .await;
        }

        info!(
            token = %address,
            %reason,
            pnl,
            pnl_pct = pnl_frac * 100.0,
            "Position closed"
        );
        self.emit(EngineEvent::PositionClosed {
            position: Box::new(closed),
            reason,
            pnl,
            pnl_frac,
        });
    }

    /// Close every open position (live-mode shutdown)
    async fn close_all(&self, reason: ExitReason) {
        let addresses: Vec<String> = self.shared.positions.read().await.keys().cloned().collect();
        for address in addresses {
            self.close_position(&address, reason).await;
        }
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = Duration::from_millis(self.timeouts.execution_ms);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeouts.execution_ms)),
        }
    }

    // === Snapshots ===

    pub async fn get_status(&self) -> EngineStatus {
        let stats = self.shared.stats.read().await;
        let positions = self.shared.positions.read().await;

        EngineStatus {
            running: self.is_running(),
            mode: self.config.mode,
            platform_scans: self
                .shared
                .platform_scans
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            win_rate: stats.win_rate(),
            net_pnl_sol: stats.net_pnl_sol(),
            positions: positions
                .values()
                .map(|p| PositionSummary {
                    symbol: p.token.display_symbol(),
                    entry_price: p.entry_price,
                    current_price: p.current_price,
                    minutes_held: p.minutes_held(),
                    pnl_frac: p.unrealized_pnl_frac(),
                })
                .collect(),
        }
    }

    pub async fn get_stats(&self) -> EngineStats {
        self.shared.stats.read().await.clone()
    }

    pub async fn get_trades(&self) -> Vec<TradeRecord> {
        self.shared.trades.read().await.clone()
    }

    pub async fn open_position_count(&self) -> usize {
        self.shared.positions.read().await.len()
    }

    pub async fn is_blacklisted(&self, address: &str) -> bool {
        self.shared.blacklist.read().await.contains(address)
    }
}

/// Evaluate exit conditions in fixed priority order; first match wins
fn evaluate_exit(position: &Position, max_hold_minutes: i64) -> Option<ExitReason> {
    if position.current_price <= position.stop_loss {
        return Some(ExitReason::StopLoss);
    }
    if position.current_price >= position.take_profit {
        return Some(ExitReason::TakeProfit);
    }
    if let Some(trailing) = position.trailing_stop_price {
        if position.current_price <= trailing {
            return Some(ExitReason::TrailingStop);
        }
    }
    if position.minutes_held() > max_hold_minutes {
        return Some(ExitReason::MaxHold);
    }
    None
}

/// Backoff applied after a failed loop iteration
fn loop_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(5),
        max_interval: Duration::from_secs(60),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use crate::scanner::types::TokenMetadata;

    struct NullScanner;

    #[async_trait]
    impl LaunchpadScanner for NullScanner {
        async fn scan(&self, _platform: &str) -> Result<Vec<TokenCandidate>> {
            Ok(Vec::new())
        }

        async fn fetch_metadata(&self, _platform: &str, _address: &str) -> Result<TokenMetadata> {
            Ok(TokenMetadata::default())
        }
    }

    struct MockBackend {
        prices: StdMutex<HashMap<String, f64>>,
        fail_buys: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                prices: StdMutex::new(HashMap::new()),
                fail_buys: false,
            }
        }

        fn failing_buys() -> Self {
            Self {
                prices: StdMutex::new(HashMap::new()),
                fail_buys: true,
            }
        }

        fn set_price(&self, address: &str, price: f64) {
            self.prices
                .lock()
                .unwrap()
                .insert(address.to_string(), price);
        }
    }

    #[async_trait]
    impl ExecutionBackend for MockBackend {
        async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResult> {
            if self.fail_buys && request.action == TradeAction::Buy {
                return Err(Error::ExecutionFailed {
                    token: request.token_address.clone(),
                    message: "insufficient liquidity".into(),
                });
            }
            let price = self
                .prices
                .lock()
                .unwrap()
                .get(&request.token_address)
                .copied()
                .unwrap_or(0.001);
            Ok(TradeResult {
                success: true,
                signature: Some("mock_sig".into()),
                price: Some(price),
                amount: Some(request.amount),
                proceeds: match request.action {
                    TradeAction::Sell => Some(request.amount * price),
                    TradeAction::Buy => None,
                },
                error: None,
            })
        }

        async fn get_current_price(&self, token_address: &str) -> Result<f64> {
            self.prices
                .lock()
                .unwrap()
                .get(token_address)
                .copied()
                .ok_or_else(|| Error::PriceFetch(token_address.to_string()))
        }

        async fn mirror_open(&self, _position: &PositionMirror) -> Option<String> {
            None
        }

        async fn mirror_close(&self, _close: &CloseMirror) {}

        async fn mev_protection_active(&self) -> bool {
            false
        }
    }

    fn sim_config() -> EngineConfig {
        EngineConfig {
            mode: TradingMode::Simulation,
            buy_amount_sol: 0.1,
            stop_loss_frac: 0.25,
            take_profit_frac: 1.0,
            trailing_stop_frac: 0.15,
            ..EngineConfig::default()
        }
    }

    fn engine_with(config: EngineConfig, backend: Arc<MockBackend>) -> Arc<TradingEngine> {
        let strategy = Arc::new(RwLock::new(Strategy::from_engine_config(&config)));
        Arc::new(TradingEngine::new(
            config,
            TimeoutConfig::default(),
            strategy,
            Arc::new(NullScanner),
            backend,
            None,
            Some("test-key".into()),
        ))
    }

    fn good_token(address: &str) -> TokenCandidate {
        let mut token = TokenCandidate::new(address, "pump.fun");
        token.liquidity_sol = Some(8.0);
        token.market_cap_sol = Some(50.0);
        token.holders = Some(40);
        token.volume_24h_sol = Some(3.0);
        token.is_verified = Some(true);
        token.price = Some(0.001);
        token
    }

    #[tokio::test]
    async fn test_simulation_buy_then_stop_loss() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend.clone());

        engine.process_candidate(good_token("mint1")).await.unwrap();
        assert_eq!(engine.open_position_count().await, 1);

        {
            let positions = engine.shared.positions.read().await;
            let p = positions.get("mint1").unwrap();
            assert!((p.stop_loss - 0.00075).abs() < 1e-12);
            assert!((p.take_profit - 0.002).abs() < 1e-12);
            assert_eq!(p.state, PositionState::Open);
        }

        backend.set_price("mint1", 0.0007);
        engine.monitor_tick().await;

        assert_eq!(engine.open_position_count().await, 0);
        let stats = engine.get_stats().await;
        assert_eq!(stats.winning_trades, 0);
        assert_eq!(stats.losing_trades, 1);
        assert!((stats.worst_trade_sol + 0.03).abs() < 1e-9);

        let trades = engine.get_trades().await;
        let sell = trades.last().unwrap();
        assert_eq!(sell.kind, TradeAction::Sell);
        assert!((sell.pnl.unwrap() + 0.03).abs() < 1e-9);
        assert_eq!(sell.outcome, Some(TradeOutcome::Loss));
    }

    #[tokio::test]
    async fn test_trailing_stop_sequence() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend.clone());

        let mut token = good_token("mint2");
        token.price = Some(1.0);
        engine.process_candidate(token).await.unwrap();

        for price in [1.0, 1.5, 1.8, 1.55] {
            backend.set_price("mint2", price);
            engine.monitor_tick().await;
        }
        // Highest seen 1.8 puts the trailing reference at 1.53; 1.55 holds
        assert_eq!(engine.open_position_count().await, 1);
        {
            let positions = engine.shared.positions.read().await;
            let p = positions.get("mint2").unwrap();
            assert!((p.highest_price - 1.8).abs() < 1e-9);
            assert!((p.trailing_stop_price.unwrap() - 1.53).abs() < 1e-9);
        }

        backend.set_price("mint2", 1.52);
        engine.monitor_tick().await;

        assert_eq!(engine.open_position_count().await, 0);
        let trades = engine.get_trades().await;
        let sell = trades.last().unwrap();
        let pnl_frac = sell.pnl.unwrap() / 0.1;
        assert!((pnl_frac - 0.52).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_admission_is_idempotent() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend);

        engine.process_candidate(good_token("mint3")).await.unwrap();
        engine.process_candidate(good_token("mint3")).await.unwrap();

        let stats = engine.get_stats().await;
        assert_eq!(stats.tokens_scanned, 1);
        assert_eq!(stats.trades_executed, 1);
        assert_eq!(engine.open_position_count().await, 1);
    }

    #[tokio::test]
    async fn test_position_cap_enforced() {
        let backend = Arc::new(MockBackend::new());
        let mut config = sim_config();
        config.max_positions = 2;
        let engine = engine_with(config, backend);

        for i in 0..4 {
            let _ = engine.process_candidate(good_token(&format!("mint{i}"))).await;
        }

        assert_eq!(engine.open_position_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_live_buy_blacklists() {
        let backend = Arc::new(MockBackend::failing_buys());
        let mut config = sim_config();
        config.mode = TradingMode::Live;
        let engine = engine_with(config, backend);

        let result = engine.process_candidate(good_token("rug1")).await;
        assert!(result.is_err());
        assert!(engine.is_blacklisted("rug1").await);
        assert_eq!(engine.get_stats().await.failed_trades, 1);
        assert_eq!(engine.open_position_count().await, 0);
    }

    #[tokio::test]
    async fn test_max_hold_exit() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend.clone());

        engine.process_candidate(good_token("mint4")).await.unwrap();
        {
            let mut positions = engine.shared.positions.write().await;
            let p = positions.get_mut("mint4").unwrap();
            p.entry_time = chrono::Utc::now() - chrono::Duration::minutes(61);
        }

        backend.set_price("mint4", 0.001);
        engine.monitor_tick().await;

        assert_eq!(engine.open_position_count().await, 0);
        let trades = engine.get_trades().await;
        // Flat exit: pnl ~ 0, counted as a win by convention
        assert!((trades.last().unwrap().pnl.unwrap()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_price_skips_tick() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend.clone());

        engine.process_candidate(good_token("mint5")).await.unwrap();
        // No price set for mint5: the tick must leave the position alone
        backend.prices.lock().unwrap().clear();
        engine.monitor_tick().await;

        assert_eq!(engine.open_position_count().await, 1);
    }

    #[tokio::test]
    async fn test_exit_priority_stop_loss_first() {
        // A position simultaneously past stop and trailing reports stop loss
        let mut position = Position {
            id: Uuid::new_v4(),
            token: good_token("mint6"),
            entry_price: 1.0,
            current_price: 0.5,
            entry_time: chrono::Utc::now(),
            notional_sol: 0.1,
            tokens_owned: 0.1,
            stop_loss: 0.75,
            take_profit: 2.0,
            trailing_stop_price: Some(0.9),
            highest_price: 1.1,
            signature: "sig".into(),
            strategy_tag: "scanner".into(),
            ai_decision: None,
            db_position_id: None,
            state: PositionState::Open,
            pending_exit: None,
        };
        assert_eq!(evaluate_exit(&position, 60), Some(ExitReason::StopLoss));

        position.current_price = 2.5;
        assert_eq!(evaluate_exit(&position, 60), Some(ExitReason::TakeProfit));

        position.current_price = 0.85;
        assert_eq!(evaluate_exit(&position, 60), Some(ExitReason::TrailingStop));

        position.current_price = 1.05;
        assert_eq!(evaluate_exit(&position, 60), None);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend);

        let report = engine.clone().start().await.unwrap();
        assert_eq!(report.status, "started");
        assert!(engine.is_running());

        // Second start while running is rejected
        assert!(matches!(engine.clone().start().await, Err(Error::AlreadyRunning)));

        let stats = engine.stop().await.unwrap();
        assert!(!engine.is_running());
        assert_eq!(stats.closed_count(), 0);

        assert!(matches!(engine.stop().await, Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_live_start_requires_signing_key() {
        let mut config = sim_config();
        config.mode = TradingMode::Live;
        let strategy = Arc::new(RwLock::new(Strategy::from_engine_config(&config)));
        let engine = Arc::new(TradingEngine::new(
            config,
            TimeoutConfig::default(),
            strategy,
            Arc::new(NullScanner),
            Arc::new(MockBackend::new()),
            None,
            None,
        ));

        assert!(matches!(
            engine.clone().start().await,
            Err(Error::MissingSigningKey)
        ));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine_with(sim_config(), backend);

        engine.process_candidate(good_token("mint7")).await.unwrap();
        let status = engine.get_status().await;
        assert_eq!(status.positions.len(), 1);
        assert_eq!(status.mode, TradingMode::Simulation);
        assert_eq!(
            status.platform_scans,
            vec![("pump.fun".to_string(), 1)]
        );
    }
}
