//! Trading decision agent
//!
//! One cooperative loop per session: observe the discretized portfolio
//! state, pick an action epsilon-greedily, execute it against the
//! simulated book and the shared strategy knobs, collect reward, and
//! update the Q-table. The learned table persists across runs.

use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::actions::AgentAction;
use crate::agent::qlearning::{FlatQEntry, QTable};
use crate::agent::state::{AgentState, PortfolioObservation};
use crate::config::{AgentConfig, TradingMode};
use crate::engine::Strategy;
use crate::error::{Error, Result};
use crate::store::JsonStore;

const RECENT_TRADE_CAP: usize = 100;
const DECISION_LOG_CAP: usize = 500;
const OPTIMIZE_EVERY_TRADES: u32 = 10;

/// A realized synthetic trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTrade {
    pub pnl: f64,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// One decision-log line
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub state_key: String,
    pub action: AgentAction,
    pub reward: f64,
    pub epsilon: f64,
}

/// Portfolio performance metrics tracked by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub starting_capital: f64,
    pub capital: f64,
    pub peak_capital: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    /// Recent per-trade returns (pnl / base), bounded
    pub recent_returns: Vec<f64>,
}

impl PerformanceMetrics {
    pub fn new(starting_capital: f64) -> Self {
        Self {
            starting_capital,
            capital: starting_capital,
            peak_capital: starting_capital,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            consecutive_wins: 0,
            consecutive_losses: 0,
            recent_returns: Vec::new(),
        }
    }

    pub fn record_trade(&mut self, pnl: f64, base_amount: f64) {
        self.capital += pnl;
        if self.capital > self.peak_capital {
            self.peak_capital = self.capital;
        }
        self.total_trades += 1;
        if pnl >= 0.0 {
            self.winning_trades += 1;
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.losing_trades += 1;
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }
        if base_amount > 0.0 {
            self.recent_returns.push(pnl / base_amount);
            if self.recent_returns.len() > RECENT_TRADE_CAP {
                self.recent_returns.remove(0);
            }
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    /// Drawdown from the capital high-water mark
    pub fn drawdown(&self) -> f64 {
        if self.peak_capital <= 0.0 {
            return 0.0;
        }
        ((self.peak_capital - self.capital) / self.peak_capital).max(0.0)
    }

    /// Sharpe-style ratio over recent per-trade returns
    pub fn sharpe(&self) -> f64 {
        let returns = &self.recent_returns;
        if returns.len() < 2 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let std = variance.sqrt();
        if std == 0.0 {
            return 0.0;
        }
        mean / std
    }

    pub fn roi(&self) -> f64 {
        if self.starting_capital == 0.0 {
            return 0.0;
        }
        (self.capital - self.starting_capital) / self.starting_capital
    }
}

/// Summary returned by stop()
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub capital: f64,
    pub total_trades: u32,
    pub win_rate: f64,
    pub roi: f64,
    pub states_learned: usize,
}

/// Persisted agent state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub qtable: Vec<FlatQEntry>,
    pub metrics: PerformanceMetrics,
    pub strategy: Strategy,
    pub recent_trades: Vec<AgentTrade>,
    pub epsilon: f64,
}

/// A synthetic open position in the agent's simulated book
#[derive(Debug, Clone)]
struct SimPosition {
    notional: f64,
    unrealized_pnl: f64,
    aggressive: bool,
}

struct AgentInner {
    qtable: QTable,
    epsilon: f64,
    metrics: PerformanceMetrics,
    sim_positions: Vec<SimPosition>,
    decisions: VecDeque<DecisionRecord>,
    recent_trades: VecDeque<AgentTrade>,
    iterations: u64,
    trades_since_optimize: u32,
    rng: StdRng,
}

/// The autonomous decision agent
pub struct TradingAgent {
    config: AgentConfig,
    strategy: Arc<RwLock<Strategy>>,
    store: Arc<JsonStore>,
    inner: Arc<RwLock<AgentInner>>,
    running: AtomicBool,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TradingAgent {
    pub fn new(config: AgentConfig, strategy: Arc<RwLock<Strategy>>, store: Arc<JsonStore>) -> Self {
        let epsilon = config.exploration_rate;
        Self {
            config,
            strategy,
            store,
            inner: Arc::new(RwLock::new(AgentInner {
                qtable: QTable::new(),
                epsilon,
                metrics: PerformanceMetrics::new(0.0),
                sim_positions: Vec::new(),
                decisions: VecDeque::new(),
                recent_trades: VecDeque::new(),
                iterations: 0,
                trades_since_optimize: 0,
                rng: StdRng::from_entropy(),
            })),
            running: AtomicBool::new(false),
            cancel: std::sync::Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Load any prior snapshot and spawn the decision loop
    pub async fn start(self: Arc<Self>, _mode: TradingMode, starting_capital: f64) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AgentAlreadyRunning);
        }

        let snapshot = match self.store.load_agent_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Snapshot load failed, starting fresh");
                None
            }
        };

        {
            let mut inner = self.inner.write().await;
            inner.metrics = PerformanceMetrics::new(starting_capital);
            inner.sim_positions.clear();

            match &snapshot {
                Some(snapshot) => {
                    inner.qtable.merge(QTable::from_entries(&snapshot.qtable));
                    inner.epsilon = snapshot
                        .epsilon
                        .clamp(self.config.min_exploration_rate, self.config.exploration_rate);
                    inner.recent_trades = snapshot.recent_trades.iter().cloned().collect();
                    info!(
                        states = inner.qtable.state_count(),
                        "Restored learned policy"
                    );
                }
                None => debug!("No prior snapshot, starting fresh"),
            }
        }

        if let Some(snapshot) = snapshot {
            *self.strategy.write().await = snapshot.strategy;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock poisoned") = Some(cancel.clone());

        let agent = self.clone();
        let handle = tokio::spawn(async move {
            agent.decision_loop(cancel).await;
        });
        *self.handle.lock().await = Some(handle);

        info!(starting_capital, "Agent started");
        Ok(())
    }

    /// Stop the loop, realize open synthetic positions, persist
    pub async fn stop(&self) -> Result<PerformanceSummary> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(Error::NotRunning);
        }

        if let Some(cancel) = self.cancel.lock().expect("cancel lock poisoned").take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("Decision loop did not drain within grace period");
            }
        }

        {
            let mut inner = self.inner.write().await;
            let open: Vec<SimPosition> = inner.sim_positions.drain(..).collect();
            for position in open {
                realize(&mut inner, position.unrealized_pnl, position.notional, "close_all");
            }
        }

        self.persist().await?;

        let inner = self.inner.read().await;
        let summary = PerformanceSummary {
            capital: inner.metrics.capital,
            total_trades: inner.metrics.total_trades,
            win_rate: inner.metrics.win_rate(),
            roi: inner.metrics.roi(),
            states_learned: inner.qtable.state_count(),
        };
        info!(roi = summary.roi, trades = summary.total_trades, "Agent stopped");
        Ok(summary)
    }

    pub async fn get_performance(&self) -> PerformanceMetrics {
        self.inner.read().await.metrics.clone()
    }

    pub async fn get_decision_history(&self, n: usize) -> Vec<DecisionRecord> {
        let inner = self.inner.read().await;
        inner.decisions.iter().rev().take(n).cloned().collect()
    }

    async fn decision_loop(&self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.decision_interval_ms));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Decision loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.step().await;

                    let due = {
                        let inner = self.inner.read().await;
                        inner.iterations % self.config.snapshot_every == 0
                    };
                    if due {
                        if let Err(e) = self.persist().await {
                            warn!(error = %e, "Periodic snapshot failed");
                        }
                    }
                }
            }
        }
    }

    /// One serialized observe -> select -> act -> observe' -> update pass
    async fn step(&self) {
        let strategy = self.strategy.read().await.clone();
        let max_positions = strategy.sizing.max_positions;

        // Observe and select under one lock so the acted-on state is the
        // selected-on state
        let (state, action, epsilon) = {
            let mut inner = self.inner.write().await;
            let inner = &mut *inner;
            let state = observe(inner);
            let available = AgentAction::available(inner.sim_positions.len(), max_positions);
            let epsilon = inner.epsilon;
            let action = inner
                .qtable
                .select(&state.key(), &available, epsilon, &mut inner.rng);
            (state, action, epsilon)
        };

        let reward = match self.execute_action(action, &strategy).await {
            Ok(reward) => reward,
            Err(e) => {
                warn!(action = %action, error = %e, "Action failed");
                -1.0
            }
        };

        // Observe the next state after side-effects, then update
        let mut inner = self.inner.write().await;
        let next_state = observe(&inner);
        inner.qtable.update(
            &state.key(),
            action,
            reward,
            &next_state.key(),
            self.config.learning_rate,
            self.config.discount_factor,
        );
        inner.epsilon =
            (inner.epsilon * self.config.exploration_decay).max(self.config.min_exploration_rate);
        inner.iterations += 1;

        inner.decisions.push_back(DecisionRecord {
            timestamp: Utc::now(),
            state_key: state.key(),
            action,
            reward,
            epsilon,
        });
        if inner.decisions.len() > DECISION_LOG_CAP {
            inner.decisions.pop_front();
        }

        debug!(state = %state.key(), action = %action, reward, "Decision recorded");

        // Adaptive strategy optimization every 10 recorded trades
        if inner.trades_since_optimize >= OPTIMIZE_EVERY_TRADES {
            inner.trades_since_optimize = 0;
            let win_rate = inner.metrics.win_rate();
            let sharpe = inner.metrics.sharpe();
            let losses = inner.metrics.consecutive_losses;
            drop(inner);
            let mut strategy = self.strategy.write().await;
            strategy.optimize(win_rate, sharpe, losses);
            debug!(win_rate, sharpe, "Strategy optimized");
        }
    }

    /// Execute one action against the simulated book and shared knobs
    async fn execute_action(&self, action: AgentAction, strategy: &Strategy) -> Result<f64> {
        let base = strategy.sizing.base_amount_sol;
        let mut inner = self.inner.write().await;

        // Open synthetic positions drift a little every step
        drift_positions(&mut inner, base);

        let reward = match action {
            AgentAction::Wait => -0.01,

            AgentAction::EnterAggressive => enter(&mut inner, base, true),
            AgentAction::EnterConservative => enter(&mut inner, base, false),

            AgentAction::ExitAll => {
                let positions: Vec<SimPosition> = inner.sim_positions.drain(..).collect();
                let total: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();
                for position in positions {
                    realize(&mut inner, position.unrealized_pnl, position.notional, "exit_all");
                }
                total / base
            }

            AgentAction::ExitLosers => {
                let (losers, keep): (Vec<SimPosition>, Vec<SimPosition>) = inner
                    .sim_positions
                    .drain(..)
                    .partition(|p| p.unrealized_pnl < 0.0);
                inner.sim_positions = keep;
                let total: f64 = losers.iter().map(|p| p.unrealized_pnl).sum();
                for position in losers {
                    realize(&mut inner, position.unrealized_pnl, position.notional, "exit_losers");
                }
                // Cutting losses earns half credit on the avoided loss
                total.abs() / base * 0.5
            }

            AgentAction::ExitWinners => {
                let (winners, keep): (Vec<SimPosition>, Vec<SimPosition>) = inner
                    .sim_positions
                    .drain(..)
                    .partition(|p| p.unrealized_pnl >= 0.0);
                inner.sim_positions = keep;
                let total: f64 = winners.iter().map(|p| p.unrealized_pnl).sum();
                for position in winners {
                    realize(&mut inner, position.unrealized_pnl, position.notional, "exit_winners");
                }
                total / base
            }

            AgentAction::TightenStops => {
                drop(inner);
                self.strategy.write().await.tighten_stops();
                return Ok(0.01);
            }
            AgentAction::LoosenStops => {
                drop(inner);
                self.strategy.write().await.loosen_stops();
                return Ok(-0.01);
            }
            AgentAction::IncreaseSize => {
                drop(inner);
                self.strategy.write().await.increase_size();
                return Ok(0.0);
            }
            AgentAction::DecreaseSize => {
                drop(inner);
                self.strategy.write().await.decrease_size();
                return Ok(0.01);
            }
        };

        Ok(reward)
    }

    async fn persist(&self) -> Result<()> {
        let strategy = self.strategy.read().await.clone();
        let snapshot = {
            let inner = self.inner.read().await;
            AgentSnapshot {
                qtable: inner.qtable.to_entries(),
                metrics: inner.metrics.clone(),
                strategy,
                recent_trades: inner.recent_trades.iter().cloned().collect(),
                epsilon: inner.epsilon,
            }
        };
        self.store.save_agent_snapshot(&snapshot).await
    }
}

fn observe(inner: &AgentInner) -> AgentState {
    AgentState::discretize(&PortfolioObservation {
        open_positions: inner.sim_positions.len(),
        capital: inner.metrics.capital,
        starting_capital: inner.metrics.starting_capital,
        drawdown: inner.metrics.drawdown(),
        win_rate: inner.metrics.win_rate(),
        consecutive_wins: inner.metrics.consecutive_wins,
        consecutive_losses: inner.metrics.consecutive_losses,
        hour: Utc::now().hour(),
    })
}

/// Open a synthetic position with a sampled initial outcome.
/// Aggressive entries swing wider in both directions.
fn enter(inner: &mut AgentInner, base: f64, aggressive: bool) -> f64 {
    let (win_prob, win_range, loss_range) = if aggressive {
        (0.45, (0.2, 1.2), (-0.6, -0.1))
    } else {
        (0.55, (0.05, 0.4), (-0.25, -0.05))
    };

    let pnl = if inner.rng.gen::<f64>() < win_prob {
        base * inner.rng.gen_range(win_range.0..win_range.1)
    } else {
        base * inner.rng.gen_range(loss_range.0..loss_range.1)
    };

    inner.sim_positions.push(SimPosition {
        notional: base,
        unrealized_pnl: pnl,
        aggressive,
    });

    pnl / base
}

/// Random-walk the unrealized P&L of every open synthetic position
fn drift_positions(inner: &mut AgentInner, base: f64) {
    for i in 0..inner.sim_positions.len() {
        let scale = if inner.sim_positions[i].aggressive {
            0.15
        } else {
            0.05
        };
        let delta = base * inner.rng.gen_range(-scale..scale);
        inner.sim_positions[i].unrealized_pnl += delta;
    }
}

/// Realize a synthetic pnl into capital, metrics and the trade log
fn realize(inner: &mut AgentInner, pnl: f64, base: f64, action: &str) {
    inner.metrics.record_trade(pnl, base);
    inner.trades_since_optimize += 1;
    inner.recent_trades.push_back(AgentTrade {
        pnl,
        action: action.to_string(),
        timestamp: Utc::now(),
    });
    if inner.recent_trades.len() > RECENT_TRADE_CAP {
        inner.recent_trades.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn agent() -> Arc<TradingAgent> {
        let strategy = Arc::new(RwLock::new(Strategy::from_engine_config(
            &EngineConfig::default(),
        )));
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::at_dir(dir.into_path()));
        Arc::new(TradingAgent::new(AgentConfig::default(), strategy, store))
    }

    #[tokio::test]
    async fn test_metrics_streaks() {
        let mut metrics = PerformanceMetrics::new(10.0);
        metrics.record_trade(0.1, 0.1);
        metrics.record_trade(0.2, 0.1);
        metrics.record_trade(0.1, 0.1);
        assert_eq!(metrics.consecutive_wins, 3);
        assert_eq!(metrics.consecutive_losses, 0);

        metrics.record_trade(-0.1, 0.1);
        assert_eq!(metrics.consecutive_wins, 0);
        assert_eq!(metrics.consecutive_losses, 1);
        assert!((metrics.capital - 10.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_metrics_drawdown() {
        let mut metrics = PerformanceMetrics::new(10.0);
        metrics.record_trade(2.0, 0.1); // peak 12
        metrics.record_trade(-3.0, 0.1); // capital 9
        assert!((metrics.drawdown() - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_wait_penalty() {
        let agent = agent();
        let strategy = agent.strategy.read().await.clone();
        let reward = agent
            .execute_action(AgentAction::Wait, &strategy)
            .await
            .unwrap();
        assert!((reward + 0.01).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_enter_opens_position_and_scales_reward() {
        let agent = agent();
        let strategy = agent.strategy.read().await.clone();
        let reward = agent
            .execute_action(AgentAction::EnterConservative, &strategy)
            .await
            .unwrap();

        let inner = agent.inner.read().await;
        assert_eq!(inner.sim_positions.len(), 1);
        let expected = inner.sim_positions[0].unrealized_pnl / strategy.sizing.base_amount_sol;
        // Reward equals the sampled outcome scaled by base amount
        assert!((reward - expected).abs() < 1e-9);
        assert_eq!(inner.sim_positions[0].notional, strategy.sizing.base_amount_sol);
    }

    #[tokio::test]
    async fn test_exit_all_realizes_trades() {
        let agent = agent();
        let strategy = agent.strategy.read().await.clone();
        {
            let mut inner = agent.inner.write().await;
            inner.sim_positions.push(SimPosition {
                notional: 0.1,
                unrealized_pnl: 0.05,
                aggressive: false,
            });
            inner.sim_positions.push(SimPosition {
                notional: 0.1,
                unrealized_pnl: -0.02,
                aggressive: false,
            });
        }

        let reward = agent
            .execute_action(AgentAction::ExitAll, &strategy)
            .await
            .unwrap();

        let inner = agent.inner.read().await;
        assert!(inner.sim_positions.is_empty());
        assert_eq!(inner.metrics.total_trades, 2);
        // Drift perturbs the summed pnl slightly; the sign and scale hold
        assert!(reward > 0.0);
        assert_eq!(inner.recent_trades.len(), 2);
    }

    #[tokio::test]
    async fn test_exit_losers_half_credit() {
        let agent = agent();
        let strategy = agent.strategy.read().await.clone();
        let base = strategy.sizing.base_amount_sol;
        {
            let mut inner = agent.inner.write().await;
            // Far from zero so drift cannot flip the sign
            inner.sim_positions.push(SimPosition {
                notional: base,
                unrealized_pnl: -10.0 * base,
                aggressive: false,
            });
            inner.sim_positions.push(SimPosition {
                notional: base,
                unrealized_pnl: 10.0 * base,
                aggressive: false,
            });
        }

        let reward = agent
            .execute_action(AgentAction::ExitLosers, &strategy)
            .await
            .unwrap();

        let inner = agent.inner.read().await;
        assert_eq!(inner.sim_positions.len(), 1);
        assert!(inner.sim_positions[0].unrealized_pnl > 0.0);
        // Half of the ~10x-base loss magnitude
        assert!(reward > 4.0 && reward < 6.0, "reward was {reward}");
    }

    #[tokio::test]
    async fn test_tuner_actions_move_strategy() {
        let agent = agent();
        let strategy_before = agent.strategy.read().await.clone();

        let reward = agent
            .execute_action(AgentAction::TightenStops, &strategy_before)
            .await
            .unwrap();
        assert!((reward - 0.01).abs() < 1e-12);
        assert!(
            agent.strategy.read().await.exit.stop_loss_frac
                < strategy_before.exit.stop_loss_frac
        );

        let reward = agent
            .execute_action(AgentAction::DecreaseSize, &strategy_before)
            .await
            .unwrap();
        assert!((reward - 0.01).abs() < 1e-12);
        assert!(
            agent.strategy.read().await.sizing.base_amount_sol
                < strategy_before.sizing.base_amount_sol
        );
    }

    #[tokio::test]
    async fn test_start_stop_persists_snapshot() {
        let strategy = Arc::new(RwLock::new(Strategy::from_engine_config(
            &EngineConfig::default(),
        )));
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::at_dir(dir.path().to_path_buf()));
        let agent = Arc::new(TradingAgent::new(
            AgentConfig::default(),
            strategy.clone(),
            store.clone(),
        ));

        agent.clone().start(TradingMode::Simulation, 10.0).await.unwrap();
        assert!(matches!(
            agent.clone().start(TradingMode::Simulation, 10.0).await,
            Err(Error::AgentAlreadyRunning)
        ));

        let summary = agent.stop().await.unwrap();
        assert_eq!(summary.capital, agent.get_performance().await.capital);

        let snapshot = store.load_agent_snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.metrics.starting_capital, 10.0);

        // A fresh agent restores the persisted policy on start
        let agent2 = Arc::new(TradingAgent::new(
            AgentConfig::default(),
            strategy,
            store,
        ));
        agent2.clone().start(TradingMode::Simulation, 10.0).await.unwrap();
        agent2.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_decision_history_is_bounded_and_recent_first() {
        let agent = agent();
        {
            let mut inner = agent.inner.write().await;
            for i in 0..10 {
                inner.decisions.push_back(DecisionRecord {
                    timestamp: Utc::now(),
                    state_key: format!("s{i}"),
                    action: AgentAction::Wait,
                    reward: 0.0,
                    epsilon: 0.3,
                });
            }
        }
        let history = agent.get_decision_history(3).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].state_key, "s9");
    }
}
