//! Engine types
//!
//! Positions, trades, statistics and the event surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TradingMode;
use crate::scanner::types::TokenCandidate;

/// Position lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Opening,
    Open,
    Closing,
    Closed,
    Failed,
}

/// An owned token quantity with its exit conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub token: TokenCandidate,
    pub entry_price: f64,
    pub current_price: f64,
    pub entry_time: DateTime<Utc>,
    /// SOL spent on entry
    pub notional_sol: f64,
    pub tokens_owned: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Trailing reference; only set once price makes a new high
    pub trailing_stop_price: Option<f64>,
    pub highest_price: f64,
    pub signature: String,
    pub strategy_tag: String,
    /// Summary of the AI decision that approved this entry, if any
    pub ai_decision: Option<String>,
    pub db_position_id: Option<String>,
    pub state: PositionState,
    /// Exit reason recorded when the position entered Closing; kept so a
    /// failed sell retries with the original label
    pub pending_exit: Option<ExitReason>,
}

impl Position {
    /// Minutes since entry
    pub fn minutes_held(&self) -> i64 {
        (Utc::now() - self.entry_time).num_minutes()
    }

    /// Unrealized P&L in SOL at the current price
    pub fn unrealized_pnl(&self) -> f64 {
        self.tokens_owned * self.current_price - self.notional_sol
    }

    /// Unrealized P&L as a fraction of notional
    pub fn unrealized_pnl_frac(&self) -> f64 {
        if self.notional_sol == 0.0 {
            return 0.0;
        }
        self.unrealized_pnl() / self.notional_sol
    }

    /// Record a new price observation, maintaining the high-water mark
    /// and the trailing reference derived from it
    pub fn observe_price(&mut self, price: f64, trailing_stop_frac: f64) {
        self.current_price = price;
        if price > self.highest_price {
            self.highest_price = price;
            self.trailing_stop_price = Some(price * (1.0 - trailing_stop_frac));
        }
    }
}

/// Why a position was closed; the display strings are the recorded labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxHold,
    Shutdown,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "Stop loss hit"),
            ExitReason::TakeProfit => write!(f, "Take profit hit"),
            ExitReason::TrailingStop => write!(f, "Trailing stop hit"),
            ExitReason::MaxHold => write!(f, "Max hold time"),
            ExitReason::Shutdown => write!(f, "Engine shutdown"),
        }
    }
}

/// Win/loss classification of a closed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Win,
    Loss,
}

/// Append-only trade log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub kind: crate::backend::TradeAction,
    pub token_address: String,
    pub amount_sol: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    pub pnl: Option<f64>,
    pub outcome: Option<TradeOutcome>,
}

/// Session statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub tokens_scanned: u64,
    pub trades_executed: u64,
    pub failed_trades: u64,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_profit_sol: f64,
    pub total_loss_sol: f64,
    pub best_trade_sol: f64,
    pub worst_trade_sol: f64,
    /// Total SOL deployed across executed buys
    pub deployed_capital_sol: f64,
    pub started_at: Option<DateTime<Utc>>,
}

impl EngineStats {
    pub fn record_close(&mut self, pnl: f64) {
        if pnl >= 0.0 {
            self.winning_trades += 1;
            self.total_profit_sol += pnl;
        } else {
            self.losing_trades += 1;
            self.total_loss_sol += pnl.abs();
        }
        if pnl > self.best_trade_sol {
            self.best_trade_sol = pnl;
        }
        if pnl < self.worst_trade_sol {
            self.worst_trade_sol = pnl;
        }
    }

    pub fn net_pnl_sol(&self) -> f64 {
        self.total_profit_sol - self.total_loss_sol
    }

    pub fn closed_count(&self) -> u32 {
        self.winning_trades + self.losing_trades
    }

    pub fn win_rate(&self) -> f64 {
        let closed = self.closed_count();
        if closed == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / closed as f64
    }

    /// Return on deployed capital
    pub fn roi(&self) -> f64 {
        if self.deployed_capital_sol == 0.0 {
            return 0.0;
        }
        self.net_pnl_sol() / self.deployed_capital_sol
    }

    pub fn running_time(&self) -> chrono::Duration {
        self.started_at
            .map(|t| Utc::now() - t)
            .unwrap_or_else(chrono::Duration::zero)
    }
}

/// One line of the status snapshot per open position
#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub minutes_held: i64,
    pub pnl_frac: f64,
}

/// Point-in-time engine snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub mode: TradingMode,
    /// Per-platform scan counters
    pub platform_scans: Vec<(String, u64)>,
    pub win_rate: f64,
    pub net_pnl_sol: f64,
    pub positions: Vec<PositionSummary>,
}

/// Report returned by a successful start
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub status: String,
    pub mode: TradingMode,
    pub platforms: Vec<String>,
}

/// Events emitted by the engine (spec'd surface for embedders)
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TokenDiscovered(TokenCandidate),
    TradeExecuted {
        trade: TradeRecord,
        position_id: Option<Uuid>,
    },
    PositionClosed {
        position: Box<Position>,
        reason: ExitReason,
        pnl: f64,
        pnl_frac: f64,
    },
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(entry: f64, current: f64) -> Position {
        Position {
            id: Uuid::new_v4(),
            token: TokenCandidate::new("mint1", "pump.fun"),
            entry_price: entry,
            current_price: current,
            entry_time: Utc::now(),
            notional_sol: 0.1,
            tokens_owned: 0.1 / entry,
            stop_loss: entry * 0.75,
            take_profit: entry * 2.0,
            trailing_stop_price: None,
            highest_price: entry,
            signature: "sig".into(),
            strategy_tag: "scanner".into(),
            ai_decision: None,
            db_position_id: None,
            state: PositionState::Open,
            pending_exit: None,
        }
    }

    #[test]
    fn test_unrealized_pnl() {
        let p = position(0.001, 0.0015);
        // 100 tokens * 0.0015 = 0.15 SOL against 0.1 notional
        assert!((p.unrealized_pnl() - 0.05).abs() < 1e-9);
        assert!((p.unrealized_pnl_frac() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_observe_price_maintains_high_water() {
        let mut p = position(1.0, 1.0);
        p.observe_price(1.5, 0.15);
        assert_eq!(p.highest_price, 1.5);
        assert!((p.trailing_stop_price.unwrap() - 1.275).abs() < 1e-9);

        // A lower price never lowers the trailing reference
        p.observe_price(1.2, 0.15);
        assert_eq!(p.highest_price, 1.5);
        assert!((p.trailing_stop_price.unwrap() - 1.275).abs() < 1e-9);

        p.observe_price(1.8, 0.15);
        assert!((p.trailing_stop_price.unwrap() - 1.53).abs() < 1e-9);
    }

    #[test]
    fn test_exit_reason_labels() {
        assert_eq!(ExitReason::StopLoss.to_string(), "Stop loss hit");
        assert_eq!(ExitReason::TakeProfit.to_string(), "Take profit hit");
        assert_eq!(ExitReason::TrailingStop.to_string(), "Trailing stop hit");
        assert_eq!(ExitReason::MaxHold.to_string(), "Max hold time");
    }

    #[test]
    fn test_stats_accounting() {
        let mut stats = EngineStats::default();
        stats.record_close(0.05);
        stats.record_close(-0.03);
        stats.record_close(0.02);

        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert!((stats.net_pnl_sol() - 0.04).abs() < 1e-9);
        assert!((stats.best_trade_sol - 0.05).abs() < 1e-9);
        assert!((stats.worst_trade_sol + 0.03).abs() < 1e-9);
        assert!((stats.win_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_roi_uses_deployed_capital() {
        let mut stats = EngineStats::default();
        stats.deployed_capital_sol = 0.5;
        stats.record_close(0.05);
        assert!((stats.roi() - 0.1).abs() < 1e-9);
    }
}
