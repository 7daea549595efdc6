//! Live scanner and trading engine
//!
//! Dual-loop system: the scan loop discovers and admits launchpad
//! tokens; the monitor loop maintains open positions and enforces
//! exit conditions.

pub mod ai_overlay;
pub mod engine;
pub mod filters;
pub mod strategy;
pub mod types;

pub use engine::TradingEngine;
pub use strategy::Strategy;
pub use types::{
    EngineEvent, EngineStats, EngineStatus, ExitReason, Position, PositionState, TradeOutcome,
    TradeRecord,
};
