//! Autonomous decision agent
//!
//! Tabular Q-learning over a discretized portfolio state, with an
//! epsilon-greedy policy and a persisted action-value table.

pub mod actions;
pub mod agent;
pub mod qlearning;
pub mod state;

pub use actions::AgentAction;
pub use agent::{AgentSnapshot, PerformanceMetrics, TradingAgent};
pub use qlearning::{FlatQEntry, QTable};
pub use state::{AgentState, PortfolioObservation, Streak, TimeOfDay};
