//! Agent action space
//!
//! Availability is bounded by portfolio state: entries need free
//! capacity, exits need open positions, tuners are always on.

use serde::{Deserialize, Serialize};

/// High-level actions the agent can choose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    Wait,
    EnterAggressive,
    EnterConservative,
    ExitAll,
    ExitLosers,
    ExitWinners,
    TightenStops,
    LoosenStops,
    IncreaseSize,
    DecreaseSize,
}

impl AgentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentAction::Wait => "wait",
            AgentAction::EnterAggressive => "enter_aggressive",
            AgentAction::EnterConservative => "enter_conservative",
            AgentAction::ExitAll => "exit_all",
            AgentAction::ExitLosers => "exit_losers",
            AgentAction::ExitWinners => "exit_winners",
            AgentAction::TightenStops => "tighten_stops",
            AgentAction::LoosenStops => "loosen_stops",
            AgentAction::IncreaseSize => "increase_size",
            AgentAction::DecreaseSize => "decrease_size",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "wait" => Some(AgentAction::Wait),
            "enter_aggressive" => Some(AgentAction::EnterAggressive),
            "enter_conservative" => Some(AgentAction::EnterConservative),
            "exit_all" => Some(AgentAction::ExitAll),
            "exit_losers" => Some(AgentAction::ExitLosers),
            "exit_winners" => Some(AgentAction::ExitWinners),
            "tighten_stops" => Some(AgentAction::TightenStops),
            "loosen_stops" => Some(AgentAction::LoosenStops),
            "increase_size" => Some(AgentAction::IncreaseSize),
            "decrease_size" => Some(AgentAction::DecreaseSize),
            _ => None,
        }
    }

    /// Actions available given current portfolio occupancy
    pub fn available(open_positions: usize, max_positions: usize) -> Vec<AgentAction> {
        let mut actions = vec![AgentAction::Wait];

        if open_positions < max_positions {
            actions.push(AgentAction::EnterAggressive);
            actions.push(AgentAction::EnterConservative);
        }

        if open_positions > 0 {
            actions.push(AgentAction::ExitAll);
            actions.push(AgentAction::ExitLosers);
            actions.push(AgentAction::ExitWinners);
        }

        actions.push(AgentAction::TightenStops);
        actions.push(AgentAction::LoosenStops);
        actions.push(AgentAction::IncreaseSize);
        actions.push(AgentAction::DecreaseSize);

        actions
    }
}

impl std::fmt::Display for AgentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
