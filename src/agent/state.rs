//! State discretization
//!
//! Continuous portfolio metrics are bucketed into a small discrete
//! space so the Q-table stays tabular. Bucket boundaries are fixed.

use serde::{Deserialize, Serialize};

/// Raw observation before discretization
#[derive(Debug, Clone)]
pub struct PortfolioObservation {
    pub open_positions: usize,
    pub capital: f64,
    pub starting_capital: f64,
    /// Drawdown from the capital high-water mark, as a fraction
    pub drawdown: f64,
    pub win_rate: f64,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    /// Local hour of day, 0..24
    pub hour: u32,
}

/// Win/loss streak classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Streak {
    Hot,
    Cold,
    Neutral,
}

impl Streak {
    pub fn as_str(&self) -> &'static str {
        match self {
            Streak::Hot => "hot",
            Streak::Cold => "cold",
            Streak::Neutral => "neutral",
        }
    }
}

/// Coarse time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            0..=5 => TimeOfDay::Night,
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Night => "night",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        }
    }
}

/// Discretized state, the Q-table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentState {
    /// Clamped to 0..=5
    pub open_positions: usize,
    /// Bucket over capital / starting_capital at [0, 0.5, 0.8, 1.0, 1.5]
    pub capital_level: u8,
    /// Bucket over drawdown at [0, 0.1, 0.2, 0.3]
    pub drawdown_level: u8,
    /// Bucket over win rate at [0, 0.3, 0.5, 0.7]
    pub win_rate_level: u8,
    pub streak: Streak,
    pub time_of_day: TimeOfDay,
}

fn bucket(value: f64, boundaries: &[f64]) -> u8 {
    // boundaries[0] is always 0; the level is the count of interior
    // boundaries at or below the value
    let mut level = 0u8;
    for boundary in &boundaries[1..] {
        if value >= *boundary {
            level += 1;
        }
    }
    level
}

impl AgentState {
    pub fn discretize(observation: &PortfolioObservation) -> Self {
        let capital_ratio = if observation.starting_capital > 0.0 {
            observation.capital / observation.starting_capital
        } else {
            1.0
        };

        let streak = if observation.consecutive_wins >= 3 {
            Streak::Hot
        } else if observation.consecutive_losses >= 3 {
            Streak::Cold
        } else {
            Streak::Neutral
        };

        Self {
            open_positions: observation.open_positions.min(5),
            capital_level: bucket(capital_ratio, &[0.0, 0.5, 0.8, 1.0, 1.5]),
            drawdown_level: bucket(observation.drawdown, &[0.0, 0.1, 0.2, 0.3]),
            win_rate_level: bucket(observation.win_rate, &[0.0, 0.3, 0.5, 0.7]),
            streak,
            time_of_day: TimeOfDay::from_hour(observation.hour),
        }
    }

    /// Stable string key for the Q-table
    pub fn key(&self) -> String {
        format!(
            "p{}_c{}_d{}_w{}_{}_{}",
            self.open_positions,
            self.capital_level,
            self.drawdown_level,
            self.win_rate_level,
            self.streak.as_str(),
            self.time_of_day.as_str()
        )
    }
}
