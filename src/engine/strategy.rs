//! Shared strategy knobs
//!
//! Entry thresholds, exit bands and sizing live behind one lock. After
//! start, only the agent's bounded adjustments mutate them.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Thresholds a token must clear for admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryThresholds {
    pub min_liquidity_sol: f64,
    pub max_market_cap_sol: f64,
    pub min_volume_24h_sol: f64,
    pub max_age_secs: i64,
    pub min_holders: u32,
    pub require_verified: bool,
}

/// Exit bands applied to every new position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitBands {
    pub stop_loss_frac: f64,
    pub take_profit_frac: f64,
    pub trailing_stop_frac: f64,
    pub max_hold_minutes: i64,
}

/// Position sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sizing {
    pub base_amount_sol: f64,
    pub max_positions: usize,
    /// Fraction of capital a single trade may risk
    pub risk_per_trade: f64,
}

/// The full strategy record shared between engine and agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub entry: EntryThresholds,
    pub exit: ExitBands,
    pub sizing: Sizing,
}

// Bounds for agent adjustments
const MIN_STOP_LOSS_FRAC: f64 = 0.02;
const MAX_STOP_LOSS_FRAC: f64 = 0.60;
const MIN_BASE_AMOUNT_SOL: f64 = 0.01;
const MAX_BASE_AMOUNT_SOL: f64 = 10.0;

impl Strategy {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            entry: EntryThresholds {
                min_liquidity_sol: config.filters.min_liquidity_sol,
                max_market_cap_sol: config.filters.max_market_cap_sol,
                min_volume_24h_sol: config.filters.min_volume_24h_sol,
                max_age_secs: config.filters.max_token_age_secs,
                min_holders: config.filters.min_holders,
                require_verified: config.filters.require_verified,
            },
            exit: ExitBands {
                stop_loss_frac: config.stop_loss_frac,
                take_profit_frac: config.take_profit_frac,
                trailing_stop_frac: config.trailing_stop_frac,
                max_hold_minutes: config.max_hold_minutes,
            },
            sizing: Sizing {
                base_amount_sol: config.buy_amount_sol,
                max_positions: config.max_positions,
                risk_per_trade: 0.02,
            },
        }
    }

    /// Tighten the stop-loss band (agent action)
    pub fn tighten_stops(&mut self) {
        self.exit.stop_loss_frac = (self.exit.stop_loss_frac * 0.9).max(MIN_STOP_LOSS_FRAC);
    }

    /// Loosen the stop-loss band (agent action)
    pub fn loosen_stops(&mut self) {
        self.exit.stop_loss_frac = (self.exit.stop_loss_frac * 1.1).min(MAX_STOP_LOSS_FRAC);
    }

    /// Grow position size (agent action)
    pub fn increase_size(&mut self) {
        self.sizing.base_amount_sol = (self.sizing.base_amount_sol * 1.1).min(MAX_BASE_AMOUNT_SOL);
    }

    /// Shrink position size (agent action)
    pub fn decrease_size(&mut self) {
        self.sizing.base_amount_sol = (self.sizing.base_amount_sol * 0.9).max(MIN_BASE_AMOUNT_SOL);
    }

    /// Adaptive optimization pass, run every 10 recorded trades
    pub fn optimize(&mut self, win_rate: f64, sharpe: f64, consecutive_losses: u32) {
        if win_rate < 0.4 {
            self.exit.stop_loss_frac = (self.exit.stop_loss_frac * 0.95).max(MIN_STOP_LOSS_FRAC);
            self.sizing.base_amount_sol =
                (self.sizing.base_amount_sol * 0.9).max(MIN_BASE_AMOUNT_SOL);
        }

        if win_rate > 0.6 && sharpe > 1.5 {
            self.sizing.base_amount_sol =
                (self.sizing.base_amount_sol * 1.05).min(MAX_BASE_AMOUNT_SOL);
        }

        if consecutive_losses >= 3 {
            self.entry.min_liquidity_sol *= 1.2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> Strategy {
        Strategy::from_engine_config(&EngineConfig::default())
    }

    #[test]
    fn test_from_config_copies_filters() {
        let config = EngineConfig::default();
        let strategy = Strategy::from_engine_config(&config);
        assert_eq!(strategy.entry.min_liquidity_sol, config.filters.min_liquidity_sol);
        assert_eq!(strategy.exit.stop_loss_frac, config.stop_loss_frac);
        assert_eq!(strategy.sizing.max_positions, config.max_positions);
    }

    #[test]
    fn test_stop_adjustments_are_bounded() {
        let mut s = strategy();
        for _ in 0..100 {
            s.tighten_stops();
        }
        assert!(s.exit.stop_loss_frac >= MIN_STOP_LOSS_FRAC);

        for _ in 0..100 {
            s.loosen_stops();
        }
        assert!(s.exit.stop_loss_frac <= MAX_STOP_LOSS_FRAC);
    }

    #[test]
    fn test_optimize_shrinks_on_poor_win_rate() {
        let mut s = strategy();
        let before = s.sizing.base_amount_sol;
        s.optimize(0.3, 0.5, 0);
        assert!(s.sizing.base_amount_sol < before);
        assert!(s.exit.stop_loss_frac < strategy().exit.stop_loss_frac);
    }

    #[test]
    fn test_optimize_grows_on_strong_performance() {
        let mut s = strategy();
        let before = s.sizing.base_amount_sol;
        s.optimize(0.7, 2.0, 0);
        assert!(s.sizing.base_amount_sol > before);
    }

    #[test]
    fn test_optimize_raises_liquidity_floor_on_loss_streak() {
        let mut s = strategy();
        let before = s.entry.min_liquidity_sol;
        s.optimize(0.5, 1.0, 3);
        assert!((s.entry.min_liquidity_sol - before * 1.2).abs() < 1e-9);
    }
}
