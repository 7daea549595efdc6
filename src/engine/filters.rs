//! Token admission filters and risk scoring
//!
//! Filters reject tokens on hard thresholds; the risk score grades the
//! survivors. Null metadata fields never fail a filter, they just
//! contribute nothing to the score.

use crate::engine::strategy::EntryThresholds;
use crate::scanner::types::TokenCandidate;

/// Reason why a token was declined at admission
#[derive(Debug, Clone, PartialEq)]
pub enum FilterReason {
    TooOld(i64),
    LiquidityBelowMinimum(f64),
    MarketCapAboveMaximum(f64),
    VolumeBelowMinimum(f64),
    TooFewHolders(u32),
    NotVerified,
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::TooOld(age) => write!(f, "token age {}s exceeds maximum", age),
            FilterReason::LiquidityBelowMinimum(sol) => {
                write!(f, "liquidity {} SOL below minimum", sol)
            }
            FilterReason::MarketCapAboveMaximum(sol) => {
                write!(f, "market cap {} SOL above maximum", sol)
            }
            FilterReason::VolumeBelowMinimum(sol) => {
                write!(f, "24h volume {} SOL below minimum", sol)
            }
            FilterReason::TooFewHolders(count) => write!(f, "only {} holders", count),
            FilterReason::NotVerified => write!(f, "token is not verified"),
        }
    }
}

/// Admission outcome
#[derive(Debug, Clone, PartialEq)]
pub enum FilterResult {
    Pass,
    Filtered(FilterReason),
}

impl FilterResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }
}

/// Check every threshold whose input is present
pub fn admission_check(token: &TokenCandidate, thresholds: &EntryThresholds) -> FilterResult {
    let age = token.age_secs();
    if age > thresholds.max_age_secs {
        return FilterResult::Filtered(FilterReason::TooOld(age));
    }

    if let Some(liquidity) = token.liquidity_sol {
        if liquidity < thresholds.min_liquidity_sol {
            return FilterResult::Filtered(FilterReason::LiquidityBelowMinimum(liquidity));
        }
    }

    if let Some(market_cap) = token.market_cap_sol {
        if market_cap > thresholds.max_market_cap_sol {
            return FilterResult::Filtered(FilterReason::MarketCapAboveMaximum(market_cap));
        }
    }

    if let Some(volume) = token.volume_24h_sol {
        if volume < thresholds.min_volume_24h_sol {
            return FilterResult::Filtered(FilterReason::VolumeBelowMinimum(volume));
        }
    }

    if let Some(holders) = token.holders {
        if holders < thresholds.min_holders {
            return FilterResult::Filtered(FilterReason::TooFewHolders(holders));
        }
    }

    if thresholds.require_verified && token.is_verified != Some(true) {
        return FilterResult::Filtered(FilterReason::NotVerified);
    }

    FilterResult::Pass
}

/// Continuous risk score in [0, 1]; higher is riskier.
/// Per-factor contributions are averaged over the factors actually
/// present; a token with no factors scores a neutral 0.5.
pub fn risk_score(token: &TokenCandidate) -> f64 {
    let mut total = 0.0;
    let mut factors = 0u32;

    if let Some(liquidity) = token.liquidity_sol {
        total += (1.0 - liquidity / 10.0).max(0.0);
        factors += 1;
    }

    if let Some(market_cap) = token.market_cap_sol {
        total += (market_cap / 200.0).min(1.0);
        factors += 1;
    }

    if let Some(holders) = token.holders {
        total += (1.0 - holders as f64 / 100.0).max(0.0);
        factors += 1;
    }

    if let Some(volume) = token.volume_24h_sol {
        total += (1.0 - volume / 5.0).max(0.0);
        factors += 1;
    }

    if token.is_verified == Some(false) {
        total += 0.3;
        factors += 1;
    }

    if factors == 0 {
        return 0.5;
    }

    (total / factors as f64).clamp(0.0, 1.0)
}

/// Threshold below which the risk-score rule buys
pub const RISK_SCORE_BUY_THRESHOLD: f64 = 0.6;
