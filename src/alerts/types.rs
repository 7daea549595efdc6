//! Alert types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Comparison operator for price alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceOp {
    #[serde(rename = ">")]
    Above,
    #[serde(rename = "<")]
    Below,
    #[serde(rename = ">=")]
    AboveOrEqual,
    #[serde(rename = "<=")]
    BelowOrEqual,
}

impl PriceOp {
    pub fn matches(&self, price: f64, threshold: f64) -> bool {
        match self {
            PriceOp::Above => price > threshold,
            PriceOp::Below => price < threshold,
            PriceOp::AboveOrEqual => price >= threshold,
            PriceOp::BelowOrEqual => price <= threshold,
        }
    }
}

impl std::fmt::Display for PriceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceOp::Above => write!(f, ">"),
            PriceOp::Below => write!(f, "<"),
            PriceOp::AboveOrEqual => write!(f, ">="),
            PriceOp::BelowOrEqual => write!(f, "<="),
        }
    }
}

/// Condition evaluated on each tick
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertCondition {
    Price { op: PriceOp, threshold: f64 },
    /// Triggers when any detected pattern name contains the target
    /// (case-insensitive)
    Pattern { target: String },
    /// Triggers when the sentiment label contains the target
    /// (case-insensitive)
    Sentiment { target: String },
    /// Triggers on any anomaly burst
    Anomaly,
}

impl AlertCondition {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AlertCondition::Price { .. } => "price",
            AlertCondition::Pattern { .. } => "pattern",
            AlertCondition::Sentiment { .. } => "sentiment",
            AlertCondition::Anomaly => "anomaly",
        }
    }
}

/// A user-declared alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub symbol: String,
    pub condition: AlertCondition,
    pub created_at: DateTime<Utc>,
    pub last_check: Option<DateTime<Utc>>,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    /// Evaluation payload captured when the alert fired
    pub trigger_data: Option<serde_json::Value>,
}

impl Alert {
    pub fn new(symbol: impl Into<String>, condition: AlertCondition) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into().to_uppercase(),
            condition,
            created_at: Utc::now(),
            last_check: None,
            triggered: false,
            triggered_at: None,
            trigger_data: None,
        }
    }
}

/// Counters over the alert list
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub triggered: usize,
    pub pending: usize,
    pub price: usize,
    pub pattern: usize,
    pub sentiment: usize,
    pub anomaly: usize,
}
