//! Analysis result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price prediction over a short horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    /// Predicted price at the end of the horizon
    pub predicted_price: f64,
    /// Expected change versus the last observed price
    pub expected_change_pct: f64,
    pub confidence: f64,
    pub horizon_days: u32,
    pub generated_at: DateTime<Utc>,
}

/// A detected chart pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Pattern name, e.g. "golden cross", "higher highs", "double bottom"
    pub name: String,
    pub confidence: f64,
    /// Index into the analyzed series where the pattern completed
    pub completed_at: usize,
}

/// Composite sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    VeryBearish,
    Bearish,
    Neutral,
    Bullish,
    VeryBullish,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::VeryBearish => "very bearish",
            SentimentLabel::Bearish => "bearish",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Bullish => "bullish",
            SentimentLabel::VeryBullish => "very bullish",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Composite sentiment over recent momentum and volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub symbol: String,
    pub label: SentimentLabel,
    /// Score in [-1, 1]; label buckets are derived from it
    pub score: f64,
    pub generated_at: DateTime<Utc>,
}

/// One anomalous observation in a series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// Z-score magnitude that flagged this point
    pub z_score: f64,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    PriceSpike,
    PriceCrash,
    VolumeBurst,
}

/// Anomaly scan summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub symbol: String,
    pub total_anomalies: usize,
    pub anomalies: Vec<Anomaly>,
    pub generated_at: DateTime<Utc>,
}
