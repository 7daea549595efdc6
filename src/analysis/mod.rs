//! Market analysis services
//!
//! Replaceable statistical kernels for pattern, sentiment and anomaly
//! detection, plus the fingerprinted TTL cache for their results.

pub mod cache;
pub mod service;
pub mod types;

pub use cache::{AnalysisCache, CacheKind};
pub use service::Analyzer;
pub use types::{
    AnomalyReport, PatternMatch, PredictionResult, SentimentLabel, SentimentResult,
};
