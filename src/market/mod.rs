//! Market data access
//!
//! Normalized quote/history contract over an external market-data API.

pub mod client;
pub mod types;

pub use client::{HttpMarketData, MarketData};
pub use types::{
    GlobalMetrics, HistoricalInterval, HistoricalPoint, Listing, NormalizedQuote, TrendingCoin,
};
