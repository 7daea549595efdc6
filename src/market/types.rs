//! Market data wire and canonical types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical quote shape used throughout the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuote {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
    pub change_7d: Option<f64>,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub last_updated: DateTime<Utc>,
}

/// Canonical historical series point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

/// Sampling interval for historical series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricalInterval {
    Hourly,
    Daily,
    Weekly,
}

impl HistoricalInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoricalInterval::Hourly => "hourly",
            HistoricalInterval::Daily => "daily",
            HistoricalInterval::Weekly => "weekly",
        }
    }
}

/// One listing row
#[derive(Debug, Clone)]
pub struct Listing {
    pub symbol: String,
    pub name: String,
    pub rank: u32,
    pub quote: NormalizedQuote,
}

/// Trending coin entry
#[derive(Debug, Clone)]
pub struct TrendingCoin {
    pub symbol: String,
    pub name: String,
    pub quote: NormalizedQuote,
}

/// Global market metrics
#[derive(Debug, Clone)]
pub struct GlobalMetrics {
    pub total_market_cap: f64,
    pub total_volume_24h: f64,
    pub btc_dominance: f64,
    pub eth_dominance: f64,
    pub active_cryptocurrencies: u32,
}

// Wire types from the upstream API (CoinMarketCap-style envelope)

#[derive(Debug, Deserialize)]
pub(crate) struct WireEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireQuoteUsd {
    pub price: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireQuote {
    #[serde(rename = "USD")]
    pub usd: WireQuoteUsd,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCoin {
    pub symbol: String,
    pub name: Option<String>,
    pub cmc_rank: Option<u32>,
    pub quote: WireQuote,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireHistoricalQuote {
    pub timestamp: DateTime<Utc>,
    pub quote: WireQuote,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireHistorical {
    pub quotes: Vec<WireHistoricalQuote>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireGlobalUsd {
    pub total_market_cap: Option<f64>,
    pub total_volume_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireGlobalQuote {
    #[serde(rename = "USD")]
    pub usd: WireGlobalUsd,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireGlobal {
    pub quote: WireGlobalQuote,
    pub btc_dominance: Option<f64>,
    pub eth_dominance: Option<f64>,
    pub active_cryptocurrencies: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireGainersLosers {
    #[serde(default)]
    pub gainers: Vec<WireCoin>,
    #[serde(default)]
    pub losers: Vec<WireCoin>,
}

/// Map a wire coin quote into the canonical shape.
/// Missing optional fields collapse to zero, never to an error.
pub(crate) fn normalize_wire(symbol: &str, usd: &WireQuoteUsd) -> NormalizedQuote {
    normalize(NormalizedQuote {
        symbol: symbol.to_string(),
        price: usd.price.unwrap_or(0.0),
        change_24h: usd.percent_change_24h.unwrap_or(0.0),
        change_7d: usd.percent_change_7d,
        volume_24h: usd.volume_24h.unwrap_or(0.0),
        market_cap: usd.market_cap.unwrap_or(0.0),
        last_updated: usd.last_updated.unwrap_or_else(Utc::now),
    })
}

/// Canonicalize a quote: uppercase symbol, clamp non-finite and negative
/// magnitudes to zero. Idempotent by construction.
pub fn normalize(mut quote: NormalizedQuote) -> NormalizedQuote {
    quote.symbol = quote.symbol.to_uppercase();
    let clamp = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
    quote.price = clamp(quote.price);
    quote.volume_24h = clamp(quote.volume_24h);
    quote.market_cap = clamp(quote.market_cap);
    if !quote.change_24h.is_finite() {
        quote.change_24h = 0.0;
    }
    quote
}

/// Canonicalize a historical series: sorted ascending by timestamp,
/// non-finite values dropped. Idempotent.
pub fn normalize_history(mut points: Vec<HistoricalPoint>) -> Vec<HistoricalPoint> {
    points.retain(|p| p.price.is_finite() && p.price > 0.0);
    points.sort_by_key(|p| p.timestamp);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = NormalizedQuote {
            symbol: "sol".into(),
            price: -3.0,
            change_24h: f64::NAN,
            change_7d: Some(2.0),
            volume_24h: f64::INFINITY,
            market_cap: 50.0,
            last_updated: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        };
        let once = normalize(raw.clone());
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.symbol, "SOL");
        assert_eq!(once.price, 0.0);
        assert_eq!(once.volume_24h, 0.0);
        assert_eq!(once.change_24h, 0.0);
    }

    #[test]
    fn test_normalize_history_sorts_and_drops() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let points = vec![
            HistoricalPoint {
                timestamp: t1,
                price: 2.0,
                volume: 5.0,
            },
            HistoricalPoint {
                timestamp: t0,
                price: f64::NAN,
                volume: 5.0,
            },
            HistoricalPoint {
                timestamp: t0,
                price: 1.0,
                volume: 5.0,
            },
        ];
        let once = normalize_history(points);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].timestamp, t0);
        let twice = normalize_history(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_wire_normalization_defaults() {
        let usd = WireQuoteUsd {
            price: Some(1.5),
            percent_change_24h: None,
            percent_change_7d: None,
            volume_24h: None,
            market_cap: None,
            last_updated: None,
        };
        let q = normalize_wire("btc", &usd);
        assert_eq!(q.symbol, "BTC");
        assert_eq!(q.price, 1.5);
        assert_eq!(q.volume_24h, 0.0);
    }
}
