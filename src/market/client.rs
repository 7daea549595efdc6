//! HTTP market data client
//!
//! Speaks a CoinMarketCap-style REST API and maps every response into
//! the canonical shapes from `types`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::market::types::{
    normalize_history, normalize_wire, GlobalMetrics, HistoricalInterval, HistoricalPoint,
    Listing, NormalizedQuote, TrendingCoin, WireCoin, WireEnvelope, WireGainersLosers,
    WireGlobal, WireHistorical,
};

/// Market data access used by the engine, agent and alert evaluators
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<NormalizedQuote>;

    async fn get_historical_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: HistoricalInterval,
    ) -> Result<Vec<HistoricalPoint>>;

    async fn get_listings(&self, limit: u32, start: u32) -> Result<Vec<Listing>>;

    async fn get_trending(&self) -> Result<Vec<TrendingCoin>>;

    async fn get_gainers_losers(&self) -> Result<(Vec<TrendingCoin>, Vec<TrendingCoin>)>;

    async fn get_global_metrics(&self) -> Result<GlobalMetrics>;

    async fn get_metadata(&self, symbol: &str) -> Result<serde_json::Value>;

    async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64>;
}

/// Reqwest-backed implementation
pub struct HttpMarketData {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpMarketData {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-CMC_PRO_API_KEY", key);
        }

        debug!(%url, "Fetching market data");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("market data HTTP {}: {}", status, body)));
        }

        Ok(response.json::<T>().await?)
    }

    fn coin_to_quote(coin: &WireCoin) -> NormalizedQuote {
        normalize_wire(&coin.symbol, &coin.quote.usd)
    }
}

#[async_trait]
impl MarketData for HttpMarketData {
    async fn get_quote(&self, symbol: &str) -> Result<NormalizedQuote> {
        let envelope: WireEnvelope<std::collections::HashMap<String, Vec<WireCoin>>> = self
            .get_json(
                "/v2/cryptocurrency/quotes/latest",
                &[("symbol", symbol.to_uppercase())],
            )
            .await?;

        envelope
            .data
            .get(&symbol.to_uppercase())
            .and_then(|coins| coins.first())
            .map(Self::coin_to_quote)
            .ok_or_else(|| Error::QuoteUnavailable(symbol.to_string()))
    }

    async fn get_historical_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: HistoricalInterval,
    ) -> Result<Vec<HistoricalPoint>> {
        let envelope: WireEnvelope<WireHistorical> = self
            .get_json(
                "/v2/cryptocurrency/quotes/historical",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("time_start", start.to_rfc3339()),
                    ("time_end", end.to_rfc3339()),
                    ("interval", interval.as_str().to_string()),
                ],
            )
            .await
            .map_err(|e| Error::HistoryUnavailable {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;

        let points = envelope
            .data
            .quotes
            .iter()
            .map(|q| HistoricalPoint {
                timestamp: q.timestamp,
                price: q.quote.usd.price.unwrap_or(0.0),
                volume: q.quote.usd.volume_24h.unwrap_or(0.0),
            })
            .collect();

        Ok(normalize_history(points))
    }

    async fn get_listings(&self, limit: u32, start: u32) -> Result<Vec<Listing>> {
        let envelope: WireEnvelope<Vec<WireCoin>> = self
            .get_json(
                "/v1/cryptocurrency/listings/latest",
                &[
                    ("limit", limit.to_string()),
                    ("start", (start.max(1)).to_string()),
                ],
            )
            .await?;

        Ok(envelope
            .data
            .iter()
            .map(|coin| Listing {
                symbol: coin.symbol.to_uppercase(),
                name: coin.name.clone().unwrap_or_default(),
                rank: coin.cmc_rank.unwrap_or(0),
                quote: Self::coin_to_quote(coin),
            })
            .collect())
    }

    async fn get_trending(&self) -> Result<Vec<TrendingCoin>> {
        let envelope: WireEnvelope<Vec<WireCoin>> = self
            .get_json("/v1/cryptocurrency/trending/latest", &[])
            .await?;

        Ok(envelope
            .data
            .iter()
            .map(|coin| TrendingCoin {
                symbol: coin.symbol.to_uppercase(),
                name: coin.name.clone().unwrap_or_default(),
                quote: Self::coin_to_quote(coin),
            })
            .collect())
    }

    async fn get_gainers_losers(&self) -> Result<(Vec<TrendingCoin>, Vec<TrendingCoin>)> {
        let envelope: WireEnvelope<WireGainersLosers> = self
            .get_json("/v1/cryptocurrency/trending/gainers-losers", &[])
            .await?;

        let map = |coins: &[WireCoin]| {
            coins
                .iter()
                .map(|coin| TrendingCoin {
                    symbol: coin.symbol.to_uppercase(),
                    name: coin.name.clone().unwrap_or_default(),
                    quote: Self::coin_to_quote(coin),
                })
                .collect::<Vec<_>>()
        };

        Ok((map(&envelope.data.gainers), map(&envelope.data.losers)))
    }

    async fn get_global_metrics(&self) -> Result<GlobalMetrics> {
        let envelope: WireEnvelope<WireGlobal> = self
            .get_json("/v1/global-metrics/quotes/latest", &[])
            .await?;

        Ok(GlobalMetrics {
            total_market_cap: envelope.data.quote.usd.total_market_cap.unwrap_or(0.0),
            total_volume_24h: envelope.data.quote.usd.total_volume_24h.unwrap_or(0.0),
            btc_dominance: envelope.data.btc_dominance.unwrap_or(0.0),
            eth_dominance: envelope.data.eth_dominance.unwrap_or(0.0),
            active_cryptocurrencies: envelope.data.active_cryptocurrencies.unwrap_or(0),
        })
    }

    async fn get_metadata(&self, symbol: &str) -> Result<serde_json::Value> {
        let envelope: WireEnvelope<serde_json::Value> = self
            .get_json(
                "/v2/cryptocurrency/info",
                &[("symbol", symbol.to_uppercase())],
            )
            .await?;
        Ok(envelope.data)
    }

    async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        #[derive(serde::Deserialize)]
        struct ConvertQuote {
            price: f64,
        }
        #[derive(serde::Deserialize)]
        struct ConvertData {
            quote: std::collections::HashMap<String, ConvertQuote>,
        }

        let envelope: WireEnvelope<ConvertData> = self
            .get_json(
                "/v2/tools/price-conversion",
                &[
                    ("amount", amount.to_string()),
                    ("symbol", from.to_uppercase()),
                    ("convert", to.to_uppercase()),
                ],
            )
            .await?;

        envelope
            .data
            .quote
            .get(&to.to_uppercase())
            .map(|q| q.price)
            .ok_or_else(|| Error::QuoteUnavailable(to.to_string()))
    }
}
