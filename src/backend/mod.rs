//! Trade execution backend
//!
//! Narrow contract over the external execution service: buy/sell,
//! current price, and optional database mirroring of positions. The
//! engine degrades to standalone operation when the optional endpoints
//! are unreachable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Trade request sent to the execution endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub token_address: String,
    /// SOL to spend (buy) or tokens to sell (sell)
    pub amount: f64,
    /// Ask the backend for MEV-protected submission
    pub use_mev_protection: bool,
}

/// Execution result
#[derive(Debug, Clone, Deserialize)]
pub struct TradeResult {
    pub success: bool,
    pub signature: Option<String>,
    /// Fill price in SOL per token
    pub price: Option<f64>,
    pub amount: Option<f64>,
    /// SOL received (sell only)
    pub proceeds: Option<f64>,
    pub error: Option<String>,
}

/// Position mirror payload for the backend database
#[derive(Debug, Clone, Serialize)]
pub struct PositionMirror {
    pub token_address: String,
    pub symbol: String,
    pub entry_price: f64,
    pub amount_sol: f64,
    pub signature: String,
    pub strategy_tag: String,
}

/// Close mirror payload
#[derive(Debug, Clone, Serialize)]
pub struct CloseMirror {
    pub db_position_id: String,
    pub exit_price: f64,
    pub pnl: f64,
    pub reason: String,
}

/// Execution service contract consumed by the trading engine
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResult>;

    /// Current price in SOL per token
    async fn get_current_price(&self, token_address: &str) -> Result<f64>;

    /// Mirror a newly opened position; `None` when mirroring is
    /// unavailable (standalone mode)
    async fn mirror_open(&self, position: &PositionMirror) -> Option<String>;

    /// Mirror a close; failures are swallowed
    async fn mirror_close(&self, close: &CloseMirror);

    /// Whether the backend reports MEV protection as active
    async fn mev_protection_active(&self) -> bool;
}

// Wire types for the HTTP backend

#[derive(Debug, Deserialize)]
struct WirePriceResponse {
    price: f64,
}

#[derive(Debug, Deserialize)]
struct WireMirrorResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireMevStatus {
    active: bool,
}

/// HTTP implementation of the execution backend
pub struct HttpBackend {
    client: Client,
    base_url: String,
    signing_key: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, signing_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            signing_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.signing_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResult> {
        info!(
            action = %request.action,
            token = %request.token_address,
            amount = request.amount,
            "Executing trade"
        );

        let response = self
            .authed(self.client.post(self.url("/api/trade")))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExecutionFailed {
                token: request.token_address.clone(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let result: TradeResult = response.json().await.map_err(|e| Error::ExecutionFailed {
            token: request.token_address.clone(),
            message: format!("response decode: {e}"),
        })?;

        if !result.success {
            return Err(Error::ExecutionFailed {
                token: request.token_address.clone(),
                message: result.error.unwrap_or_else(|| "unknown".into()),
            });
        }

        Ok(result)
    }

    async fn get_current_price(&self, token_address: &str) -> Result<f64> {
        let response = self
            .client
            .get(self.url(&format!("/api/price/{token_address}")))
            .send()
            .await
            .map_err(|_| Error::PriceFetch(token_address.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::PriceFetch(token_address.to_string()));
        }

        let wire: WirePriceResponse = response
            .json()
            .await
            .map_err(|_| Error::PriceFetch(token_address.to_string()))?;

        if wire.price <= 0.0 {
            return Err(Error::PriceFetch(token_address.to_string()));
        }

        Ok(wire.price)
    }

    async fn mirror_open(&self, position: &PositionMirror) -> Option<String> {
        let result = self
            .authed(self.client.post(self.url("/api/positions")))
            .json(position)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<WireMirrorResponse>().await {
                    Ok(wire) => Some(wire.id),
                    Err(e) => {
                        debug!(error = %e, "Position mirror response decode failed");
                        None
                    }
                }
            }
            Ok(response) => {
                debug!(status = %response.status(), "Position mirror rejected");
                None
            }
            Err(e) => {
                debug!(error = %e, "Backend unreachable, continuing standalone");
                None
            }
        }
    }

    async fn mirror_close(&self, close: &CloseMirror) {
        let result = self
            .authed(
                self.client
                    .post(self.url(&format!("/api/positions/{}/close", close.db_position_id))),
            )
            .json(close)
            .send()
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Close mirror failed");
        }
    }

    async fn mev_protection_active(&self) -> bool {
        let result = self
            .client
            .get(self.url("/api/mev/status"))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => response
                .json::<WireMevStatus>()
                .await
                .map(|s| s.active)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_request_serializes_lowercase_action() {
        let request = TradeRequest {
            action: TradeAction::Buy,
            token_address: "mint1".into(),
            amount: 0.1,
            use_mev_protection: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["action"], "buy");
        assert_eq!(json["use_mev_protection"], true);
    }

    #[test]
    fn test_trade_result_decode() {
        let json = r#"{"success": true, "signature": "sig1", "price": 0.001, "amount": 100000.0}"#;
        let result: TradeResult = serde_json::from_str(json).unwrap();
        assert!(result.success);
        assert_eq!(result.signature.as_deref(), Some("sig1"));
        assert!(result.proceeds.is_none());
    }

    #[test]
    fn test_url_join() {
        let backend = HttpBackend::new("http://localhost:3000/", None, Duration::from_secs(15));
        assert_eq!(backend.url("/api/trade"), "http://localhost:3000/api/trade");
    }
}
