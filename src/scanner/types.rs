//! Scanner types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token sighted on a launchpad.
/// The address is the uniqueness key; metadata fields stay `None` until
/// enrichment fills them, and missing fields are never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCandidate {
    pub address: String,
    pub platform: String,
    pub discovered_at: DateTime<Utc>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub liquidity_sol: Option<f64>,
    pub market_cap_sol: Option<f64>,
    pub holders: Option<u32>,
    pub volume_24h_sol: Option<f64>,
    /// Price in SOL per token
    pub price: Option<f64>,
    pub is_verified: Option<bool>,
}

impl TokenCandidate {
    pub fn new(address: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            platform: platform.into(),
            discovered_at: Utc::now(),
            name: None,
            symbol: None,
            liquidity_sol: None,
            market_cap_sol: None,
            holders: None,
            volume_24h_sol: None,
            price: None,
            is_verified: None,
        }
    }

    /// Age since first sighting, in seconds
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.discovered_at).num_seconds()
    }

    /// Symbol for display, falling back to a shortened address
    pub fn display_symbol(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| {
            let address = &self.address;
            if address.len() > 8 {
                format!("{}..", &address[..8])
            } else {
                address.clone()
            }
        })
    }

    /// Merge enrichment metadata into unset fields
    pub fn merge_metadata(&mut self, meta: TokenMetadata) {
        if self.name.is_none() {
            self.name = meta.name;
        }
        if self.symbol.is_none() {
            self.symbol = meta.symbol;
        }
        if self.liquidity_sol.is_none() {
            self.liquidity_sol = meta.liquidity_sol;
        }
        if self.market_cap_sol.is_none() {
            self.market_cap_sol = meta.market_cap_sol;
        }
        if self.holders.is_none() {
            self.holders = meta.holders;
        }
        if self.volume_24h_sol.is_none() {
            self.volume_24h_sol = meta.volume_24h_sol;
        }
        if self.price.is_none() {
            self.price = meta.price;
        }
        if self.is_verified.is_none() {
            self.is_verified = meta.is_verified;
        }
    }
}

/// Metadata fetched for a discovered token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub liquidity_sol: Option<f64>,
    pub market_cap_sol: Option<f64>,
    pub holders: Option<u32>,
    pub volume_24h_sol: Option<f64>,
    pub price: Option<f64>,
    pub is_verified: Option<bool>,
}
