//! Launchpad scanner
//!
//! Each scan unions two sources per platform: the launchpad's public
//! listing endpoint and an on-chain program indexer. Either source may
//! fail independently; the scan only errors when both do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::scanner::types::{TokenCandidate, TokenMetadata};

const PUMP_FUN_API: &str = "https://frontend-api.pump.fun";
const BONK_FUN_API: &str = "https://api.bonk.fun";

/// Discovery and enrichment contract for one or more launchpads
#[async_trait]
pub trait LaunchpadScanner: Send + Sync {
    /// Scan a platform for recently launched tokens
    async fn scan(&self, platform: &str) -> Result<Vec<TokenCandidate>>;

    /// Fetch metadata for one token address
    async fn fetch_metadata(&self, platform: &str, address: &str) -> Result<TokenMetadata>;
}

// Listing endpoint wire format

#[derive(Debug, Deserialize)]
struct WireListing {
    #[serde(alias = "mint")]
    address: String,
    name: Option<String>,
    symbol: Option<String>,
    #[serde(alias = "virtual_sol_reserves")]
    liquidity_sol: Option<f64>,
    #[serde(alias = "market_cap")]
    market_cap_sol: Option<f64>,
    #[serde(alias = "holder_count")]
    holders: Option<u32>,
    volume_24h_sol: Option<f64>,
    #[serde(alias = "price_sol")]
    price: Option<f64>,
    is_verified: Option<bool>,
    created_timestamp: Option<i64>,
}

// Indexer endpoint wire format (program log scans only surface addresses)

#[derive(Debug, Deserialize)]
struct WireIndexed {
    address: String,
    #[serde(alias = "block_time")]
    first_seen: Option<i64>,
}

/// HTTP scanner over the public launchpad APIs plus a program indexer
pub struct HttpLaunchpadScanner {
    client: Client,
    /// Optional indexer endpoint; when unset only the listing source runs
    indexer_url: Option<String>,
}

impl HttpLaunchpadScanner {
    pub fn new(indexer_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            indexer_url,
        }
    }

    fn platform_base(platform: &str) -> &'static str {
        if platform.contains("bonk") {
            BONK_FUN_API
        } else {
            PUMP_FUN_API
        }
    }

    fn listing_to_candidate(platform: &str, listing: WireListing) -> TokenCandidate {
        let discovered_at = listing
            .created_timestamp
            .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
            .unwrap_or_else(Utc::now);

        TokenCandidate {
            address: listing.address,
            platform: platform.to_string(),
            discovered_at,
            name: listing.name,
            symbol: listing.symbol,
            liquidity_sol: listing.liquidity_sol,
            market_cap_sol: listing.market_cap_sol,
            holders: listing.holders,
            volume_24h_sol: listing.volume_24h_sol,
            price: listing.price,
            is_verified: listing.is_verified,
        }
    }

    async fn fetch_listings(&self, platform: &str) -> Result<Vec<TokenCandidate>> {
        let url = format!(
            "{}/coins/latest?limit=50&sort=created_timestamp",
            Self::platform_base(platform)
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Scanner {
                platform: platform.to_string(),
                message: format!("listing endpoint HTTP {}", status),
            });
        }

        let listings: Vec<WireListing> = response.json().await.map_err(|e| Error::Scanner {
            platform: platform.to_string(),
            message: format!("listing decode: {e}"),
        })?;

        Ok(listings
            .into_iter()
            .map(|l| Self::listing_to_candidate(platform, l))
            .collect())
    }

    async fn fetch_indexed(&self, platform: &str) -> Result<Vec<TokenCandidate>> {
        let Some(base) = &self.indexer_url else {
            return Ok(Vec::new());
        };

        let url = format!("{}/tokens/recent?platform={}", base.trim_end_matches('/'), platform);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Scanner {
                platform: platform.to_string(),
                message: format!("indexer HTTP {}", status),
            });
        }

        let indexed: Vec<WireIndexed> = response.json().await.map_err(|e| Error::Scanner {
            platform: platform.to_string(),
            message: format!("indexer decode: {e}"),
        })?;

        Ok(indexed
            .into_iter()
            .map(|entry| {
                let mut candidate = TokenCandidate::new(entry.address, platform);
                if let Some(ts) = entry.first_seen {
                    if let Some(at) = DateTime::<Utc>::from_timestamp(ts, 0) {
                        candidate.discovered_at = at;
                    }
                }
                candidate
            })
            .collect())
    }
}

/// Union the per-source scan results, deduplicating by address with
/// first-source-wins. A single source failing is tolerated; the scan
/// only errors when every configured source failed.
fn union_sources(
    platform: &str,
    source_count: usize,
    listings: Result<Vec<TokenCandidate>>,
    indexed: Result<Vec<TokenCandidate>>,
) -> Result<Vec<TokenCandidate>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut found = Vec::new();
    let mut failures = 0;

    match listings {
        Ok(tokens) => {
            for token in tokens {
                if seen.insert(token.address.clone()) {
                    found.push(token);
                }
            }
        }
        Err(e) => {
            warn!(platform, error = %e, "Listing source failed");
            failures += 1;
        }
    }

    match indexed {
        Ok(tokens) => {
            for token in tokens {
                if seen.insert(token.address.clone()) {
                    found.push(token);
                }
            }
        }
        Err(e) => {
            warn!(platform, error = %e, "Indexer source failed");
            failures += 1;
        }
    }

    if failures >= source_count {
        return Err(Error::Scanner {
            platform: platform.to_string(),
            message: "all scan sources failed".into(),
        });
    }

    debug!(platform, count = found.len(), "Scan complete");
    Ok(found)
}

#[async_trait]
impl LaunchpadScanner for HttpLaunchpadScanner {
    async fn scan(&self, platform: &str) -> Result<Vec<TokenCandidate>> {
        let (listings, indexed) = futures::join!(
            self.fetch_listings(platform),
            self.fetch_indexed(platform)
        );

        // Indexer-less setups have a single source
        let source_count = if self.indexer_url.is_some() { 2 } else { 1 };
        union_sources(platform, source_count, listings, indexed)
    }

    async fn fetch_metadata(&self, platform: &str, address: &str) -> Result<TokenMetadata> {
        let url = format!("{}/coins/{}", Self::platform_base(platform), address);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Scanner {
                platform: platform.to_string(),
                message: format!("metadata endpoint HTTP {}", status),
            });
        }

        let listing: WireListing = response.json().await.map_err(|e| Error::Scanner {
            platform: platform.to_string(),
            message: format!("metadata decode: {e}"),
        })?;

        Ok(TokenMetadata {
            name: listing.name,
            symbol: listing.symbol,
            liquidity_sol: listing.liquidity_sol,
            market_cap_sol: listing.market_cap_sol,
            holders: listing.holders,
            volume_24h_sol: listing.volume_24h_sol,
            price: listing.price,
            is_verified: listing.is_verified,
        })
    }
}
