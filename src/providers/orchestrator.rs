//! Fallback orchestrator
//!
//! Walks providers in declaration order and returns the first success,
//! annotated with which provider served it. Per-provider success and
//! failure counters live in a concurrent map keyed by provider name.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{ProviderConfig, ProviderKind, ProviderTier};
use crate::error::{Error, Result};
use crate::providers::adapter::{ChatProvider, CompletionOnlyProvider, OpenAiCompatibleProvider};
use crate::providers::types::{ChatMessage, ChatOptions, ChatResponse};

/// Success/failure counters for one provider
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderStats {
    pub successes: u64,
    pub failures: u64,
}

/// Snapshot of orchestrator health
#[derive(Debug, Clone)]
pub struct OrchestratorStats {
    pub per_provider: Vec<(String, ProviderStats)>,
    pub last_used: Option<String>,
}

/// Callback invoked before an optional-tier provider is attempted
pub type OnSwitch<'a> = &'a (dyn Fn(&str, ProviderTier, bool) + Send + Sync);

struct ProviderHandle {
    config: ProviderConfig,
    adapter: Arc<dyn ChatProvider>,
}

/// Orchestrator over a declaration-ordered provider list
pub struct FallbackOrchestrator {
    providers: Vec<ProviderHandle>,
    stats: DashMap<String, ProviderStats>,
    last_used: RwLock<Option<String>>,
}

impl FallbackOrchestrator {
    /// Build from configuration, resolving API keys from the environment.
    /// Providers keep their declaration order: primaries first is the
    /// caller's responsibility (the config file is the ranking).
    pub fn from_config(configs: &[ProviderConfig], chat_timeout: Duration) -> Self {
        let providers = configs
            .iter()
            .map(|cfg| {
                let api_key = if cfg.api_key_env.is_empty() {
                    None
                } else {
                    std::env::var(&cfg.api_key_env).ok()
                };
                let model = cfg.model.clone().unwrap_or_else(|| "default".to_string());
                let adapter: Arc<dyn ChatProvider> = match cfg.kind {
                    ProviderKind::OpenAiCompatible => Arc::new(OpenAiCompatibleProvider::new(
                        cfg.name.clone(),
                        cfg.base_url.clone(),
                        api_key,
                        model,
                        chat_timeout,
                    )),
                    ProviderKind::CompletionOnly => Arc::new(CompletionOnlyProvider::new(
                        cfg.name.clone(),
                        cfg.base_url.clone(),
                        api_key,
                        model,
                        chat_timeout,
                    )),
                };
                ProviderHandle {
                    config: cfg.clone(),
                    adapter,
                }
            })
            .collect();

        Self {
            providers,
            stats: DashMap::new(),
            last_used: RwLock::new(None),
        }
    }

    /// Build from pre-constructed adapters (used by tests and embedders)
    pub fn from_adapters(handles: Vec<(ProviderConfig, Arc<dyn ChatProvider>)>) -> Self {
        Self {
            providers: handles
                .into_iter()
                .map(|(config, adapter)| ProviderHandle { config, adapter })
                .collect(),
            stats: DashMap::new(),
            last_used: RwLock::new(None),
        }
    }

    /// Attempt the request against each provider in order; first success wins
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        on_switch: Option<OnSwitch<'_>>,
    ) -> Result<ChatResponse> {
        if self.providers.is_empty() {
            return Err(Error::NoProvidersConfigured);
        }

        let mut attempted = Vec::with_capacity(self.providers.len());
        let mut last_error: Option<Error> = None;

        for handle in &self.providers {
            let name = handle.config.name.as_str();
            attempted.push(name.to_string());

            if handle.config.tier == ProviderTier::Optional {
                if let Some(notify) = on_switch {
                    notify(name, handle.config.tier, handle.config.is_free);
                }
            }

            match handle.adapter.chat(messages, options).await {
                Ok(mut response) => {
                    self.stats.entry(name.to_string()).or_default().successes += 1;
                    *self.last_used.write().await = Some(name.to_string());

                    response.provider = name.to_string();
                    response.tier = handle.config.tier;
                    response.is_free = handle.config.is_free;

                    info!(provider = name, tier = %handle.config.tier, "Chat served");
                    return Ok(response);
                }
                Err(e) => {
                    self.stats.entry(name.to_string()).or_default().failures += 1;
                    debug!(provider = name, error = %e, "Provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::AllProvidersFailed {
            attempted,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into()),
        })
    }

    /// Per-provider counters plus the last provider that served a request
    pub async fn stats(&self) -> OrchestratorStats {
        let per_provider = self
            .providers
            .iter()
            .map(|h| {
                let stats = self
                    .stats
                    .get(&h.config.name)
                    .map(|s| *s)
                    .unwrap_or_default();
                (h.config.name.clone(), stats)
            })
            .collect();

        OrchestratorStats {
            per_provider,
            last_used: self.last_used.read().await.clone(),
        }
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.iter().any(|h| h.config.name == name)
    }

    pub fn available_count(&self) -> usize {
        self.providers.len()
    }
}
