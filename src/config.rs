//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub market: MarketDataConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub alerts: AlertEngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Trading mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    Simulation,
    Live,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Simulation
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Simulation => write!(f, "simulation"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

/// Scanner/trading engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: TradingMode,
    /// Launchpad platforms to scan (e.g. "pump.fun", "bonk.fun")
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_buy_amount_sol")]
    pub buy_amount_sol: f64,
    /// Stop loss as a fraction of entry price (0.25 = exit at -25%)
    #[serde(default = "default_stop_loss_frac")]
    pub stop_loss_frac: f64,
    /// Take profit as a fraction of entry price (1.0 = exit at +100%)
    #[serde(default = "default_take_profit_frac")]
    pub take_profit_frac: f64,
    /// Trailing stop distance from the highest seen price
    #[serde(default = "default_trailing_stop_frac")]
    pub trailing_stop_frac: f64,
    /// Force-exit positions held longer than this
    #[serde(default = "default_max_hold_minutes")]
    pub max_hold_minutes: i64,
    #[serde(default)]
    pub use_database: bool,
    #[serde(default)]
    pub use_ai_analysis: bool,
    /// Request MEV-protected submission from the execution backend
    #[serde(default)]
    pub use_jito: bool,
    #[serde(default)]
    pub filters: TokenFilterConfig,
}

/// Admission filters for scanned tokens
#[derive(Debug, Clone, Deserialize)]
pub struct TokenFilterConfig {
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity_sol: f64,
    #[serde(default = "default_max_market_cap")]
    pub max_market_cap_sol: f64,
    #[serde(default = "default_min_volume_24h")]
    pub min_volume_24h_sol: f64,
    #[serde(default = "default_max_token_age_secs")]
    pub max_token_age_secs: i64,
    #[serde(default = "default_min_holders")]
    pub min_holders: u32,
    #[serde(default)]
    pub require_verified: bool,
}

/// Q-learning agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    #[serde(default = "default_exploration_rate")]
    pub exploration_rate: f64,
    #[serde(default = "default_min_exploration_rate")]
    pub min_exploration_rate: f64,
    #[serde(default = "default_exploration_decay")]
    pub exploration_decay: f64,
    #[serde(default = "default_decision_interval_ms")]
    pub decision_interval_ms: u64,
    /// Persist the Q-table snapshot every N iterations
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

/// Provider tier in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Primary,
    Optional,
}

impl std::fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderTier::Primary => write!(f, "primary"),
            ProviderTier::Optional => write!(f, "optional"),
        }
    }
}

/// Adapter protocol a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible /chat/completions endpoint (tool calling supported)
    OpenAiCompatible,
    /// Plain completion endpoint, no tool calling
    CompletionOnly,
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::OpenAiCompatible
    }
}

/// One AI provider in declaration order
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_tier")]
    pub tier: ProviderTier,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: String,
    /// Environment variable holding the API key (never the key itself)
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_tier() -> ProviderTier {
    ProviderTier::Primary
}

/// Market data provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: String,
}

/// Launchpad scanner configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScannerConfig {
    /// Chain-program indexer endpoint, unioned with the public listing
    /// endpoints when set
    #[serde(default)]
    pub indexer_url: Option<String>,
}

/// Trade execution backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,
    /// Environment variable holding the signing key (required for live mode)
    #[serde(default = "default_signing_key_env")]
    pub signing_key_env: String,
    /// Mirror positions/trades to the backend database when reachable
    #[serde(default = "default_true")]
    pub mirror_enabled: bool,
}

/// Alert engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertEngineConfig {
    #[serde(default = "default_alert_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_snapshot_file")]
    pub agent_snapshot_file: String,
    #[serde(default = "default_alerts_file")]
    pub alerts_file: String,
}

/// External call deadlines
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_chat_ms: u64,
    #[serde(default = "default_data_timeout_ms")]
    pub market_data_ms: u64,
    #[serde(default = "default_data_timeout_ms")]
    pub execution_ms: u64,
    /// Grace period waited per loop on shutdown
    #[serde(default = "default_drain_grace_ms")]
    pub shutdown_grace_ms: u64,
}

// Default value functions
fn default_platforms() -> Vec<String> {
    vec!["pump.fun".into(), "bonk.fun".into()]
}

fn default_scan_interval_ms() -> u64 {
    5000
}

fn default_monitor_interval_ms() -> u64 {
    2000
}

fn default_max_positions() -> usize {
    5
}

fn default_buy_amount_sol() -> f64 {
    0.1
}

fn default_stop_loss_frac() -> f64 {
    0.25
}

fn default_take_profit_frac() -> f64 {
    1.0
}

fn default_trailing_stop_frac() -> f64 {
    0.15
}

fn default_max_hold_minutes() -> i64 {
    60
}

fn default_min_liquidity() -> f64 {
    5.0
}

fn default_max_market_cap() -> f64 {
    100.0
}

fn default_min_volume_24h() -> f64 {
    1.0
}

fn default_max_token_age_secs() -> i64 {
    3600
}

fn default_min_holders() -> u32 {
    10
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_discount_factor() -> f64 {
    0.95
}

fn default_exploration_rate() -> f64 {
    0.3
}

fn default_min_exploration_rate() -> f64 {
    0.05
}

fn default_exploration_decay() -> f64 {
    0.995
}

fn default_decision_interval_ms() -> u64 {
    10_000
}

fn default_snapshot_every() -> u64 {
    50
}

fn default_market_base_url() -> String {
    std::env::var("MARKET_DATA_URL")
        .unwrap_or_else(|_| "https://pro-api.coinmarketcap.com".into())
}

fn default_backend_base_url() -> String {
    std::env::var("EXECUTION_BACKEND_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".into())
}

fn default_signing_key_env() -> String {
    "SOLPILOT_SIGNING_KEY".into()
}

fn default_alert_check_interval_secs() -> u64 {
    60
}

fn default_data_dir() -> String {
    "data".into()
}

fn default_snapshot_file() -> String {
    "agent_snapshot.json".into()
}

fn default_alerts_file() -> String {
    "alerts.json".into()
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

fn default_data_timeout_ms() -> u64 {
    15_000
}

fn default_drain_grace_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Simulation,
            platforms: default_platforms(),
            scan_interval_ms: default_scan_interval_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            max_positions: default_max_positions(),
            buy_amount_sol: default_buy_amount_sol(),
            stop_loss_frac: default_stop_loss_frac(),
            take_profit_frac: default_take_profit_frac(),
            trailing_stop_frac: default_trailing_stop_frac(),
            max_hold_minutes: default_max_hold_minutes(),
            use_database: false,
            use_ai_analysis: false,
            use_jito: false,
            filters: TokenFilterConfig::default(),
        }
    }
}

impl Default for TokenFilterConfig {
    fn default() -> Self {
        Self {
            min_liquidity_sol: default_min_liquidity(),
            max_market_cap_sol: default_max_market_cap(),
            min_volume_24h_sol: default_min_volume_24h(),
            max_token_age_secs: default_max_token_age_secs(),
            min_holders: default_min_holders(),
            require_verified: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            exploration_rate: default_exploration_rate(),
            min_exploration_rate: default_min_exploration_rate(),
            exploration_decay: default_exploration_decay(),
            decision_interval_ms: default_decision_interval_ms(),
            snapshot_every: default_snapshot_every(),
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_base_url(),
            api_key_env: String::new(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_base_url(),
            signing_key_env: default_signing_key_env(),
            mirror_enabled: true,
        }
    }
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_alert_check_interval_secs(),
            notifications_enabled: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            agent_snapshot_file: default_snapshot_file(),
            alerts_file: default_alerts_file(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            provider_chat_ms: default_provider_timeout_ms(),
            market_data_ms: default_data_timeout_ms(),
            execution_ms: default_data_timeout_ms(),
            shutdown_grace_ms: default_drain_grace_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            agent: AgentConfig::default(),
            providers: vec![],
            market: MarketDataConfig::default(),
            scanner: ScannerConfig::default(),
            backend: BackendConfig::default(),
            alerts: AlertEngineConfig::default(),
            store: StoreConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SOLPILOT_)
            .add_source(
                config::Environment::with_prefix("SOLPILOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.buy_amount_sol <= 0.0 {
            anyhow::bail!("buy_amount_sol must be positive");
        }

        if self.engine.max_positions == 0 {
            anyhow::bail!("max_positions must be at least 1");
        }

        if self.engine.stop_loss_frac <= 0.0 || self.engine.stop_loss_frac >= 1.0 {
            anyhow::bail!("stop_loss_frac must be in (0, 1)");
        }

        if self.engine.take_profit_frac <= 0.0 {
            anyhow::bail!("take_profit_frac must be positive");
        }

        if self.engine.trailing_stop_frac <= 0.0 || self.engine.trailing_stop_frac >= 1.0 {
            anyhow::bail!("trailing_stop_frac must be in (0, 1)");
        }

        if self.engine.platforms.is_empty() {
            anyhow::bail!("at least one launchpad platform must be configured");
        }

        if !(0.0..=1.0).contains(&self.agent.learning_rate) {
            anyhow::bail!("learning_rate must be in [0, 1]");
        }

        if !(0.0..=1.0).contains(&self.agent.discount_factor) {
            anyhow::bail!("discount_factor must be in [0, 1]");
        }

        if self.agent.min_exploration_rate > self.agent.exploration_rate {
            anyhow::bail!("min_exploration_rate cannot exceed exploration_rate");
        }

        for provider in &self.providers {
            if provider.name.is_empty() {
                anyhow::bail!("provider name cannot be empty");
            }
            if provider.base_url.is_empty() {
                anyhow::bail!("provider {} is missing base_url", provider.name);
            }
        }

        Ok(())
    }

    /// Resolve the signing key from the environment (live mode only)
    pub fn signing_key(&self) -> Option<String> {
        std::env::var(&self.backend.signing_key_env).ok()
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let provider_lines: Vec<String> = self
            .providers
            .iter()
            .map(|p| {
                format!(
                    "    {} ({}{})",
                    p.name,
                    p.tier,
                    if p.is_free { ", free" } else { "" }
                )
            })
            .collect();

        format!(
            r#"Configuration:
  Engine:
    mode: {}
    platforms: {:?}
    scan_interval: {}ms
    monitor_interval: {}ms
    max_positions: {}
    buy_amount: {} SOL
    stop_loss: {:.0}%
    take_profit: {:.0}%
    trailing_stop: {:.0}%
    ai_analysis: {}
    mev_protection: {}
  Filters:
    min_liquidity: {} SOL
    max_market_cap: {} SOL
    min_volume_24h: {} SOL
    max_age: {}s
    min_holders: {}
    require_verified: {}
  Scanner:
    indexer: {}
  Agent:
    alpha: {}  gamma: {}  epsilon: {} -> {} (decay {})
  Providers:
{}
  Backend:
    base_url: {}
    signing_key: {}
  Alerts:
    check_interval: {}s
"#,
            self.engine.mode,
            self.engine.platforms,
            self.engine.scan_interval_ms,
            self.engine.monitor_interval_ms,
            self.engine.max_positions,
            self.engine.buy_amount_sol,
            self.engine.stop_loss_frac * 100.0,
            self.engine.take_profit_frac * 100.0,
            self.engine.trailing_stop_frac * 100.0,
            self.engine.use_ai_analysis,
            self.engine.use_jito,
            self.engine.filters.min_liquidity_sol,
            self.engine.filters.max_market_cap_sol,
            self.engine.filters.min_volume_24h_sol,
            self.engine.filters.max_token_age_secs,
            self.engine.filters.min_holders,
            self.engine.filters.require_verified,
            self.scanner.indexer_url.as_deref().unwrap_or("(none)"),
            self.agent.learning_rate,
            self.agent.discount_factor,
            self.agent.exploration_rate,
            self.agent.min_exploration_rate,
            self.agent.exploration_decay,
            if provider_lines.is_empty() {
                "    (none)".to_string()
            } else {
                provider_lines.join("\n")
            },
            self.backend.base_url,
            if self.signing_key().is_some() {
                "***"
            } else {
                "(not set)"
            },
            self.alerts.check_interval_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.mode, TradingMode::Simulation);
        assert_eq!(config.engine.max_positions, 5);
        assert_eq!(config.engine.scan_interval_ms, 5000);
        assert_eq!(config.engine.monitor_interval_ms, 2000);
        assert!(config.scanner.indexer_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fractions() {
        let mut config = Config::default();
        config.engine.stop_loss_frac = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.buy_amount_sol = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.platforms.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tier_deserialize() {
        let tier: ProviderTier = serde_json::from_str(r#""optional""#).unwrap();
        assert_eq!(tier, ProviderTier::Optional);
    }

    #[test]
    fn test_masked_display_hides_key() {
        let config = Config::default();
        let display = config.masked_display();
        assert!(display.contains("(not set)") || display.contains("***"));
    }
}
