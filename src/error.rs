//! Error types for the trading core

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading core
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing credential for {0}")]
    MissingCredential(String),

    // Provider orchestration errors
    #[error("No AI providers configured")]
    NoProvidersConfigured,

    #[error("All providers failed (attempted: {attempted:?}): {last_error}")]
    AllProvidersFailed {
        attempted: Vec<String>,
        last_error: String,
    },

    #[error("Provider auth rejected by {provider}: {message}")]
    ProviderAuth { provider: String, message: String },

    #[error("Provider quota exhausted for {provider}")]
    ProviderQuota { provider: String },

    #[error("Provider {provider} returned malformed data: {message}")]
    ProviderData { provider: String, message: String },

    #[error("Tool call arguments unparseable: {0}")]
    ToolArgsUnparseable(String),

    // Network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    // Market data errors
    #[error("Quote unavailable for {0}")]
    QuoteUnavailable(String),

    #[error("Historical data unavailable for {symbol}: {message}")]
    HistoryUnavailable { symbol: String, message: String },

    // Scanner errors
    #[error("Scanner error on {platform}: {message}")]
    Scanner { platform: String, message: String },

    // Trade execution errors
    #[error("Trade execution failed for {token}: {message}")]
    ExecutionFailed { token: String, message: String },

    #[error("Price fetch failed for {0}")]
    PriceFetch(String),

    #[error("Engine already running")]
    AlreadyRunning,

    #[error("Engine not running")]
    NotRunning,

    #[error("Live mode requires a signing key")]
    MissingSigningKey,

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    // Agent errors
    #[error("Agent already running")]
    AgentAlreadyRunning,

    #[error("Q-table persistence failed: {0}")]
    SnapshotPersistence(String),

    // Alert errors
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    #[error("Invalid alert condition: {0}")]
    InvalidAlertCondition(String),

    // Invariant violations (fatal for the affected component)
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    // Shutdown
    #[error("Cancellation requested")]
    Cancelled,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout(_)
                | Error::QuoteUnavailable(_)
                | Error::PriceFetch(_)
                | Error::Scanner { .. }
                | Error::ProviderQuota { .. }
        )
    }

    /// Check if this error must shut down the component that raised it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingEnvVar(_)
                | Error::MissingSigningKey
                | Error::InvariantViolation(_)
        )
    }

    /// Check if this error ends the current iteration without logging noise
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured deadline here
            Error::Timeout(0)
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
