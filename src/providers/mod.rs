//! AI provider fallback orchestration
//!
//! Routes chat requests across a ranked list of external providers,
//! tracking per-provider health and failing over transparently.

pub mod adapter;
pub mod orchestrator;
pub mod types;

pub use adapter::{ChatProvider, CompletionOnlyProvider, OpenAiCompatibleProvider};
pub use orchestrator::{FallbackOrchestrator, OrchestratorStats, ProviderStats};
pub use types::{ChatMessage, ChatOptions, ChatResponse, ChatRole, ToolCall, ToolSchema, Usage};
