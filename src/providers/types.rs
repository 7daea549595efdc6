//! Provider-agnostic chat types

use serde::{Deserialize, Serialize};

use crate::config::ProviderTier;

/// Role tag for a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in an ordered conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool call id this message responds to (role = tool only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// JSON-schema description of a callable tool, passed verbatim to adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool parameters
    pub parameters: serde_json::Value,
}

/// Provider-agnostic request options
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<ToolSchema>>,
    pub tool_choice: Option<String>,
    pub include_reasoning: bool,
}

/// A tool call emitted by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string; parse failures are ToolArgsUnparseable
    pub arguments: String,
}

impl ToolCall {
    /// Parse the argument string into JSON
    pub fn parse_arguments(&self) -> crate::error::Result<serde_json::Value> {
        serde_json::from_str(&self.arguments)
            .map_err(|e| crate::error::Error::ToolArgsUnparseable(e.to_string()))
    }
}

/// Token usage reported by the upstream, when available
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Normalized chat response, decorated with which provider served it
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage: Option<Usage>,
    pub reasoning: Option<String>,
    /// Provider that served this response (set by the orchestrator)
    pub provider: String,
    pub tier: ProviderTier,
    pub is_free: bool,
}

impl ChatResponse {
    /// A bare response before orchestrator decoration
    pub fn bare(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: None,
            usage: None,
            reasoning: None,
            provider: String::new(),
            tier: ProviderTier::Primary,
            is_free: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::tool("call_1", "result");
        assert_eq!(msg.role, ChatRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));

        let msg = ChatMessage::user("hi");
        assert!(msg.tool_call_id.is_none());
    }

    #[test]
    fn test_tool_call_argument_parsing() {
        let call = ToolCall {
            id: "1".into(),
            name: "get_quote".into(),
            arguments: r#"{"symbol": "SOL"}"#.into(),
        };
        let parsed = call.parse_arguments().unwrap();
        assert_eq!(parsed["symbol"], "SOL");

        let bad = ToolCall {
            id: "2".into(),
            name: "get_quote".into(),
            arguments: "not json".into(),
        };
        assert!(matches!(
            bad.parse_arguments(),
            Err(crate::error::Error::ToolArgsUnparseable(_))
        ));
    }
}
