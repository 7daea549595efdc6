//! Provider adapters
//!
//! Each adapter translates the provider-agnostic chat contract to one
//! upstream API idiom. Adapters raise only for unrecoverable errors;
//! missing optional fields are not errors.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::providers::types::{ChatMessage, ChatOptions, ChatResponse, ChatRole, ToolCall, Usage};

/// Uniform chat capability over one upstream provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name as declared in configuration
    fn name(&self) -> &str;

    /// Whether this adapter can translate tool-calling options
    fn supports_tools(&self) -> bool;

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse>;
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn status_to_error(provider: &str, status: StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::ProviderAuth {
            provider: provider.to_string(),
            message: body.chars().take(200).collect(),
        },
        429 => Error::ProviderQuota {
            provider: provider.to_string(),
        },
        _ => Error::Http(format!("{}: HTTP {} - {}", provider, status, body)),
    }
}

// Wire types for OpenAI-compatible /chat/completions

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Adapter for OpenAI-compatible chat endpoints
/// (OpenRouter, Groq, DeepSeek and similar gateways)
pub struct OpenAiCompatibleProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    fn build_body(&self, messages: &[ChatMessage], options: &ChatOptions) -> serde_json::Value {
        let wire_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let mut obj = json!({
                    "role": role_str(m.role),
                    "content": m.content,
                });
                if let Some(id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(id);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
        });

        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = options.max_tokens {
            body["max_tokens"] = json!(m);
        }
        // Tool schemas pass through verbatim
        if let Some(tools) = &options.tools {
            let wire_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(wire_tools);
        }
        if let Some(choice) = &options.tool_choice {
            body["tool_choice"] = json!(choice);
        }
        if options.include_reasoning {
            body["include_reasoning"] = json!(true);
        }

        body
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_body(messages, options);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(provider = %self.name, model = %self.model, "Sending chat request");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_to_error(&self.name, status, &text));
        }

        let wire: WireResponse = response.json().await.map_err(|e| Error::ProviderData {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;

        let choice = wire.choices.into_iter().next().ok_or_else(|| Error::ProviderData {
            provider: self.name.clone(),
            message: "empty choices".into(),
        })?;

        let tool_calls = choice.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect::<Vec<_>>()
        });

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: wire.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            reasoning: choice.message.reasoning,
            provider: String::new(),
            tier: crate::config::ProviderTier::Primary,
            is_free: false,
        })
    }
}

/// Adapter for plain completion endpoints without tool calling.
/// Tool-enabled requests get `tool_calls: None` plus one warning per call.
pub struct CompletionOnlyProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionOnlyProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    /// Flatten a conversation into a single prompt
    fn flatten(messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();
        for msg in messages {
            prompt.push_str(role_str(msg.role));
            prompt.push_str(": ");
            prompt.push_str(&msg.content);
            prompt.push('\n');
        }
        prompt.push_str("assistant: ");
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct CompletionWire {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[async_trait]
impl ChatProvider for CompletionOnlyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_tools(&self) -> bool {
        false
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        if options.tools.is_some() {
            warn!(
                provider = %self.name,
                "Provider cannot emit tool calls; returning plain completion"
            );
        }

        let url = format!("{}/completions", self.base_url.trim_end_matches('/'));
        let mut body = json!({
            "model": self.model,
            "prompt": Self::flatten(messages),
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = options.max_tokens {
            body["max_tokens"] = json!(m);
        }

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_to_error(&self.name, status, &text));
        }

        let wire: CompletionWire = response.json().await.map_err(|e| Error::ProviderData {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default();

        Ok(ChatResponse::bare(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_conversation() {
        let messages = vec![
            ChatMessage::system("You are a trader."),
            ChatMessage::user("Buy?"),
        ];
        let prompt = CompletionOnlyProvider::flatten(&messages);
        assert!(prompt.starts_with("system: You are a trader.\n"));
        assert!(prompt.ends_with("assistant: "));
    }

    #[test]
    fn test_status_mapping() {
        let err = status_to_error("groq", StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, Error::ProviderAuth { .. }));

        let err = status_to_error("groq", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, Error::ProviderQuota { .. }));

        let err = status_to_error("groq", StatusCode::BAD_GATEWAY, "oops");
        assert!(matches!(err, Error::Http(_)));
    }

    #[test]
    fn test_body_passes_tools_verbatim() {
        let provider = OpenAiCompatibleProvider::new(
            "test",
            "https://example.com/v1",
            None,
            "model-x",
            Duration::from_secs(30),
        );
        let schema = crate::providers::types::ToolSchema {
            name: "get_quote".into(),
            description: "Fetch a quote".into(),
            parameters: json!({"type": "object", "properties": {"symbol": {"type": "string"}}}),
        };
        let options = ChatOptions {
            tools: Some(vec![schema]),
            tool_choice: Some("auto".into()),
            ..Default::default()
        };
        let body = provider.build_body(&[ChatMessage::user("hi")], &options);
        assert_eq!(body["tools"][0]["function"]["name"], "get_quote");
        assert_eq!(body["tool_choice"], "auto");
    }
}
