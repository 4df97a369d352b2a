//! Anthropic Claude API Provider
//!
//! This module implements the LLMProvider trait for Anthropic's messages API.
//! System messages travel in the top-level `system` field, tool requests come
//! back as `tool_use` blocks and tool results go out as `tool_result` blocks
//! inside a user turn.

use crate::error::{DbdexError, Result};
use crate::llm::client::LLMHttpClient;
use crate::llm::provider::{
    GenerationParams, LLMProvider, LLMProviderBuilder, LLMResponse, Message, MessageRole,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Anthropic API base URL
const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1/messages";

/// Default Anthropic API version
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default model
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Anthropic Claude API provider
pub struct AnthropicProvider {
    /// API key for authentication
    api_key: String,
    /// Model to use
    model: String,
    /// Messages endpoint
    endpoint: String,
    /// HTTP client for making requests
    client: LLMHttpClient,
    /// API version
    version: String,
    /// Maximum tokens for generation
    max_tokens: u32,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `model` - Model identifier (defaults to the latest Sonnet)
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: ANTHROPIC_API_BASE.to_string(),
            client: LLMHttpClient::new()?,
            version: DEFAULT_API_VERSION.to_string(),
            max_tokens: 4096,
        })
    }

    /// Create a provider from builder settings
    pub fn from_builder(builder: &LLMProviderBuilder) -> Result<Self> {
        let mut provider = Self::new(
            builder.get_api_key().unwrap_or_default(),
            builder.get_model().map(str::to_string),
        )?;
        if let Some(base_url) = builder.get_base_url() {
            provider.endpoint = format!("{}/messages", base_url.trim_end_matches('/'));
        }
        provider.client = LLMHttpClient::with_timeout(builder.get_timeout())?;
        Ok(provider)
    }

    /// Set the maximum tokens for generation
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the API version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Build headers for Anthropic API
    fn build_headers(&self) -> Result<HeaderMap> {
        let headers = LLMHttpClient::build_headers("")?;
        let headers = LLMHttpClient::add_header(headers, "x-api-key", &self.api_key)?;
        LLMHttpClient::add_header(headers, "anthropic-version", &self.version)
    }
}

/// Split our messages into the `system` text and Anthropic turns
///
/// Consecutive tool results are grouped into a single user turn.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system = Vec::new();
    let mut converted: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system.push(msg.content.clone()),
            MessageRole::User => converted.push(AnthropicMessage {
                role: "user".to_string(),
                content: vec![ContentBlock::Text {
                    text: msg.content.clone(),
                }],
            }),
            MessageRole::Assistant => {
                let mut content = Vec::new();
                if !msg.content.is_empty() {
                    content.push(ContentBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                content.extend(msg.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                converted.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content,
                });
            }
            MessageRole::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                    is_error: msg.is_error,
                };
                match converted.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
                    {
                        last.content.push(block)
                    }
                    _ => converted.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, converted)
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    /// Generate a response from the messages API
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: Option<&GenerationParams>,
    ) -> Result<LLMResponse> {
        let (system, anthropic_messages) = convert_messages(messages);

        let request = AnthropicRequest {
            model: self.model.clone(),
            messages: anthropic_messages,
            max_tokens: params.and_then(|p| p.max_tokens).unwrap_or(self.max_tokens),
            temperature: params.and_then(|p| p.temperature),
            top_p: params.and_then(|p| p.top_p),
            stop_sequences: params
                .and_then(|p| p.stop_sequences.clone())
                .unwrap_or_default(),
            system,
            tools: tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect(),
        };

        let headers = self.build_headers()?;
        let response_text = self
            .client
            .post_json("Anthropic", &self.endpoint, headers, &request)
            .await?;

        let anthropic_response: AnthropicResponse =
            serde_json::from_str(&response_text).map_err(|e| DbdexError::LLMApiError {
                provider: "Anthropic".to_string(),
                message: format!("Failed to parse response: {}", e),
                status: 0,
            })?;

        Ok(anthropic_response.into_response())
    }

    /// Get provider name
    fn provider_name(&self) -> &str {
        "Anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    /// Check if API key is set
    fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

/// Anthropic API message format
#[derive(Debug, Serialize, Clone)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Clone)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

/// Content block in requests and responses
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Blocks we do not act on (e.g. thinking)
    #[serde(other)]
    Other,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

impl AnthropicResponse {
    fn into_response(self) -> LLMResponse {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text: t } => text.push(t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input))
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
            }
        }

        LLMResponse {
            content: text.join(""),
            tool_calls,
            model: Some(self.model),
            input_tokens: Some(self.usage.input_tokens),
            output_tokens: Some(self.usage.output_tokens),
            total_tokens: Some(self.usage.input_tokens + self.usage.output_tokens),
            finish_reason: self.stop_reason,
        }
    }
}

/// Token usage information
#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}
