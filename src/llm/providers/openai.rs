//! OpenAI API Provider
//!
//! This module implements the LLMProvider trait for OpenAI's chat completions
//! API. The same wire format is spoken by Gemini, Groq, Mistral, xAI and Ollama,
//! so those are built with [`OpenAIProvider::compatible`].

use crate::error::{DbdexError, Result};
use crate::llm::client::LLMHttpClient;
use crate::llm::provider::{
    GenerationParams, LLMProvider, LLMProviderBuilder, LLMResponse, Message, MessageRole,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// OpenAI API base URL
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI chat completions provider
pub struct OpenAIProvider {
    /// Display name used in errors and logs
    name: String,
    /// Full chat completions endpoint
    endpoint: String,
    /// API key for authentication (may be empty for local servers)
    api_key: String,
    /// Whether requests are accepted without a key
    key_optional: bool,
    /// Model to use (e.g., "gpt-4o", "llama3.2")
    model: String,
    /// HTTP client for making requests
    client: LLMHttpClient,
    /// Maximum tokens for generation
    max_tokens: u32,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model identifier (defaults to gpt-4o-mini)
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Result<Self> {
        let model = model.unwrap_or_else(|| "gpt-4o-mini".to_string());
        Self::compatible("OpenAI", OPENAI_API_BASE, api_key, model)
    }

    /// Create a provider for any OpenAI-compatible endpoint
    ///
    /// `base_url` is the API root (e.g. `http://localhost:11434/v1`);
    /// `/chat/completions` is appended.
    pub fn compatible(
        name: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            key_optional: false,
            model: model.into(),
            client: LLMHttpClient::new()?,
            max_tokens: 4096,
        })
    }

    /// Create a provider from builder settings, falling back to `default_base`
    pub fn from_builder(
        name: impl Into<String>,
        default_base: &str,
        builder: &LLMProviderBuilder,
    ) -> Result<Self> {
        let mut provider = Self::compatible(
            name,
            builder.get_base_url().unwrap_or(default_base),
            builder.get_api_key().unwrap_or_default(),
            builder.get_model().unwrap_or("gpt-4o-mini"),
        )?;
        provider.client = LLMHttpClient::with_timeout(builder.get_timeout())?;
        Ok(provider)
    }

    /// Accept requests without an API key (local servers)
    pub fn without_required_key(mut self) -> Self {
        self.key_optional = true;
        self
    }

    /// Set the maximum tokens for generation
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Chat completions endpoint in use
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: Option<&GenerationParams>,
        stream: bool,
    ) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            tools: (!tools.is_empty()).then(|| convert_tools(tools)),
            max_tokens: Some(params.and_then(|p| p.max_tokens).unwrap_or(self.max_tokens)),
            temperature: params.and_then(|p| p.temperature),
            top_p: params.and_then(|p| p.top_p),
            stop: params.and_then(|p| p.stop_sequences.clone()),
            stream: stream.then_some(true),
        }
    }

    fn parse_error(&self, err: impl std::fmt::Display) -> DbdexError {
        DbdexError::LLMApiError {
            provider: self.name.clone(),
            message: format!("Failed to parse response: {}", err),
            status: 0,
        }
    }
}

/// Convert our Message format to OpenAI format
fn convert_messages(messages: &[Message]) -> Vec<OpenAIMessage> {
    messages
        .iter()
        .map(|msg| {
            let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
                msg.tool_calls
                    .iter()
                    .map(|call| OpenAIToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: call.name.clone(),
                            arguments: raw_arguments(&call.arguments),
                        },
                    })
                    .collect()
            });

            // assistant turns that only call tools carry a null content
            let content = if msg.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(msg.content.clone())
            };

            OpenAIMessage {
                role: match msg.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                    MessageRole::System => "system",
                    MessageRole::Tool => "tool",
                }
                .to_string(),
                content,
                tool_calls,
                tool_call_id: msg.tool_call_id.clone(),
            }
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAITool> {
    tools
        .iter()
        .map(|tool| OpenAITool {
            kind: "function".to_string(),
            function: OpenAIFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

/// Arguments as the model sent them; malformed input goes back verbatim
fn raw_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Parse a tool-call argument string; malformed JSON is kept as a string
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    /// Generate a response from the chat completions API
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: Option<&GenerationParams>,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, tools, params, false);
        let headers = LLMHttpClient::build_headers(&self.api_key)?;
        let response_text = self
            .client
            .post_json(&self.name, &self.endpoint, headers, &request)
            .await?;

        let openai_response: OpenAIResponse =
            serde_json::from_str(&response_text).map_err(|e| self.parse_error(e))?;

        let choice = openai_response.choices.into_iter().next();
        let (content, tool_calls, finish_reason) = match choice {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|call| {
                        ToolCall::new(call.id, call.function.name, parse_arguments(&call.function.arguments))
                    })
                    .collect(),
                choice.finish_reason,
            ),
            None => (String::new(), Vec::new(), None),
        };

        Ok(LLMResponse {
            content,
            tool_calls,
            model: openai_response.model,
            input_tokens: openai_response.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: openai_response.usage.as_ref().map(|u| u.completion_tokens),
            total_tokens: openai_response.usage.as_ref().map(|u| u.total_tokens),
            finish_reason,
        })
    }

    /// Stream a response, forwarding text deltas as they arrive
    async fn generate_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: Option<&GenerationParams>,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, tools, params, true);
        let headers = LLMHttpClient::build_headers(&self.api_key)?;
        let mut stream = self
            .client
            .post_stream(&self.name, &self.endpoint, headers, &request)
            .await?;

        let mut accumulator = StreamAccumulator::default();
        while let Some(data) = stream.next_data().await? {
            let chunk: StreamChunk = serde_json::from_str(&data).map_err(|e| self.parse_error(e))?;
            if let Some(text) = accumulator.apply(chunk) {
                on_text(&text);
            }
        }

        debug!(provider = %self.name, "stream finished");
        Ok(accumulator.finish())
    }

    /// Get provider name
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    /// Check if API key is set
    fn has_api_key(&self) -> bool {
        self.key_optional || !self.api_key.is_empty()
    }
}

/// Builds a response out of streamed deltas
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    calls: Vec<PartialToolCall>,
    model: Option<String>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    /// Fold one chunk in, returning its text delta if any
    fn apply(&mut self, chunk: StreamChunk) -> Option<String> {
        if chunk.model.is_some() {
            self.model = chunk.model;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let mut text = None;
        for choice in chunk.choices {
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
            if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                self.content.push_str(&delta);
                text = Some(delta);
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                if self.calls.len() <= call.index {
                    self.calls.resize_with(call.index + 1, PartialToolCall::default);
                }
                let partial = &mut self.calls[call.index];
                if let Some(id) = call.id {
                    partial.id = id;
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }
        }
        text
    }

    fn finish(self) -> LLMResponse {
        LLMResponse {
            content: self.content,
            tool_calls: self
                .calls
                .into_iter()
                .filter(|call| !call.name.is_empty())
                .map(|call| ToolCall::new(call.id, call.name, parse_arguments(&call.arguments)))
                .collect(),
            model: self.model,
            input_tokens: self.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: self.usage.as_ref().map(|u| u.completion_tokens),
            total_tokens: self.usage.as_ref().map(|u| u.total_tokens),
            finish_reason: self.finish_reason,
        }
    }
}

/// OpenAI API request format
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// OpenAI API message format
#[derive(Debug, Serialize, Clone)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAIFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Clone)]
struct OpenAITool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize, Clone)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

/// Choice in OpenAI response
#[derive(Debug, Deserialize)]
struct Choice {
    message: OpenAIMessageResponse,
    finish_reason: Option<String>,
}

/// Message in OpenAI response
#[derive(Debug, Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

/// Token usage information
#[derive(Debug, Deserialize, Clone)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// One server-sent chunk of a streamed completion
#[derive(Debug, Deserialize)]
struct StreamChunk {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
