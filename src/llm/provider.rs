//! LLM Provider Trait
//!
//! This module defines the trait-based abstraction for LLM providers, the
//! conversation messages exchanged with them and the tool-calling types that
//! let a model request database work.

use crate::error::{DbdexError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// LLM message role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageRole {
    /// System message (sets behavior/context)
    System,
    /// User message (query or input)
    User,
    /// Assistant message (response or tool requests)
    Assistant,
    /// Result of a tool call
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back with the result
    pub id: String,
    /// Tool name
    pub name: String,
    /// Parsed JSON arguments
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// LLM message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call answered by a tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Whether a tool message reports a failure
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Create an assistant message carrying tool requests
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::assistant(content)
        }
    }

    /// Create a successful tool result
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }

    /// Create a failed tool result the model is expected to react to
    pub fn tool_error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::tool_result(tool_call_id, content)
        }
    }
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// What the tool does, shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// LLM response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Generated text content
    pub content: String,
    /// Tool calls requested instead of (or alongside) text
    pub tool_calls: Vec<ToolCall>,
    /// Number of tokens used (input)
    pub input_tokens: Option<u32>,
    /// Number of tokens used (output)
    pub output_tokens: Option<u32>,
    /// Total tokens used
    pub total_tokens: Option<u32>,
    /// Model used for generation
    pub model: Option<String>,
    /// Finish reason (e.g., "stop", "tool_calls")
    pub finish_reason: Option<String>,
}

impl LLMResponse {
    /// Create a new text response
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a response that only requests tools
    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Get total token count if available
    pub fn get_total_tokens(&self) -> Option<u32> {
        self.total_tokens.or_else(|| {
            self.input_tokens
                .and_then(|input| self.output_tokens.map(|output| input + output))
        })
    }

    /// The assistant turn to append to the conversation
    pub fn to_message(&self) -> Message {
        Message::assistant_with_tools(self.content.clone(), self.tool_calls.clone())
    }
}

/// LLM generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 1.0, higher = more random)
    pub temperature: Option<f32>,
    /// Top-p sampling (0.0 - 1.0)
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: None,
            top_p: None,
            stop_sequences: None,
        }
    }
}

impl GenerationParams {
    /// Create new default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Trait for LLM providers
///
/// This trait defines the interface that all LLM providers must implement,
/// enabling easy addition of new AI services.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate the next assistant turn
    ///
    /// # Arguments
    /// * `messages` - Conversation history, system prompt first
    /// * `tools` - Tools the model may request
    /// * `params` - Generation parameters
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: Option<&GenerationParams>,
    ) -> Result<LLMResponse>;

    /// Generate the next assistant turn, reporting text as it is produced
    ///
    /// Providers without streaming support report the whole text once.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: Option<&GenerationParams>,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<LLMResponse> {
        let response = self.generate(messages, tools, params).await?;
        if !response.content.is_empty() {
            on_text(&response.content);
        }
        Ok(response)
    }

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model(&self) -> &str;

    /// Check if the provider has an API key configured
    fn has_api_key(&self) -> bool;

    /// Validate the provider configuration
    fn validate_config(&self) -> Result<()> {
        if !self.has_api_key() {
            return Err(DbdexError::LLMApiKeyMissing(
                self.provider_name().to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for creating LLM providers
#[derive(Debug, Clone)]
pub struct LLMProviderBuilder {
    /// API key for the provider
    api_key: Option<String>,
    /// Base URL for API requests (for custom endpoints)
    base_url: Option<String>,
    /// Model to use
    model: Option<String>,
    /// Timeout for requests (in seconds)
    timeout: u64,
}

impl Default for LLMProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            timeout: 120,
        }
    }
}

impl LLMProviderBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API key
    pub fn get_api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Get the base URL
    pub fn get_base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Get the model
    pub fn get_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Get the timeout
    pub fn get_timeout(&self) -> u64 {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);

        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);

        let error_msg = Message::tool_error("call_1", "Only SELECT style queries are allowed");
        assert_eq!(error_msg.role, MessageRole::Tool);
        assert_eq!(error_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(error_msg.is_error);
    }

    #[test]
    fn test_response_to_message() {
        let call = ToolCall::new("call_1", "execute_sql", serde_json::json!({"sql": "SELECT 1"}));
        let response = LLMResponse::with_tool_calls(vec![call.clone()]);
        assert!(response.has_tool_calls());

        let message = response.to_message();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.tool_calls, vec![call]);
    }

    #[test]
    fn test_generation_params_builder() {
        let params = GenerationParams::new()
            .with_max_tokens(2048)
            .with_temperature(0.5);

        assert_eq!(params.max_tokens, Some(2048));
        assert_eq!(params.temperature, Some(0.5));
    }

    #[test]
    fn test_llm_response_tokens() {
        let response = LLMResponse {
            content: "Test".to_string(),
            input_tokens: Some(10),
            output_tokens: Some(5),
            ..Default::default()
        };

        assert_eq!(response.get_total_tokens(), Some(15));
    }

    #[test]
    fn test_provider_builder() {
        let builder = LLMProviderBuilder::new()
            .with_api_key("test-key")
            .with_model("gpt-4o")
            .with_timeout(30);

        assert_eq!(builder.get_api_key(), Some("test-key"));
        assert_eq!(builder.get_model(), Some("gpt-4o"));
        assert_eq!(builder.get_timeout(), 30);
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl LLMProvider for Fixed {
        async fn generate(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _params: Option<&GenerationParams>,
        ) -> Result<LLMResponse> {
            Ok(LLMResponse::new(self.0))
        }

        fn provider_name(&self) -> &str {
            "Fixed"
        }

        fn model(&self) -> &str {
            "fixed"
        }

        fn has_api_key(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_default_stream_emits_whole_reply_once() {
        let mut chunks = Vec::new();
        let mut on_text = |text: &str| chunks.push(text.to_string());
        let response = Fixed("whole reply")
            .generate_stream(&[Message::user("hi")], &[], None, &mut on_text)
            .await
            .unwrap();

        assert_eq!(response.content, "whole reply");
        assert_eq!(chunks, vec!["whole reply"]);

        let mut calls = 0;
        let mut count = |_: &str| calls += 1;
        Fixed("")
            .generate_stream(&[], &[], None, &mut count)
            .await
            .unwrap();
        assert_eq!(calls, 0);
    }
}
