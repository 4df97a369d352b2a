//! LLM integration module
//!
//! This module provides trait-based LLM provider abstraction, the provider
//! registry keyed by `provider:` tag and the retrying invoker used for model
//! round-trips.

pub mod client;
pub mod provider;
pub mod registry;
pub mod retry;

// Provider implementations
pub mod providers {
    pub mod anthropic;
    pub mod openai;
}

// Re-exports
pub use provider::{
    GenerationParams, LLMProvider, LLMProviderBuilder, LLMResponse, Message, MessageRole,
    ToolCall, ToolDefinition,
};
pub use registry::{ModelSpec, ProviderRegistry};
pub use retry::{Backoff, FaultClass, FaultClassifier, OverloadClassifier, RetryingInvoker};
