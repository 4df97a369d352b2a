//! Provider registry
//!
//! Model identifiers come in `provider:model` form. The provider tag is looked
//! up once at startup in a registry of named constructors.

use crate::error::{DbdexError, Result};
use crate::llm::provider::{LLMProvider, LLMProviderBuilder};
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::openai::{OpenAIProvider, OPENAI_API_BASE};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Default Ollama endpoint, overridable with `OLLAMA_BASE_URL`
pub const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434/v1";

/// A parsed `provider:model` identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    /// Split `provider:model` on the first colon
    ///
    /// Model names may themselves contain colons (e.g. `ollama:llama3.2:3b`).
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().split_once(':') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok(Self {
                provider: provider.to_lowercase(),
                model: model.to_string(),
            }),
            _ => Err(DbdexError::InvalidModelName(value.to_string())),
        }
    }
}

impl FromStr for ModelSpec {
    type Err = DbdexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Builds a provider from resolved settings
pub type ProviderConstructor = fn(&LLMProviderBuilder) -> Result<Box<dyn LLMProvider>>;

/// A registered provider
#[derive(Clone)]
pub struct ProviderEntry {
    /// Environment variable holding the API key, if the provider needs one
    pub key_env: Option<&'static str>,
    constructor: ProviderConstructor,
}

/// Provider constructors keyed by tag
#[derive(Clone)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, ProviderEntry>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("openai", Some("OPENAI_API_KEY"), |b| {
            Ok(Box::new(OpenAIProvider::from_builder("OpenAI", OPENAI_API_BASE, b)?))
        });
        registry.register("anthropic", Some("ANTHROPIC_API_KEY"), |b| {
            Ok(Box::new(AnthropicProvider::from_builder(b)?))
        });
        registry.register("google-gla", Some("GEMINI_API_KEY"), |b| {
            Ok(Box::new(OpenAIProvider::from_builder(
                "Gemini",
                "https://generativelanguage.googleapis.com/v1beta/openai",
                b,
            )?))
        });
        registry.register("groq", Some("GROQ_API_KEY"), |b| {
            Ok(Box::new(OpenAIProvider::from_builder(
                "Groq",
                "https://api.groq.com/openai/v1",
                b,
            )?))
        });
        registry.register("mistral", Some("MISTRAL_API_KEY"), |b| {
            Ok(Box::new(OpenAIProvider::from_builder(
                "Mistral",
                "https://api.mistral.ai/v1",
                b,
            )?))
        });
        registry.register("xai", Some("XAI_API_KEY"), |b| {
            Ok(Box::new(OpenAIProvider::from_builder("xAI", "https://api.x.ai/v1", b)?))
        });
        registry.register("ollama", None, |b| {
            let base = std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| OLLAMA_DEFAULT_BASE.to_string());
            Ok(Box::new(
                OpenAIProvider::from_builder("Ollama", &base, b)?.without_required_key(),
            ))
        });
        registry
    }
}

impl ProviderRegistry {
    /// Registry with the built-in providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without any providers
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register (or replace) a provider tag
    pub fn register(
        &mut self,
        tag: &str,
        key_env: Option<&'static str>,
        constructor: ProviderConstructor,
    ) {
        self.entries.insert(
            tag.to_string(),
            ProviderEntry {
                key_env,
                constructor,
            },
        );
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn get(&self, tag: &str) -> Option<&ProviderEntry> {
        self.entries.get(tag)
    }

    /// Resolve an API key: explicit value, then environment, then settings file
    pub fn resolve_api_key(
        &self,
        tag: &str,
        explicit: Option<&str>,
        stored: Option<&str>,
    ) -> Option<String> {
        let non_empty = |s: &&str| !s.trim().is_empty();
        if let Some(key) = explicit.filter(non_empty) {
            return Some(key.to_string());
        }
        let from_env = self
            .get(tag)
            .and_then(|entry| entry.key_env)
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        from_env.or_else(|| stored.filter(non_empty).map(str::to_string))
    }

    /// Construct and validate the provider for `spec`
    pub fn build(
        &self,
        spec: &ModelSpec,
        api_key: Option<String>,
    ) -> Result<Box<dyn LLMProvider>> {
        let entry = self
            .get(&spec.provider)
            .ok_or_else(|| DbdexError::UnsupportedProvider(spec.provider.clone()))?;

        let mut builder = LLMProviderBuilder::new().with_model(spec.model.clone());
        if let Some(key) = api_key {
            builder = builder.with_api_key(key);
        }

        let provider = (entry.constructor)(&builder)?;
        provider.validate_config()?;
        info!(provider = provider.provider_name(), model = provider.model(), "model provider ready");
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_spec_parse() {
        let spec = ModelSpec::parse("openai:gpt-4o").unwrap();
        assert_eq!(spec.provider, "openai");
        assert_eq!(spec.model, "gpt-4o");

        let spec: ModelSpec = "ollama:llama3.2:3b".parse().unwrap();
        assert_eq!(spec.model, "llama3.2:3b");
        assert_eq!(spec.to_string(), "ollama:llama3.2:3b");

        for bad in ["gpt-4o", ":gpt-4o", "openai:", ""] {
            assert!(matches!(
                ModelSpec::parse(bad),
                Err(DbdexError::InvalidModelName(_))
            ));
        }
    }

    #[test]
    fn test_registry_tags() {
        let registry = ProviderRegistry::new();
        assert_eq!(
            registry.tags(),
            vec!["anthropic", "google-gla", "groq", "mistral", "ollama", "openai", "xai"]
        );
        assert_eq!(registry.get("groq").unwrap().key_env, Some("GROQ_API_KEY"));
        assert_eq!(registry.get("ollama").unwrap().key_env, None);
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::new();
        let spec = ModelSpec::parse("cohere:command-r").unwrap();
        let err = registry.build(&spec, Some("key".to_string())).err().unwrap();
        assert!(matches!(err, DbdexError::UnsupportedProvider(tag) if tag == "cohere"));
    }

    #[test]
    fn test_build_requires_key() {
        let registry = ProviderRegistry::new();
        let spec = ModelSpec::parse("anthropic:claude-3-5-haiku-latest").unwrap();
        let err = registry.build(&spec, None).err().unwrap();
        assert!(matches!(err, DbdexError::LLMApiKeyMissing(_)));

        let provider = registry.build(&spec, Some("sk-test".to_string())).unwrap();
        assert_eq!(provider.provider_name(), "Anthropic");
        assert_eq!(provider.model(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let registry = ProviderRegistry::new();
        let spec = ModelSpec::parse("ollama:llama3.2").unwrap();
        let provider = registry.build(&spec, None).unwrap();
        assert_eq!(provider.provider_name(), "Ollama");
    }

    #[test]
    fn test_explicit_key_wins() {
        let registry = ProviderRegistry::new();
        assert_eq!(
            registry.resolve_api_key("openai", Some("cli-key"), Some("file-key")),
            Some("cli-key".to_string())
        );
        assert_eq!(registry.resolve_api_key("ollama", None, Some("file-key")), Some("file-key".to_string()));
        assert_eq!(registry.resolve_api_key("ollama", Some("  "), None), None);
    }
}
