//! Configuration module
//!
//! This module handles command-line arguments and their resolution against
//! the environment and the optional settings file.

pub mod storage;

use crate::agent::deps::DEFAULT_MAX_RETURN_VALUES;
use crate::error::{DbdexError, Result};
use crate::llm::registry::{ModelSpec, ProviderRegistry};
use clap::Parser;
use std::path::PathBuf;

pub use storage::Settings;

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "dbdex", version, about = "Chat with your database")]
pub struct CliArgs {
    /// Database connection URI (e.g. sqlite://chinook.db, postgresql://user@host/db)
    #[arg(long, env = "DBDEX_DB_URI")]
    pub db_uri: Option<String>,

    /// Model to use, as PROVIDER:MODEL (e.g. openai:gpt-4o, anthropic:claude-3-5-sonnet-latest,
    /// google-gla:gemini-2.0-flash, groq:llama-3.3-70b-versatile, ollama:llama3.2)
    #[arg(long, env = "DBDEX_MODEL", value_name = "PROVIDER:MODEL")]
    pub model: Option<String>,

    /// API key for the model provider; falls back to the provider's environment
    /// variable (OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, ...)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Maximum number of values (cells) returned to the model from a query
    #[arg(long)]
    pub max_return_values: Option<usize>,

    /// Stream replies as they are generated
    #[arg(long)]
    pub stream: bool,

    /// Print log output to the console
    #[arg(long)]
    pub debug: bool,

    /// Settings file (defaults to <config dir>/dbdex/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Fully resolved session configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_uri: String,
    pub model: ModelSpec,
    pub api_key: Option<String>,
    pub max_return_values: usize,
    pub stream: bool,
    pub debug: bool,
}

impl AppConfig {
    /// Merge arguments over settings over defaults
    pub fn resolve(args: &CliArgs, settings: &Settings, registry: &ProviderRegistry) -> Result<Self> {
        let db_uri = args
            .db_uri
            .clone()
            .or_else(|| settings.db_uri.clone())
            .ok_or_else(|| {
                DbdexError::Config(
                    "No database URI given; pass --db-uri or set DBDEX_DB_URI".to_string(),
                )
            })?;

        let model = args
            .model
            .as_deref()
            .or(settings.model.as_deref())
            .ok_or_else(|| {
                DbdexError::Config(
                    "No model given; pass --model PROVIDER:MODEL or set DBDEX_MODEL".to_string(),
                )
            })?;
        let model = ModelSpec::parse(model)?;

        let api_key = registry.resolve_api_key(
            &model.provider,
            args.api_key.as_deref(),
            settings.get_api_key(&model.provider),
        );

        Ok(Self {
            db_uri,
            model,
            api_key,
            max_return_values: args
                .max_return_values
                .or(settings.max_return_values)
                .unwrap_or(DEFAULT_MAX_RETURN_VALUES),
            stream: args.stream || settings.stream.unwrap_or(false),
            debug: args.debug,
        })
    }
}
