//! Configuration Storage
//!
//! This module handles the optional persistent settings file holding
//! connection defaults and per-provider API keys.

use crate::error::{DbdexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Persistent settings
///
/// Every field is optional; command-line arguments and environment variables
/// take precedence over anything stored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database connection URI
    pub db_uri: Option<String>,
    /// Model in `provider:model` form
    pub model: Option<String>,
    /// Cell budget for results returned to the model
    pub max_return_values: Option<usize>,
    /// Stream replies
    pub stream: Option<bool>,
    /// API keys keyed by provider tag
    pub api_keys: HashMap<String, String>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("dbdex"))
            .ok_or_else(|| DbdexError::Config("Could not find configuration directory".to_string()))
    }

    /// Get the default configuration file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load settings from `path`, or from the default location
    ///
    /// A missing file yields empty settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file()?,
        };

        if !config_file.exists() {
            debug!(path = %config_file.display(), "no settings file");
            return Ok(Self::new());
        }

        let content = fs::read_to_string(&config_file)?;
        toml::from_str(&content).map_err(|e| {
            DbdexError::Config(format!(
                "Failed to parse {}: {}",
                config_file.display(),
                e
            ))
        })
    }

    /// Save settings to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DbdexError::Config(format!("Failed to serialize settings: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get API key for a provider
    pub fn get_api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(String::as_str)
    }

    /// Set API key for a provider
    pub fn set_api_key(&mut self, provider: impl Into<String>, key: impl Into<String>) {
        self.api_keys.insert(provider.into(), key.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(settings, Settings::new());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut settings = Settings {
            db_uri: Some("sqlite://chinook.db".to_string()),
            model: Some("openai:gpt-4o".to_string()),
            max_return_values: Some(50),
            ..Default::default()
        };
        settings.set_api_key("openai", "sk-test");
        settings.save(&path).unwrap();

        let loaded = Settings::load(Some(&path)).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.get_api_key("openai"), Some("sk-test"));
        assert_eq!(loaded.get_api_key("anthropic"), None);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "stream = true\n\n[api_keys]\ngroq = \"gsk\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.stream, Some(true));
        assert_eq!(settings.db_uri, None);
        assert_eq!(settings.get_api_key("groq"), Some("gsk"));
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "max_return_values = \"many\"").unwrap();
        assert!(matches!(Settings::load(Some(&path)), Err(DbdexError::Config(_))));
    }
}
