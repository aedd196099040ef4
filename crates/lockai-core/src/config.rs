//! Configuration management for the LockAI client.
//!
//! Loads configuration from `${LOCKAI_HOME}/config.toml` with sensible
//! defaults. Assistant settings are snapshotted into [`ExchangeSettings`] at
//! the start of an exchange so a config change mid-stream cannot alter
//! in-flight behavior.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::paths;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Assistant behavior settings for the chat endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Named assistant role/persona passed to the backend.
    pub role: Option<String>,
    /// Model override passed to the backend.
    pub model: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL (chat, paper, and title endpoints).
    pub base_url: String,
    /// Authenticated user id, as produced by the SSO flow.
    pub user_id: Option<String>,
    /// Assistant settings.
    pub assistant: AssistantConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: None,
            assistant: AssistantConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from `${LOCKAI_HOME}/config.toml`.
    ///
    /// Returns defaults if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads the configuration from an explicit path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Returns the effective base URL.
    ///
    /// Resolution order:
    /// 1. `LOCKAI_BASE_URL` env var (if set and non-empty)
    /// 2. `base_url` from config
    pub fn effective_base_url(&self) -> String {
        match std::env::var("LOCKAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            _ => self.base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Settings captured once at exchange start.
///
/// Threaded into the request explicitly rather than re-read from config
/// mid-exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeSettings {
    pub role: Option<String>,
    pub model: Option<String>,
}

impl ExchangeSettings {
    /// Snapshots the assistant settings from the config.
    pub fn capture(config: &Config) -> Self {
        Self {
            role: config.assistant.role.clone(),
            model: config.assistant.model.clone(),
        }
    }
}
