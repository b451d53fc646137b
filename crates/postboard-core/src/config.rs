//! Application configuration management.
//!
//! This module handles loading the client configuration: the
//! identity provider API key and endpoints, where remembered sessions are
//! kept, and the token refresh retry policy.
//!
//! Configuration is stored at `~/.config/postboard/config.json`. The API key
//! can also come from the `POSTBOARD_API_KEY` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::RefreshConfig;

/// Application name used for config/data directory paths
const APP_NAME: &str = "postboard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Directory (under the data dir) holding remembered sessions
const SESSION_DIR: &str = "session";

/// Environment variable overriding the configured API key
pub const API_KEY_ENV: &str = "POSTBOARD_API_KEY";

const DEFAULT_SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const DEFAULT_SIGN_IN_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const DEFAULT_CHANGE_PASSWORD_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:update";
const DEFAULT_REFRESH_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh attempts before giving up on a scheduled refresh
const DEFAULT_REFRESH_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between refresh attempts
const DEFAULT_REFRESH_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub sign_up_url: String,
    pub sign_in_url: String,
    pub change_password_url: String,
    pub refresh_token_url: String,
    /// Overrides the default location for remembered sessions
    pub storage_dir: Option<PathBuf>,
    pub refresh_max_attempts: u32,
    pub refresh_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            sign_up_url: DEFAULT_SIGN_UP_URL.to_string(),
            sign_in_url: DEFAULT_SIGN_IN_URL.to_string(),
            change_password_url: DEFAULT_CHANGE_PASSWORD_URL.to_string(),
            refresh_token_url: DEFAULT_REFRESH_TOKEN_URL.to_string(),
            storage_dir: None,
            refresh_max_attempts: DEFAULT_REFRESH_MAX_ATTEMPTS,
            refresh_retry_delay_ms: DEFAULT_REFRESH_RETRY_DELAY_MS,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.api_key = Some(key);
        }
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding remembered (durable) sessions
    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(SESSION_DIR))
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            max_attempts: self.refresh_max_attempts.max(1),
            retry_delay: Duration::from_millis(self.refresh_retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::from_json(r#"{"api_key": "abc", "refresh_max_attempts": 5}"#).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.refresh_max_attempts, 5);
        assert_eq!(config.sign_in_url, DEFAULT_SIGN_IN_URL);
        assert_eq!(config.refresh_retry_delay_ms, DEFAULT_REFRESH_RETRY_DELAY_MS);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_refresh_config_defaults() {
        let refresh = Config::default().refresh_config();
        assert_eq!(refresh.max_attempts, 3);
        assert_eq!(refresh.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_refresh_config_needs_one_attempt() {
        let config = Config {
            refresh_max_attempts: 0,
            ..Config::default()
        };
        assert_eq!(config.refresh_config().max_attempts, 1);
    }

    #[test]
    fn test_storage_dir_override() {
        let config = Config {
            storage_dir: Some(PathBuf::from("/tmp/postboard-test")),
            ..Config::default()
        };
        assert_eq!(
            config.session_dir().unwrap(),
            PathBuf::from("/tmp/postboard-test")
        );
    }
}
