use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::DEFAULT_PREFERENCES_PATH;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/chatster.json";
pub const DEFAULT_DATABASE_PATH: &str = "data/chatster.db";
pub const DEFAULT_ROOM: &str = "chats";

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_DATABASE: &str = "CHATSTER_DB";
pub const ENV_ROOM: &str = "CHATSTER_ROOM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub room: String,
    pub preferences_path: String,
    pub bot_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub retry: RetryConfig,
    pub gemini: GeminiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            room: DEFAULT_ROOM.to_string(),
            preferences_path: DEFAULT_PREFERENCES_PATH.to_string(),
            bot_interval_ms: 3_000,
            poll_interval_ms: 1_000,
            retry: RetryConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Overlay values from the process environment (after `.env` is loaded).
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = value(ENV_API_KEY) {
            self.gemini.api_key = Some(key);
        }
        if let Some(path) = value(ENV_DATABASE) {
            self.database_path = path;
        }
        if let Some(room) = value(ENV_ROOM) {
            self.room = room;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            self.retry.backoff_factor,
        )
    }

    pub fn bot_interval(&self) -> Duration {
        Duration::from_millis(self.bot_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}
