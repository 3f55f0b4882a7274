use super::error::ConfigError;
use super::server::ServerConfig;
use crate::constants::{
    DEFAULT_ANTHROPIC_ENDPOINT, DEFAULT_CALL_BACKOFF_MS, DEFAULT_CONNECT_RETRY_DELAY_MS,
    DEFAULT_MAX_CALL_ATTEMPTS, DEFAULT_MAX_CONNECT_ATTEMPTS, DEFAULT_MAX_ROUNDS,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT,
};
use std::path::Path;
use std::time::Duration;

/// Application configuration loaded from chat.toml
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub model: ModelConfig,
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }
}

/// Retry budget of the tool-server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub max_connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub max_call_attempts: u32,
    pub call_backoff: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            connect_retry_delay: Duration::from_millis(DEFAULT_CONNECT_RETRY_DELAY_MS),
            max_call_attempts: DEFAULT_MAX_CALL_ATTEMPTS,
            call_backoff: Duration::from_millis(DEFAULT_CALL_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub max_rounds: usize,
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ANTHROPIC_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_rounds: DEFAULT_MAX_ROUNDS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
