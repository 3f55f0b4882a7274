use super::app::{AppConfig, ConnectionConfig, ModelConfig};
use super::error::ConfigError;
use super::server::{RawServer, ServerConfig};
use crate::constants::{CONFIG_PATH, ENV_PATH};
use dotenvy::from_filename;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub server: Option<RawServer>,
    #[serde(default)]
    pub connection: Option<RawConnection>,
    #[serde(default)]
    pub model: Option<RawModel>,
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct RawConnection {
    pub max_connect_attempts: Option<u32>,
    pub connect_retry_delay_ms: Option<u64>,
    pub max_call_attempts: Option<u32>,
    pub call_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct RawModel {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_rounds: Option<usize>,
    pub system_prompt: Option<String>,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration.
///
/// An explicitly given path must exist. Without one, `config/chat.toml` is
/// read when present and built-in defaults are used otherwise. Environment
/// overrides are applied last.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    ensure_env_loaded();
    let parsed = match path {
        Some(path) => read_raw(path)?,
        None => match read_raw(Path::new(CONFIG_PATH)) {
            Err(ConfigError::NotFound { path }) => {
                debug!(path = %path.display(), "No config file; using defaults");
                RawConfig::default()
            }
            other => other?,
        },
    };
    let config = validate_and_build(parsed)?;
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    debug!(path = %path.display(), "Reading chat configuration file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn positive<T: Default + PartialEq>(
    value: Option<T>,
    fallback: T,
    section: &'static str,
    field: &'static str,
) -> Result<T, ConfigError> {
    match value {
        Some(value) if value == T::default() => Err(ConfigError::ZeroValue { section, field }),
        Some(value) => Ok(value),
        None => Ok(fallback),
    }
}

pub(super) fn validate_and_build(parsed: RawConfig) -> Result<AppConfig, ConfigError> {
    let server = ServerConfig::try_from(parsed.server.unwrap_or_default())?;

    let defaults = ConnectionConfig::default();
    let raw = parsed.connection.unwrap_or_default();
    let connection = ConnectionConfig {
        max_connect_attempts: positive(
            raw.max_connect_attempts,
            defaults.max_connect_attempts,
            "connection",
            "max_connect_attempts",
        )?,
        connect_retry_delay: raw
            .connect_retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.connect_retry_delay),
        max_call_attempts: positive(
            raw.max_call_attempts,
            defaults.max_call_attempts,
            "connection",
            "max_call_attempts",
        )?,
        call_backoff: raw
            .call_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.call_backoff),
    };

    let defaults = ModelConfig::default();
    let raw = parsed.model.unwrap_or_default();
    let model = ModelConfig {
        endpoint: raw.endpoint.unwrap_or(defaults.endpoint),
        api_key: raw.api_key.filter(|key| !key.trim().is_empty()),
        model: raw
            .model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(defaults.model),
        max_tokens: positive(raw.max_tokens, defaults.max_tokens, "model", "max_tokens")?,
        max_rounds: positive(raw.max_rounds, defaults.max_rounds, "model", "max_rounds")?,
        system_prompt: raw
            .system_prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(defaults.system_prompt),
    };

    Ok(AppConfig {
        server,
        connection,
        model,
    })
}

/// `MCP_SERVER_URL`, `ANTHROPIC_API_KEY` and `SHEERWATER_MODEL` win over
/// the file.
pub(super) fn apply_env_overrides(
    mut config: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> AppConfig {
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    if let Some(url) = non_empty("MCP_SERVER_URL") {
        config.server.url = url;
    }
    if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
        config.model.api_key = Some(key);
    }
    if let Some(model) = non_empty("SHEERWATER_MODEL") {
        config.model.model = model;
    }
    config
}
