use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown server transport '{transport}' (expected 'sse' or 'stdio')")]
    UnknownTransport { transport: String },

    #[error("stdio transport requires [server].command")]
    MissingCommand,

    #[error("invalid tool server url '{url}': {message}")]
    InvalidServerUrl { url: String, message: String },

    #[error("[{section}].{field} must be greater than zero")]
    ZeroValue {
        section: &'static str,
        field: &'static str,
    },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::NotFound { path } => {
                format!("Config file {} does not exist.", path.display())
            }
            ConfigError::Parse { path, .. } => {
                format!("Config file {} is not valid TOML.", path.display())
            }
            other => other.to_string(),
        }
    }
}
