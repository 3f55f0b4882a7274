use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use super::error::ConfigError;
use crate::constants::DEFAULT_SERVER_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// HTTP GET event stream plus POSTed messages.
    #[default]
    Sse,
    /// Child process speaking newline-delimited JSON over its pipes.
    Stdio,
}

impl TransportKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sse" | "http" => Ok(TransportKind::Sse),
            "stdio" => Ok(TransportKind::Stdio),
            other => Err(ConfigError::UnknownTransport {
                transport: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sse => f.write_str("sse"),
            TransportKind::Stdio => f.write_str("stdio"),
        }
    }
}

/// Where and how to reach the tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub transport: TransportKind,
    pub url: String,
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::sse(DEFAULT_SERVER_URL)
    }
}

impl ServerConfig {
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Sse,
            url: url.into(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            workdir: None,
        }
    }

    /// Human-readable identity used in logs and error messages.
    pub fn endpoint(&self) -> String {
        match (self.transport, &self.command) {
            (TransportKind::Stdio, Some(command)) => command.display().to_string(),
            _ => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct RawServer {
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub workdir: Option<String>,
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl TryFrom<RawServer> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServer) -> Result<Self, Self::Error> {
        let transport = match raw.transport.as_deref() {
            Some(value) => TransportKind::parse(value)?,
            None => TransportKind::default(),
        };

        let url = expand(raw.url.as_deref().unwrap_or(DEFAULT_SERVER_URL));
        let command = raw.command.map(|command| PathBuf::from(expand(&command)));

        match transport {
            TransportKind::Sse => {
                reqwest::Url::parse(&url).map_err(|err| ConfigError::InvalidServerUrl {
                    url: url.clone(),
                    message: err.to_string(),
                })?;
            }
            TransportKind::Stdio if command.is_none() => return Err(ConfigError::MissingCommand),
            TransportKind::Stdio => {}
        }

        Ok(Self {
            transport,
            url,
            command,
            args: raw.args.iter().map(|arg| expand(arg)).collect(),
            env: raw.env,
            workdir: raw.workdir.map(|dir| PathBuf::from(expand(&dir))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn expands_env_vars_in_command_and_args() {
        unsafe {
            env::set_var("SHEERWATER_TEST_MCP_ROOT", "/opt/sheerwater-mcp");
            env::set_var("SHEERWATER_TEST_PORT", "8123");
        }

        let raw = RawServer {
            transport: Some("stdio".into()),
            command: Some("${SHEERWATER_TEST_MCP_ROOT}/bin/server".into()),
            args: vec!["--port".into(), "${SHEERWATER_TEST_PORT}".into()],
            workdir: Some("${SHEERWATER_TEST_MCP_ROOT}/work".into()),
            ..RawServer::default()
        };

        let config = ServerConfig::try_from(raw).expect("stdio server");
        let command = config.command.expect("command");
        assert!(command.to_string_lossy().contains("/opt/sheerwater-mcp/bin/server"));
        assert_eq!(config.args, vec!["--port".to_string(), "8123".to_string()]);
        assert!(
            config
                .workdir
                .is_some_and(|dir| dir.to_string_lossy().contains("/opt/sheerwater-mcp/work"))
        );

        unsafe {
            env::remove_var("SHEERWATER_TEST_MCP_ROOT");
            env::remove_var("SHEERWATER_TEST_PORT");
        }
    }

    #[test]
    fn sse_is_the_default_transport() {
        let config = ServerConfig::try_from(RawServer::default()).expect("default server");
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn stdio_without_command_is_rejected() {
        let raw = RawServer {
            transport: Some("stdio".into()),
            ..RawServer::default()
        };
        assert!(matches!(
            ServerConfig::try_from(raw),
            Err(ConfigError::MissingCommand)
        ));
    }

    #[test]
    fn rejects_unknown_transport_and_bad_url() {
        let unknown = RawServer {
            transport: Some("websocket".into()),
            ..RawServer::default()
        };
        assert!(matches!(
            ServerConfig::try_from(unknown),
            Err(ConfigError::UnknownTransport { .. })
        ));

        let bad_url = RawServer {
            url: Some("not a url".into()),
            ..RawServer::default()
        };
        assert!(matches!(
            ServerConfig::try_from(bad_url),
            Err(ConfigError::InvalidServerUrl { .. })
        ));
    }
}
