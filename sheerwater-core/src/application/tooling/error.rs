use thiserror::Error;

use crate::infrastructure::rpc::TransportError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolingError {
    /// The server stayed unreachable for the whole connect budget.
    #[error("could not connect to tool server at {endpoint} after {attempts} attempts: {source}")]
    ConnectFailure {
        endpoint: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    /// Connecting failed in a way retrying would not fix.
    #[error("tool server handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: TransportError,
    },
    #[error("tool server connection is not ready")]
    NotConnected,
    #[error("tool call '{tool}' failed in transport: {source}")]
    TransportFailure {
        tool: String,
        #[source]
        source: TransportError,
    },
    #[error("tool '{tool}' failed after {attempts} attempts: {source}")]
    ToolCallExhausted {
        tool: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    /// The server answered, but refused the call.
    #[error("tool '{tool}' was rejected: {source}")]
    Rejected {
        tool: String,
        #[source]
        source: TransportError,
    },
}

impl ToolingError {
    /// Whether reconnecting may let the same call succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ToolingError::NotConnected => true,
            ToolingError::TransportFailure { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ToolingError::ConnectFailure { endpoint, .. } => format!(
                "The tool server at {endpoint} is not reachable. Check that it is running."
            ),
            ToolingError::Handshake { endpoint, .. } => {
                format!("The tool server at {endpoint} did not complete the MCP handshake.")
            }
            ToolingError::NotConnected => "The tool server is not connected yet.".to_string(),
            ToolingError::TransportFailure { tool, .. } => {
                format!("Lost the connection to the tool server while running \"{tool}\".")
            }
            ToolingError::ToolCallExhausted { tool, attempts, .. } => {
                format!("Tool \"{tool}\" could not be reached after {attempts} attempts.")
            }
            ToolingError::Rejected { tool, source } => match source {
                TransportError::Rpc { message, .. } => {
                    format!("Tool \"{tool}\" rejected the request: {message}")
                }
                other => format!("Tool \"{tool}\" failed: {other}"),
            },
        }
    }
}
