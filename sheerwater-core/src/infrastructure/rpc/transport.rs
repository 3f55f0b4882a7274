use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failures below the tool-call layer, classified by how a caller may
/// recover from them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is listening yet. Retryable while connecting.
    #[error("tool server at {endpoint} is not reachable: {message}")]
    Unreachable { endpoint: String, message: String },
    /// An established stream was reset, closed or hit EOF. Retryable by
    /// reconnecting.
    #[error("connection to tool server at {endpoint} broke: {message}")]
    Broken { endpoint: String, message: String },
    #[error("failed to start tool server '{endpoint}': {message}")]
    Spawn { endpoint: String, message: String },
    #[error("tool server returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("tool server sent an invalid payload: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn unreachable(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn broken(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Broken {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn protocol(message: impl ToString) -> Self {
        Self::Protocol(message.to_string())
    }

    /// The only class retried by the connect loop.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable { .. })
    }

    /// Failures a reconnect is expected to cure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable { .. } | TransportError::Broken { .. }
        )
    }
}

/// One live, bidirectional JSON-RPC stream to a tool server.
#[async_trait]
pub trait RpcSession: Send + Sync {
    /// Sends a request and waits for the correlated response's `result`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError>;

    /// False once the underlying stream has ended.
    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens fresh sessions to one configured tool server.
#[async_trait]
pub trait Connector: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn open(&self) -> Result<Arc<dyn RpcSession>, TransportError>;
}
