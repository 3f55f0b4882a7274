//! JSON-RPC plumbing for MCP tool servers.

mod dispatcher;
pub mod protocol;
pub mod sse;
#[cfg(feature = "native-transport")]
pub mod stdio;
pub mod transport;
pub mod types;

use std::sync::Arc;

use crate::config::{ServerConfig, TransportKind};

pub use protocol::{InitializeResult, PROTOCOL_VERSION};
pub use sse::SseConnector;
#[cfg(feature = "native-transport")]
pub use stdio::StdioConnector;
pub use transport::{Connector, RpcSession, TransportError};

/// Builds the connector matching the configured transport.
pub fn connector_for(server: &ServerConfig) -> Result<Arc<dyn Connector>, TransportError> {
    match server.transport {
        TransportKind::Sse => Ok(Arc::new(SseConnector::new(server.url.clone()))),
        #[cfg(feature = "native-transport")]
        TransportKind::Stdio => Ok(Arc::new(StdioConnector::new(server.clone()))),
        #[cfg(not(feature = "native-transport"))]
        TransportKind::Stdio => Err(TransportError::Spawn {
            endpoint: server.endpoint(),
            message: "stdio transport is disabled in this build".into(),
        }),
    }
}
