use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::connection::RpcConnection;
use super::error::ToolingError;
use super::interface::ToolServerInterface;
use crate::domain::types::{ConnectionState, Tool, ToolArguments, ToolOutput};

/// Call-level retry on top of the shared connection. The only path the
/// rest of the crate uses to execute a tool.
#[derive(Clone)]
pub struct ToolInvoker {
    connection: Arc<RpcConnection>,
    max_attempts: u32,
    backoff: Duration,
}

impl ToolInvoker {
    pub fn new(connection: Arc<RpcConnection>) -> Self {
        let config = connection.config().clone();
        Self {
            connection,
            max_attempts: config.max_call_attempts.max(1),
            backoff: config.call_backoff,
        }
    }

    pub fn connection(&self) -> &Arc<RpcConnection> {
        &self.connection
    }

    pub async fn call(
        &self,
        tool: &str,
        arguments: &ToolArguments,
    ) -> Result<ToolOutput, ToolingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.connection.state() != ConnectionState::Ready {
                warn!(tool, "Tool server not connected, connecting");
                self.connection.connect().await?;
            }
            let generation = self.connection.generation();

            info!(tool, attempt, max_attempts = self.max_attempts, "Calling tool");
            let source = match self.connection.invoke(tool, arguments).await {
                Ok(output) => {
                    info!(tool, "Tool returned successfully");
                    return Ok(output);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(ToolingError::TransportFailure { source, .. }) => source,
                Err(err) => {
                    // NotConnected: the session died between the state check
                    // and the call.
                    warn!(tool, attempt, %err, "Tool server connection lost before the call");
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    continue;
                }
            };

            warn!(
                tool,
                attempt,
                max_attempts = self.max_attempts,
                %source,
                "Tool server connection error during tool call"
            );
            if attempt >= self.max_attempts {
                return Err(ToolingError::ToolCallExhausted {
                    tool: tool.to_string(),
                    attempts: attempt,
                    source,
                });
            }
            self.connection.reconnect_if_stale(generation).await?;
            sleep(self.backoff).await;
        }
    }
}

#[async_trait]
impl ToolServerInterface for ToolInvoker {
    fn tools(&self) -> Arc<[Tool]> {
        self.connection.list_tools()
    }

    /// Connects when the session is gone so a recovered server is offered to
    /// the model again. Falls back to the cached catalog if it stays down.
    async fn catalog(&self) -> Arc<[Tool]> {
        if self.connection.state() == ConnectionState::Ready {
            return self.connection.list_tools();
        }
        match self.connection.connect().await {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(%err, "Tool server unavailable; using the cached catalog");
                self.connection.list_tools()
            }
        }
    }

    async fn call(&self, tool: &str, arguments: &ToolArguments) -> Result<ToolOutput, ToolingError> {
        ToolInvoker::call(self, tool, arguments).await
    }
}
