use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::error::ToolingError;
use crate::config::ConnectionConfig;
use crate::domain::types::{ConnectionState, Tool, ToolArguments, ToolOutput};
use crate::infrastructure::rpc::protocol::{self, InitializeResult};
use crate::infrastructure::rpc::{Connector, RpcSession, TransportError};

/// The single logical connection to the tool server.
///
/// Connect and reconnect are serialized by `lifecycle`; calls made while
/// Ready only take the state lock long enough to clone the session handle.
pub struct RpcConnection {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    lifecycle: AsyncMutex<()>,
    inner: RwLock<Inner>,
}

struct Inner {
    state: ConnectionState,
    session: Option<Arc<dyn RpcSession>>,
    catalog: Arc<[Tool]>,
    generation: u64,
    instructions: Option<String>,
}

impl Inner {
    fn ready_session(&self) -> Option<&Arc<dyn RpcSession>> {
        match (&self.state, &self.session) {
            (ConnectionState::Ready, Some(session)) if session.is_open() => Some(session),
            _ => None,
        }
    }
}

/// Puts the state back to Disconnected unless the connect attempt completed.
struct ConnectingGuard<'a> {
    connection: &'a RpcConnection,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.connection.write();
            if inner.state == ConnectionState::Connecting {
                inner.state = ConnectionState::Disconnected;
                debug!(endpoint = %self.connection.endpoint(), "Connect attempt abandoned");
            }
        }
    }
}

impl RpcConnection {
    pub fn new(connector: Arc<dyn Connector>, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            lifecycle: AsyncMutex::new(()),
            inner: RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                session: None,
                catalog: Arc::from(Vec::new()),
                generation: 0,
                instructions: None,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        let inner = self.read();
        match inner.state {
            ConnectionState::Ready if inner.ready_session().is_none() => {
                ConnectionState::Disconnected
            }
            state => state,
        }
    }

    /// Bumped on every successful connect.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn instructions(&self) -> Option<String> {
        self.read().instructions.clone()
    }

    /// The catalog fetched by the last successful connect, kept through
    /// reconnects and failed recoveries. Never performs I/O.
    pub fn list_tools(&self) -> Arc<[Tool]> {
        Arc::clone(&self.read().catalog)
    }

    /// Returns the live catalog when already Ready; otherwise opens a new
    /// session, retrying while the server is not yet reachable.
    pub async fn connect(&self) -> Result<Arc<[Tool]>, ToolingError> {
        if let Some(catalog) = self.ready_catalog() {
            return Ok(catalog);
        }
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(catalog) = self.ready_catalog() {
            return Ok(catalog);
        }
        self.connect_locked().await
    }

    pub async fn reconnect(&self) -> Result<Arc<[Tool]>, ToolingError> {
        let _lifecycle = self.lifecycle.lock().await;
        warn!(endpoint = %self.endpoint(), "Reconnecting to tool server");
        self.teardown().await;
        self.connect_locked().await
    }

    /// Reconnects unless another caller already replaced the connection
    /// `generation` refers to.
    pub async fn reconnect_if_stale(&self, generation: u64) -> Result<Arc<[Tool]>, ToolingError> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let inner = self.read();
            if inner.generation != generation && inner.ready_session().is_some() {
                debug!(
                    endpoint = %self.endpoint(),
                    stale = generation,
                    current = inner.generation,
                    "Connection already replaced; skipping reconnect"
                );
                return Ok(Arc::clone(&inner.catalog));
            }
        }
        warn!(endpoint = %self.endpoint(), generation, "Reconnecting to tool server");
        self.teardown().await;
        self.connect_locked().await
    }

    /// One `tools/call` round-trip on the current session.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: &ToolArguments,
    ) -> Result<ToolOutput, ToolingError> {
        let (session, generation) = {
            let inner = self.read();
            match inner.ready_session() {
                Some(session) => (Arc::clone(session), inner.generation),
                None => return Err(ToolingError::NotConnected),
            }
        };

        let logged_arguments = Value::Object(arguments.clone());
        debug!(tool, arguments = %logged_arguments, "Invoking tool");
        match protocol::call_tool(session.as_ref(), tool, arguments).await {
            Ok(output) => {
                debug!(tool, items = output.content.len(), is_error = output.is_error, "Tool returned");
                Ok(output)
            }
            Err(source) if source.is_transient() => {
                self.mark_disconnected(generation);
                Err(ToolingError::TransportFailure {
                    tool: tool.to_string(),
                    source,
                })
            }
            Err(source) => Err(ToolingError::Rejected {
                tool: tool.to_string(),
                source,
            }),
        }
    }

    /// Closes the session and clears the catalog.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
        {
            let mut inner = self.write();
            inner.catalog = Arc::from(Vec::new());
            inner.instructions = None;
        }
        info!(endpoint = %self.endpoint(), "Tool server connection closed");
    }

    fn ready_catalog(&self) -> Option<Arc<[Tool]>> {
        let inner = self.read();
        inner.ready_session().map(|_| Arc::clone(&inner.catalog))
    }

    fn mark_disconnected(&self, generation: u64) {
        let mut inner = self.write();
        if inner.generation == generation && inner.state == ConnectionState::Ready {
            inner.state = ConnectionState::Disconnected;
            info!(endpoint = %self.endpoint(), generation, state = %inner.state, "Tool server connection lost");
        }
    }

    async fn connect_locked(&self) -> Result<Arc<[Tool]>, ToolingError> {
        self.teardown().await;
        self.write().state = ConnectionState::Connecting;
        let mut guard = ConnectingGuard {
            connection: self,
            armed: true,
        };

        let max_attempts = self.config.max_connect_attempts.max(1);
        let delay = self.config.connect_retry_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(endpoint = %self.endpoint(), attempt, max_attempts, "Connecting to tool server");

            match self.establish().await {
                Ok((session, init, tools)) => {
                    let catalog: Arc<[Tool]> = Arc::from(tools);
                    let generation = {
                        let mut inner = self.write();
                        inner.state = ConnectionState::Ready;
                        inner.session = Some(session);
                        inner.catalog = Arc::clone(&catalog);
                        inner.generation += 1;
                        inner.instructions = init.instructions;
                        inner.generation
                    };
                    guard.armed = false;
                    info!(
                        endpoint = %self.endpoint(),
                        tools = catalog.len(),
                        generation,
                        state = %ConnectionState::Ready,
                        "Connected to tool server"
                    );
                    return Ok(catalog);
                }
                Err(err) if err.is_unreachable() && attempt < max_attempts => {
                    warn!(
                        endpoint = %self.endpoint(),
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        %err,
                        "Tool server not ready, retrying"
                    );
                    sleep(delay).await;
                }
                Err(source) if source.is_unreachable() => {
                    error!(endpoint = %self.endpoint(), attempts = attempt, %source, "Giving up on tool server");
                    return Err(ToolingError::ConnectFailure {
                        endpoint: self.endpoint().to_string(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(source) => {
                    error!(endpoint = %self.endpoint(), %source, "Tool server handshake failed");
                    return Err(ToolingError::Handshake {
                        endpoint: self.endpoint().to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn establish(
        &self,
    ) -> Result<(Arc<dyn RpcSession>, InitializeResult, Vec<Tool>), TransportError> {
        let session = self.connector.open().await?;
        let handshake = async {
            let init = protocol::initialize(session.as_ref()).await?;
            let tools = protocol::list_tools(session.as_ref()).await?;
            Ok::<_, TransportError>((init, tools))
        }
        .await;

        match handshake {
            Ok((init, tools)) => Ok((session, init, tools)),
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    debug!(%close_err, "Ignoring close failure after handshake error");
                }
                Err(err)
            }
        }
    }

    /// Best-effort release of the held session. Close errors are swallowed.
    /// The catalog stays readable until a new connect replaces it.
    async fn teardown(&self) {
        let session = {
            let mut inner = self.write();
            inner.state = ConnectionState::Disconnected;
            inner.session.take()
        };
        if let Some(session) = session {
            if let Err(err) = session.close().await {
                debug!(endpoint = %self.endpoint(), %err, "Ignoring teardown failure");
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
