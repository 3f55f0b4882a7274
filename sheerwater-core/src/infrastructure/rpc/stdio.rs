use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, Inbound};
use super::transport::{Connector, RpcSession, TransportError};
use super::types::RpcRequest;
use crate::config::ServerConfig;

/// Spawns the configured command once per session.
pub struct StdioConnector {
    server: ServerConfig,
    endpoint: String,
}

impl StdioConnector {
    pub fn new(server: ServerConfig) -> Self {
        let endpoint = server.endpoint();
        Self { server, endpoint }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self) -> Result<Arc<dyn RpcSession>, TransportError> {
        let program = self.server.command.as_ref().ok_or_else(|| TransportError::Spawn {
            endpoint: self.endpoint.clone(),
            message: "no command configured".into(),
        })?;

        let mut command = Command::new(program);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.server.workdir {
            command.current_dir(dir);
        }
        command.args(&self.server.args);
        for (key, value) in &self.server.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            endpoint: self.endpoint.clone(),
            message: source.to_string(),
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::broken(&self.endpoint, "failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::broken(&self.endpoint, "failed to capture stdout"))?;
        debug!(command = %self.endpoint, pid = child.id(), "Spawned tool server");

        let shared = Arc::new(StdioShared {
            dispatcher: Dispatcher::new(self.endpoint.clone()),
            writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
        });
        let reader = tokio::spawn(Arc::clone(&shared).reader_loop(stdout));

        Ok(Arc::new(StdioSession {
            shared,
            child: AsyncMutex::new(Some(child)),
            reader: Mutex::new(Some(reader)),
        }))
    }
}

struct StdioShared {
    dispatcher: Dispatcher,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
}

impl StdioShared {
    fn endpoint(&self) -> &str {
        self.dispatcher.endpoint()
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let trimmed = raw.trim();
                    // Servers that log to stdout with colors are tolerated.
                    if trimmed.is_empty() || trimmed.starts_with('\u{1b}') {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => self.handle(value).await,
                        Err(err) => {
                            warn!(command = %self.endpoint(), line = trimmed, %err, "Skipping non-JSON line from tool server");
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(command = %self.endpoint(), %err, "Failed reading tool server output");
                    break;
                }
            }
        }
        self.writer.lock().await.take();
        self.dispatcher.fail_all("tool server closed its output");
    }

    async fn handle(&self, value: Value) {
        match self.dispatcher.dispatch(value) {
            Inbound::Handled => {}
            Inbound::Reply(response) => {
                if let Err(err) = self.write(&response).await {
                    warn!(command = %self.endpoint(), %err, "Failed to answer server request");
                }
            }
            Inbound::Notification { method } if method == "notifications/tools/list_changed" => {
                info!(command = %self.endpoint(), "Tool server reports a changed catalog; it is refreshed on reconnect");
            }
            Inbound::Notification { method } => {
                debug!(command = %self.endpoint(), method, "Notification from tool server");
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), TransportError> {
        let mut encoded = serde_json::to_vec(message).map_err(TransportError::protocol)?;
        encoded.push(b'\n');

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| TransportError::broken(self.endpoint(), "stdin is closed"))?;
        let written = async {
            stream.write_all(&encoded).await?;
            stream.flush().await
        }
        .await;
        if let Err(err) = written {
            writer.take();
            return Err(TransportError::broken(self.endpoint(), err));
        }
        Ok(())
    }
}

pub struct StdioSession {
    shared: Arc<StdioShared>,
    child: AsyncMutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl RpcSession for StdioSession {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let pending = self.shared.dispatcher.register()?;
        self.shared
            .write(&RpcRequest::call(pending.id(), method, params))
            .await?;
        pending.wait().await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.shared
            .write(&RpcRequest::notification(method, params))
            .await
    }

    fn is_open(&self) -> bool {
        !self.shared.dispatcher.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.shared.writer.lock().await.take();
        self.shared.dispatcher.fail_all("session closed");

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(command = %self.shared.endpoint(), %err, "Tool server already exited");
            }
        }
        Ok(())
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        if let Some(reader) = self
            .reader
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            reader.abort();
        }
    }
}
