//! HTTP+SSE transport: the event stream carries server-to-client frames,
//! client-to-server frames are POSTed to the URL announced by the
//! `endpoint` event.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use reqwest_eventsource::{Error as SseError, Event, EventSource, retry::Never};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, Inbound};
use super::transport::{Connector, RpcSession, TransportError};
use super::types::RpcRequest;
use crate::constants::DEFAULT_HANDSHAKE_TIMEOUT_MS;

pub struct SseConnector {
    url: String,
    http: reqwest::Client,
    handshake_timeout: Duration,
}

impl SseConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    pub fn with_client(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        }
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    async fn wait_for_endpoint(
        &self,
        source: &mut EventSource,
        base: &Url,
    ) -> Result<Url, TransportError> {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!(url = %self.url, "Event stream opened"),
                Ok(Event::Message(message)) if message.event == "endpoint" => {
                    return base.join(message.data.trim()).map_err(|err| {
                        TransportError::protocol(format!(
                            "invalid endpoint '{}': {err}",
                            message.data
                        ))
                    });
                }
                Ok(Event::Message(message)) => {
                    debug!(url = %self.url, event = %message.event, "Ignoring event before endpoint");
                }
                Err(err) => return Err(classify(&self.url, err)),
            }
        }
        Err(TransportError::broken(
            &self.url,
            "event stream ended before the endpoint event",
        ))
    }
}

#[async_trait]
impl Connector for SseConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<Arc<dyn RpcSession>, TransportError> {
        let base = Url::parse(&self.url)
            .map_err(|err| TransportError::protocol(format!("invalid url '{}': {err}", self.url)))?;
        let mut source =
            EventSource::new(self.http.get(base.clone())).map_err(TransportError::protocol)?;
        source.set_retry_policy(Box::new(Never));

        let post_url = match timeout(
            self.handshake_timeout,
            self.wait_for_endpoint(&mut source, &base),
        )
        .await
        {
            Ok(Ok(url)) => url,
            Ok(Err(err)) => {
                source.close();
                return Err(err);
            }
            Err(_) => {
                source.close();
                return Err(TransportError::unreachable(
                    &self.url,
                    "timed out waiting for the endpoint event",
                ));
            }
        };
        debug!(url = %self.url, post_url = %post_url, "Tool server announced message endpoint");

        let shared = Arc::new(SseShared {
            dispatcher: Dispatcher::new(self.url.clone()),
            post_url,
            http: self.http.clone(),
        });
        let reader = tokio::spawn(Arc::clone(&shared).pump(source));

        Ok(Arc::new(SseSession {
            shared,
            reader: Mutex::new(Some(reader)),
        }))
    }
}

struct SseShared {
    dispatcher: Dispatcher,
    post_url: Url,
    http: reqwest::Client,
}

impl SseShared {
    fn endpoint(&self) -> &str {
        self.dispatcher.endpoint()
    }

    async fn pump(self: Arc<Self>, mut source: EventSource) {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) if message.event == "message" => {
                    self.handle_frame(&message.data).await;
                }
                Ok(Event::Message(message)) => {
                    debug!(endpoint = %self.endpoint(), event = %message.event, "Ignoring event");
                }
                Err(err) => {
                    let err = classify(self.endpoint(), err);
                    warn!(endpoint = %self.endpoint(), %err, "Event stream failed");
                    source.close();
                    self.dispatcher.fail_all(&err.to_string());
                    return;
                }
            }
        }
        self.dispatcher.fail_all("event stream ended");
    }

    async fn handle_frame(&self, data: &str) {
        let raw: Value = match serde_json::from_str(data) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(endpoint = %self.endpoint(), %err, "Received invalid JSON from tool server");
                return;
            }
        };
        match self.dispatcher.dispatch(raw) {
            Inbound::Handled => {}
            Inbound::Reply(response) => {
                if let Err(err) = self.post(&response).await {
                    warn!(endpoint = %self.endpoint(), %err, "Failed to answer server request");
                }
            }
            Inbound::Notification { method } if method == "notifications/tools/list_changed" => {
                info!(endpoint = %self.endpoint(), "Tool server reports a changed catalog; it is refreshed on reconnect");
            }
            Inbound::Notification { method } => {
                debug!(endpoint = %self.endpoint(), method, "Notification from tool server");
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.post_url.clone())
            .json(message)
            .send()
            .await
            .map_err(|err| TransportError::broken(self.endpoint(), err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::broken(
                self.endpoint(),
                "message endpoint no longer knows this session",
            ));
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::protocol(format!(
            "message endpoint returned {status}: {body}"
        )))
    }
}

pub struct SseSession {
    shared: Arc<SseShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseSession {
    fn stop_reader(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl RpcSession for SseSession {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let pending = self.shared.dispatcher.register()?;
        let message = RpcRequest::call(pending.id(), method, params);
        self.shared.post(&message).await?;
        pending.wait().await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        if self.shared.dispatcher.is_closed() {
            return Err(TransportError::broken(self.shared.endpoint(), "session is closed"));
        }
        self.shared
            .post(&RpcRequest::notification(method, params))
            .await
    }

    fn is_open(&self) -> bool {
        !self.shared.dispatcher.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.stop_reader();
        self.shared.dispatcher.fail_all("session closed");
        Ok(())
    }
}

impl Drop for SseSession {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

/// Sorts stream failures into "not reachable yet" and "broke after opening".
fn classify(endpoint: &str, err: SseError) -> TransportError {
    match err {
        SseError::Transport(err) if err.is_connect() || err.is_timeout() => {
            TransportError::unreachable(endpoint, err)
        }
        SseError::Transport(err) => TransportError::broken(endpoint, err),
        SseError::InvalidStatusCode(status, _)
            if matches!(status.as_u16(), 502..=504) =>
        {
            TransportError::unreachable(endpoint, format!("server answered {status}"))
        }
        SseError::InvalidStatusCode(status, _) => {
            TransportError::protocol(format!("event stream returned {status}"))
        }
        SseError::StreamEnded => TransportError::broken(endpoint, "event stream ended"),
        other => TransportError::protocol(other),
    }
}
