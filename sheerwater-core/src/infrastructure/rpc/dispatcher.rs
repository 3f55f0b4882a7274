use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::transport::TransportError;
use super::types::{InboundMessage, RpcResponse};

type Responder = oneshot::Sender<Result<Value, TransportError>>;

/// Correlates outgoing request ids with inbound responses for one session.
pub(crate) struct Dispatcher {
    endpoint: String,
    pending: Mutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
    closed: AtomicBool,
}

/// What the transport must do with an inbound frame after dispatch.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Delivered to a waiting request, or safely dropped.
    Handled,
    /// The server expects this reply to be written back.
    Reply(RpcResponse),
    Notification { method: String },
}

impl Dispatcher {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            pending: Mutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn register(&self) -> Result<PendingRequest<'_>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::broken(&self.endpoint, "session is closed"));
        }
        let id = format!("req-{}", self.id_counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id.clone(), tx);
        Ok(PendingRequest {
            id,
            rx,
            dispatcher: self,
        })
    }

    pub(crate) fn dispatch(&self, raw: Value) -> Inbound {
        let message: InboundMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(endpoint = %self.endpoint, %err, "Dropping malformed JSON-RPC frame");
                return Inbound::Handled;
            }
        };

        match (message.id, message.method) {
            (Some(id), Some(method)) => Inbound::Reply(Self::answer_server_request(id, &method)),
            (Some(id), None) => {
                self.resolve(&id, message.result, message.error.map(|e| (e.code, e.message)));
                Inbound::Handled
            }
            (None, Some(method)) => Inbound::Notification { method },
            (None, None) => Inbound::Handled,
        }
    }

    /// Fails every waiting request and refuses new ones.
    pub(crate) fn fail_all(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Responder> = self.lock_pending().drain().map(|(_, tx)| tx).collect();
        if !drained.is_empty() {
            debug!(endpoint = %self.endpoint, pending = drained.len(), reason, "Failing pending requests");
        }
        for responder in drained {
            let _ = responder.send(Err(TransportError::broken(&self.endpoint, reason)));
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn resolve(&self, id: &Value, result: Option<Value>, error: Option<(i64, String)>) {
        let key = match id {
            Value::String(value) => value.clone(),
            Value::Number(number) => number.to_string(),
            _ => return,
        };
        let responder = self.lock_pending().remove(&key);
        match responder {
            Some(sender) => {
                let outcome = match error {
                    Some((code, message)) => Err(TransportError::Rpc { code, message }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = sender.send(outcome);
            }
            None => {
                debug!(endpoint = %self.endpoint, response_id = key, "Response for unknown or abandoned request");
            }
        }
    }

    fn answer_server_request(id: Value, method: &str) -> RpcResponse {
        match method {
            "ping" => RpcResponse::success(Some(id), json!({})),
            other => RpcResponse::method_not_found(Some(id), other),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Responder>> {
        // A poisoned map only means another task panicked mid-insert; the
        // entries themselves are still usable.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A registered request awaiting its response. Dropping it before the
/// response arrives (cancellation) removes it from the pending map.
pub(crate) struct PendingRequest<'a> {
    id: String,
    rx: oneshot::Receiver<Result<Value, TransportError>>,
    dispatcher: &'a Dispatcher,
}

impl PendingRequest<'_> {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) async fn wait(mut self) -> Result<Value, TransportError> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::broken(
                self.dispatcher.endpoint(),
                "request abandoned by transport",
            )),
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.dispatcher.lock_pending().remove(&self.id);
    }
}
