//! In-process connector and session fakes for connection-level tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::infrastructure::rpc::{Connector, RpcSession, TransportError};

pub(crate) type CallScript = Arc<Mutex<VecDeque<Result<Value, TransportError>>>>;

pub(crate) fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

pub(crate) struct FakeSession {
    tools: Vec<Value>,
    script: CallScript,
    open: AtomicBool,
    pub(crate) calls: Mutex<Vec<Value>>,
}

impl FakeSession {
    pub(crate) fn break_stream(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RpcSession for FakeSession {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::broken("fake", "stream closed"));
        }
        match method {
            "initialize" => Ok(json!({"protocolVersion": "2024-11-05", "instructions": "fake server"})),
            "tools/list" => Ok(json!({"tools": self.tools})),
            "tools/call" => {
                self.calls.lock().expect("calls lock").push(params.clone());
                let scripted = self.script.lock().expect("script lock").pop_front();
                let name = params["name"].as_str().unwrap_or_default().to_string();
                match scripted {
                    Some(Err(err)) => {
                        if err.is_transient() {
                            self.break_stream();
                        }
                        Err(err)
                    }
                    Some(Ok(value)) => Ok(value),
                    None => Ok(text_result(&format!("{name} ok"))),
                }
            }
            other => Err(TransportError::Rpc {
                code: -32601,
                message: other.to_string(),
            }),
        }
    }

    async fn notify(&self, _method: &str, _params: Value) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails `open` with each queued error in turn, then hands out healthy
/// sessions advertising `tools`.
pub(crate) struct FakeConnector {
    failures: Mutex<VecDeque<TransportError>>,
    always_fail: Option<TransportError>,
    tools: Vec<Value>,
    pub(crate) script: CallScript,
    pub(crate) opened_at: Mutex<Vec<Instant>>,
    pub(crate) sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeConnector {
    pub(crate) fn healthy(tool_names: &[&str]) -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            always_fail: None,
            tools: tool_names
                .iter()
                .map(|name| json!({"name": name, "description": format!("{name} tool"), "inputSchema": {"type": "object"}}))
                .collect(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            opened_at: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_first(tool_names: &[&str], failures: Vec<TransportError>) -> Self {
        let connector = Self::healthy(tool_names);
        *connector.failures.lock().expect("failures lock") = failures.into();
        connector
    }

    pub(crate) fn always(err: TransportError) -> Self {
        Self {
            always_fail: Some(err),
            ..Self::healthy(&[])
        }
    }

    pub(crate) fn fail_next_opens(&self, failures: Vec<TransportError>) {
        self.failures.lock().expect("failures lock").extend(failures);
    }

    pub(crate) fn script_calls(&self, outcomes: Vec<Result<Value, TransportError>>) {
        self.script.lock().expect("script lock").extend(outcomes);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opened_at.lock().expect("opened lock").len()
    }

    pub(crate) fn last_session(&self) -> Arc<FakeSession> {
        self.sessions
            .lock()
            .expect("sessions lock")
            .last()
            .cloned()
            .expect("a session was opened")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn endpoint(&self) -> &str {
        "fake://tools"
    }

    async fn open(&self) -> Result<Arc<dyn RpcSession>, TransportError> {
        self.opened_at.lock().expect("opened lock").push(Instant::now());
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        if let Some(err) = self.failures.lock().expect("failures lock").pop_front() {
            return Err(err);
        }
        let session = Arc::new(FakeSession {
            tools: self.tools.clone(),
            script: Arc::clone(&self.script),
            open: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        });
        self.sessions
            .lock()
            .expect("sessions lock")
            .push(Arc::clone(&session));
        Ok(session)
    }
}
