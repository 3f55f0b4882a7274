//! MCP requests layered over a raw [`RpcSession`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::transport::{RpcSession, TransportError};
use crate::domain::types::{ContentItem, Tool, ToolArguments, ToolOutput};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages, against servers that never stop
/// handing out cursors.
const MAX_TOOL_PAGES: usize = 32;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<WireTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

impl From<WireTool> for Tool {
    fn from(wire: WireTool) -> Self {
        Tool {
            name: wire.name,
            description: wire.description.unwrap_or_default(),
            input_schema: wire
                .input_schema
                .unwrap_or_else(|| json!({"type": "object"})),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    is_error: bool,
}

/// Handshake: `initialize` followed by `notifications/initialized`.
pub async fn initialize(session: &dyn RpcSession) -> Result<InitializeResult, TransportError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {}
    });
    let raw = session.request("initialize", params).await?;
    let result: InitializeResult =
        serde_json::from_value(raw).map_err(TransportError::protocol)?;
    if let Some(version) = result.protocol_version.as_deref() {
        if version != PROTOCOL_VERSION {
            debug!(
                requested = PROTOCOL_VERSION,
                negotiated = version,
                "Tool server negotiated a different protocol version"
            );
        }
    }
    session
        .notify("notifications/initialized", json!({}))
        .await?;
    Ok(result)
}

/// Fetches the full catalog, following pagination cursors.
pub async fn list_tools(session: &dyn RpcSession) -> Result<Vec<Tool>, TransportError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_TOOL_PAGES {
        let params = match cursor.take() {
            Some(cursor) => json!({ "cursor": cursor }),
            None => json!({}),
        };
        let raw = session.request("tools/list", params).await?;
        let page: ListToolsResult =
            serde_json::from_value(raw).map_err(TransportError::protocol)?;
        tools.extend(page.tools.into_iter().map(Tool::from));
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }
    warn!(pages = MAX_TOOL_PAGES, "Tool catalog pagination did not terminate; truncating");
    Ok(tools)
}

pub async fn call_tool(
    session: &dyn RpcSession,
    name: &str,
    arguments: &ToolArguments,
) -> Result<ToolOutput, TransportError> {
    let params = json!({
        "name": name,
        "arguments": arguments,
    });
    let raw = session.request("tools/call", params).await?;
    let result: CallToolResult = serde_json::from_value(raw).map_err(TransportError::protocol)?;
    Ok(ToolOutput {
        content: result.content.into_iter().map(parse_content).collect(),
        is_error: result.is_error,
    })
}

/// Text and image items are kept as-is; anything else is rendered as its
/// JSON text so it still reaches the model.
fn parse_content(item: Value) -> ContentItem {
    match item.get("type").and_then(Value::as_str) {
        Some("text") => ContentItem::Text(
            item.get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some("image") => {
            let mime_type = item
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            let encoded = item.get("data").and_then(Value::as_str).unwrap_or_default();
            match STANDARD.decode(encoded) {
                Ok(data) => ContentItem::Image { mime_type, data },
                Err(err) => {
                    warn!(%err, mime_type, "Tool returned an undecodable image");
                    ContentItem::Text(format!("[undecodable {mime_type} image: {err}]"))
                }
            }
        }
        _ => ContentItem::Text(item.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers each method from a fixed script and records what was sent.
    struct ScriptedSession {
        pages: Mutex<Vec<Value>>,
        call_result: Value,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedSession {
        fn new(pages: Vec<Value>, call_result: Value) -> Self {
            Self {
                pages: Mutex::new(pages),
                call_result,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RpcSession for ScriptedSession {
        async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
            self.sent
                .lock()
                .expect("sent lock")
                .push((method.to_string(), params));
            match method {
                "initialize" => Ok(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {"name": "sheerwater-mcp", "version": "1.0"},
                    "instructions": "Use metrics wisely."
                })),
                "tools/list" => Ok(self.pages.lock().expect("pages lock").remove(0)),
                "tools/call" => Ok(self.call_result.clone()),
                other => Err(TransportError::Rpc {
                    code: -32601,
                    message: other.to_string(),
                }),
            }
        }

        async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
            self.sent
                .lock()
                .expect("sent lock")
                .push((method.to_string(), params));
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn initialize_sends_initialized_notification() {
        let session = ScriptedSession::new(vec![], json!({}));
        let result = initialize(&session).await.expect("initialize");
        assert_eq!(result.instructions.as_deref(), Some("Use metrics wisely."));

        let sent = session.sent.lock().expect("sent lock");
        let methods: Vec<&str> = sent.iter().map(|(method, _)| method.as_str()).collect();
        assert_eq!(methods, vec!["initialize", "notifications/initialized"]);
    }

    #[tokio::test]
    async fn list_tools_follows_cursors_and_fills_defaults() {
        let session = ScriptedSession::new(
            vec![
                json!({
                    "tools": [{"name": "list_metrics", "description": "Metrics", "inputSchema": {"type": "object", "properties": {}}}],
                    "nextCursor": "page-2"
                }),
                json!({"tools": [{"name": "render_plotly"}]}),
            ],
            json!({}),
        );

        let tools = list_tools(&session).await.expect("tools");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "list_metrics");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema, json!({"type": "object"}));

        let sent = session.sent.lock().expect("sent lock");
        assert_eq!(sent[1].1, json!({"cursor": "page-2"}));
    }

    #[tokio::test]
    async fn call_tool_decodes_text_and_images() {
        let session = ScriptedSession::new(
            vec![],
            json!({
                "content": [
                    {"type": "text", "text": "{\"mae\": 1.2}"},
                    {"type": "image", "data": "cG5n", "mimeType": "image/png"},
                    {"type": "resource", "resource": {"uri": "file:///x"}}
                ],
                "isError": false
            }),
        );

        let output = call_tool(&session, "evaluate", &ToolArguments::new())
            .await
            .expect("call");
        assert_eq!(output.content.len(), 3);
        assert_eq!(output.content[0], ContentItem::text("{\"mae\": 1.2}"));
        assert_eq!(
            output.content[1],
            ContentItem::Image {
                mime_type: "image/png".into(),
                data: b"png".to_vec()
            }
        );
        assert!(output.content[2].as_text().is_some_and(|text| text.contains("file:///x")));
    }

    #[test]
    fn undecodable_images_degrade_to_text() {
        let item = parse_content(json!({"type": "image", "data": "***", "mimeType": "image/png"}));
        assert!(item.as_text().is_some_and(|text| text.starts_with("[undecodable image/png")));
    }
}
