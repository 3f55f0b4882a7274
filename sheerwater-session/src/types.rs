use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            title,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fresh random identifier for a conversation that has none yet.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn has_title(&self) -> bool {
        self.title
            .as_deref()
            .map(|title| !title.trim().is_empty())
            .unwrap_or(false)
    }
}

/// One persisted message. `role` is kept as the raw wire string
/// (`user` / `assistant`) so the store stays independent of the chat core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    pub created_at: DateTime<Utc>,
}
