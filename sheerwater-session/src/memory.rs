use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::store::ConversationStore;
use crate::types::{Conversation, StoredMessage};

/// Process-local [`ConversationStore`]. Everything is lost on drop.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<StoredMessage>>,
    settings: BTreeMap<String, String>,
    // Timestamps can collide, so recency is ordered by a counter instead.
    recency: HashMap<String, u64>,
    clock: u64,
    next_message_id: u64,
}

impl StoreState {
    fn touch(&mut self, id: &str) {
        self.clock += 1;
        self.recency.insert(id.to_string(), self.clock);
        if let Some(conversation) = self.conversations.get_mut(id) {
            conversation.updated_at = Utc::now();
        }
    }

    fn owned(&self, id: &str, user_id: &str) -> Option<&Conversation> {
        self.conversations
            .get(id)
            .filter(|conversation| conversation.user_id == user_id)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(
        &self,
        id: &str,
        user_id: &str,
        title: Option<String>,
    ) -> Result<Conversation, StoreError> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(id) {
            return Err(StoreError::DuplicateConversation { id: id.to_string() });
        }
        let conversation = Conversation::new(id, user_id, title);
        state
            .conversations
            .insert(id.to_string(), conversation.clone());
        state.messages.insert(id.to_string(), Vec::new());
        state.touch(id);
        debug!(conversation_id = id, user_id, "Created conversation");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str, user_id: &str) -> Option<Conversation> {
        self.state.read().await.owned(id, user_id).cloned()
    }

    async fn list_conversations(&self, user_id: &str, limit: usize) -> Vec<Conversation> {
        let state = self.state.read().await;
        let mut owned: Vec<(&Conversation, u64)> = state
            .conversations
            .values()
            .filter(|conversation| conversation.user_id == user_id)
            .map(|conversation| {
                let rank = state.recency.get(&conversation.id).copied().unwrap_or(0);
                (conversation, rank)
            })
            .collect();
        owned.sort_by(|a, b| b.1.cmp(&a.1));
        owned
            .into_iter()
            .take(limit)
            .map(|(conversation, _)| conversation.clone())
            .collect()
    }

    async fn update_title(&self, id: &str, user_id: &str, title: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.owned(id, user_id).is_none() {
            return Err(StoreError::not_found(id));
        }
        if let Some(conversation) = state.conversations.get_mut(id) {
            conversation.title = Some(title.to_string());
        }
        state.touch(id);
        Ok(())
    }

    async fn delete_conversation(&self, id: &str, user_id: &str) {
        let mut state = self.state.write().await;
        if state.owned(id, user_id).is_none() {
            return;
        }
        state.conversations.remove(id);
        state.messages.remove(id);
        state.recency.remove(id);
        debug!(conversation_id = id, user_id, "Deleted conversation");
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        tool_calls: Option<Value>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(conversation_id) {
            return Err(StoreError::not_found(conversation_id));
        }
        state.next_message_id += 1;
        let id = state.next_message_id;
        let message = StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            tool_calls,
            created_at: Utc::now(),
        };
        state
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
        state.touch(conversation_id);
        Ok(id)
    }

    async fn messages(&self, conversation_id: &str) -> Vec<StoredMessage> {
        self.state
            .read()
            .await
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn get_setting(&self, key: &str) -> Option<String> {
        self.state.read().await.settings.get(key).cloned()
    }

    async fn set_setting(&self, key: &str, value: &str) {
        self.state
            .write()
            .await
            .settings
            .insert(key.to_string(), value.to_string());
    }

    async fn settings(&self) -> BTreeMap<String, String> {
        self.state.read().await.settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn messages_round_trip_in_order() {
        let store = InMemoryStore::new();
        store
            .create_conversation("c1", "alice", None)
            .await
            .expect("create");
        store
            .add_message("c1", "user", "hello", None)
            .await
            .expect("user message");
        store
            .add_message(
                "c1",
                "assistant",
                "hi there",
                Some(json!([{"name": "list_models", "input": {}}])),
            )
            .await
            .expect("assistant message");

        let messages = store.messages("c1").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].role, "assistant");
        assert!(messages[1].tool_calls.is_some());
        assert!(messages[0].id < messages[1].id);
    }

    #[tokio::test]
    async fn conversations_are_scoped_to_their_owner() {
        let store = InMemoryStore::new();
        store
            .create_conversation("c1", "alice", None)
            .await
            .expect("create");

        assert!(store.get_conversation("c1", "alice").await.is_some());
        assert!(store.get_conversation("c1", "bob").await.is_none());
        assert_eq!(
            store.update_title("c1", "bob", "stolen").await,
            Err(StoreError::not_found("c1"))
        );

        store.delete_conversation("c1", "bob").await;
        assert!(store.get_conversation("c1", "alice").await.is_some());

        store.delete_conversation("c1", "alice").await;
        assert!(store.get_conversation("c1", "alice").await.is_none());
        assert!(store.messages("c1").await.is_empty());
    }

    #[tokio::test]
    async fn list_orders_by_most_recent_activity() {
        let store = InMemoryStore::new();
        for id in ["a", "b", "c"] {
            store
                .create_conversation(id, "alice", None)
                .await
                .expect("create");
        }
        store
            .add_message("a", "user", "bump", None)
            .await
            .expect("message");

        let ids: Vec<String> = store
            .list_conversations("alice", 10)
            .await
            .into_iter()
            .map(|conversation| conversation.id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        assert_eq!(store.list_conversations("alice", 2).await.len(), 2);
        assert!(store.list_conversations("bob", 10).await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryStore::new();
        store
            .create_conversation("c1", "alice", None)
            .await
            .expect("create");
        let err = store
            .create_conversation("c1", "alice", None)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::DuplicateConversation { .. }));
    }

    #[tokio::test]
    async fn settings_upsert() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_setting("model").await, None);
        store.set_setting("model", "a").await;
        store.set_setting("model", "b").await;
        assert_eq!(store.get_setting("model").await.as_deref(), Some("b"));
        assert_eq!(store.settings().await.len(), 1);
    }
}
