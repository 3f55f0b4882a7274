use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{Conversation, StoredMessage};

/// Default page size for [`ConversationStore::list_conversations`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Keyed record store for conversations, their messages and runtime settings.
///
/// Lookups that take a `user_id` are scoped to that owner: a conversation that
/// exists but belongs to someone else behaves exactly like a missing one.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        id: &str,
        user_id: &str,
        title: Option<String>,
    ) -> Result<Conversation, StoreError>;

    async fn get_conversation(&self, id: &str, user_id: &str) -> Option<Conversation>;

    /// Most recently updated first.
    async fn list_conversations(&self, user_id: &str, limit: usize) -> Vec<Conversation>;

    async fn update_title(&self, id: &str, user_id: &str, title: &str) -> Result<(), StoreError>;

    /// Removes the conversation and all of its messages. Deleting a
    /// conversation the user does not own is a no-op.
    async fn delete_conversation(&self, id: &str, user_id: &str);

    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        tool_calls: Option<Value>,
    ) -> Result<u64, StoreError>;

    /// Messages in insertion order.
    async fn messages(&self, conversation_id: &str) -> Vec<StoredMessage>;

    async fn get_setting(&self, key: &str) -> Option<String>;

    async fn set_setting(&self, key: &str, value: &str);

    async fn settings(&self) -> BTreeMap<String, String>;
}
