//! Conversation API surface: persists history around each loop run.

use serde::{Deserialize, Serialize};
use sheerwater_session::{
    Conversation, ConversationStore, DEFAULT_LIST_LIMIT, StoreError, StoredMessage,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::chat::{
    ChatError, ChatOptions, ConversationLoop, ToolCallObserver, ToolCallRecord, strip_inline_charts,
};
use super::tooling::catalog;
use crate::constants::{SETTING_MODEL, SETTING_SYSTEM_PROMPT};
use crate::domain::types::{Artifact, ConversationTurn, MessageRole, TurnContent};
use crate::infrastructure::model::{ModelClient, RateLimitInfo, Usage};

/// Longest title derived from a first message, in characters.
const TITLE_LENGTH: usize = 50;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("conversation '{id}' not found")]
    ConversationNotFound { id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl ServiceError {
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::ConversationNotFound { .. } => {
                "That conversation does not exist or belongs to someone else.".to_string()
            }
            ServiceError::Store(err) => format!("Could not save the conversation: {err}"),
            ServiceError::Chat(err) => err.user_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessageResult {
    pub conversation_id: String,
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub artifacts: Vec<Artifact>,
    pub usage: Usage,
    pub rate_limit: Option<RateLimitInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

pub struct ChatService<M: ModelClient> {
    conversation: ConversationLoop<M>,
    store: Arc<dyn ConversationStore>,
}

impl<M: ModelClient> ChatService<M> {
    pub fn new(conversation: ConversationLoop<M>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            conversation,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<SendMessageResult, ServiceError> {
        self.send_message_observed(user_id, message, conversation_id, None)
            .await
    }

    /// Like [`send_message`](Self::send_message), reporting each tool call to
    /// `observer` as it starts.
    pub async fn send_message_observed(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<&str>,
        observer: Option<ToolCallObserver>,
    ) -> Result<SendMessageResult, ServiceError> {
        let conversation = match conversation_id {
            Some(id) => self
                .store
                .get_conversation(id, user_id)
                .await
                .ok_or_else(|| ServiceError::ConversationNotFound { id: id.to_string() })?,
            None => {
                let created = self
                    .store
                    .create_conversation(&Conversation::new_id(), user_id, None)
                    .await?;
                info!(conversation = created.id.as_str(), user = user_id, "Conversation created");
                created
            }
        };

        self.store
            .add_message(&conversation.id, MessageRole::User.as_str(), message, None)
            .await?;
        let history = to_turns(&self.store.messages(&conversation.id).await);
        let settings = self.settings().await;
        debug!(
            conversation = conversation.id.as_str(),
            turns = history.len(),
            model = settings.model.as_str(),
            "Running conversation"
        );

        let outcome = self
            .conversation
            .run(
                history,
                ChatOptions {
                    model: Some(settings.model),
                    system_prompt: Some(settings.system_prompt),
                    observer,
                },
            )
            .await?;

        let tool_log = if outcome.tool_calls.is_empty() {
            None
        } else {
            serde_json::to_value(&outcome.tool_calls).ok()
        };
        self.store
            .add_message(
                &conversation.id,
                MessageRole::Assistant.as_str(),
                &outcome.content,
                tool_log,
            )
            .await?;

        if !conversation.has_title() {
            self.store
                .update_title(&conversation.id, user_id, &derive_title(message))
                .await?;
        }

        Ok(SendMessageResult {
            conversation_id: conversation.id,
            response: outcome.content,
            tool_calls: outcome.tool_calls,
            artifacts: outcome.artifacts,
            usage: outcome.usage,
            rate_limit: outcome.rate_limit,
        })
    }

    pub fn list_tools(&self) -> Vec<ToolSummary> {
        catalog::summaries(&self.conversation.tools().tools())
            .into_iter()
            .map(|(name, description)| ToolSummary { name, description })
            .collect()
    }

    /// Effective settings: stored values, else the configured defaults.
    pub async fn settings(&self) -> ChatSettings {
        let defaults = self.conversation.settings();
        let model = self.store.get_setting(SETTING_MODEL).await;
        let system_prompt = self.store.get_setting(SETTING_SYSTEM_PROMPT).await;
        ChatSettings {
            model: non_empty(model).unwrap_or_else(|| defaults.model.clone()),
            system_prompt: non_empty(system_prompt)
                .unwrap_or_else(|| defaults.system_prompt.clone()),
        }
    }

    pub async fn update_settings(
        &self,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> ChatSettings {
        if let Some(model) = model {
            self.store.set_setting(SETTING_MODEL, model).await;
            info!(model, "Model setting updated");
        }
        if let Some(prompt) = system_prompt {
            self.store.set_setting(SETTING_SYSTEM_PROMPT, prompt).await;
            info!(length = prompt.len(), "System prompt updated");
        }
        self.settings().await
    }

    pub async fn list_conversations(&self, user_id: &str) -> Vec<Conversation> {
        self.store
            .list_conversations(user_id, DEFAULT_LIST_LIMIT)
            .await
    }

    pub async fn conversation_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, ServiceError> {
        if self
            .store
            .get_conversation(conversation_id, user_id)
            .await
            .is_none()
        {
            return Err(ServiceError::ConversationNotFound {
                id: conversation_id.to_string(),
            });
        }
        Ok(self.store.messages(conversation_id).await)
    }

    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) {
        self.store
            .delete_conversation(conversation_id, user_id)
            .await;
        info!(conversation = conversation_id, user = user_id, "Conversation deleted");
    }
}

fn to_turns(messages: &[StoredMessage]) -> Vec<ConversationTurn> {
    messages
        .iter()
        .filter_map(|message| {
            let Some(role) = MessageRole::from_str(&message.role) else {
                warn!(id = message.id, role = message.role.as_str(), "Skipping stored message");
                return None;
            };
            let content = strip_inline_charts(&message.content);
            // The Messages API rejects empty turns.
            if content.trim().is_empty() {
                debug!(id = message.id, role = message.role.as_str(), "Skipping empty stored message");
                return None;
            }
            Some(ConversationTurn {
                role,
                content: TurnContent::Text(content),
            })
        })
        .collect()
}

fn derive_title(message: &str) -> String {
    let mut title: String = message.chars().take(TITLE_LENGTH).collect();
    if message.chars().count() > TITLE_LENGTH {
        title.push_str("...");
    }
    title
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::chat::LoopSettings;
    use crate::application::tooling::{ToolServerInterface, ToolingError};
    use crate::domain::types::{ContentBlock, Tool, ToolArguments, ToolOutput};
    use crate::infrastructure::model::{ModelError, ModelRequest, ModelResponse, StopReason};
    use async_trait::async_trait;
    use serde_json::json;
    use sheerwater_session::InMemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        script: Mutex<VecDeque<ModelResponse>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<ModelResponse>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            self.requests.lock().expect("lock").push(request.clone());
            self.script
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| ModelError::invalid_response("script exhausted"))
        }
    }

    struct EchoTools;

    #[async_trait]
    impl ToolServerInterface for EchoTools {
        fn tools(&self) -> Arc<[Tool]> {
            Arc::from(vec![Tool {
                name: "list_metrics".into(),
                description: "Lists evaluation metrics".into(),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn call(
            &self,
            _tool: &str,
            _arguments: &ToolArguments,
        ) -> Result<ToolOutput, ToolingError> {
            Ok(ToolOutput::text("mae, rmse"))
        }
    }

    fn reply(text: &str) -> ModelResponse {
        ModelResponse {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::text(text)],
            usage: Usage::new(10, 2),
            rate_limit: None,
        }
    }

    fn service(model: Arc<ScriptedModel>) -> ChatService<ScriptedModel> {
        let conversation = ConversationLoop::new(model, Arc::new(EchoTools), LoopSettings::default());
        ChatService::new(conversation, Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn new_conversation_is_created_titled_and_persisted() {
        let model = ScriptedModel::new(vec![reply("Hello!")]);
        let service = service(model);

        let result = service
            .send_message("alice", "hi there", None)
            .await
            .expect("result");
        assert_eq!(result.response, "Hello!");

        let conversations = service.list_conversations("alice").await;
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, result.conversation_id);
        assert_eq!(conversations[0].title.as_deref(), Some("hi there"));

        let messages = service
            .conversation_messages("alice", &result.conversation_id)
            .await
            .expect("messages");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
        assert_eq!(messages[1].tool_calls, None);
    }

    #[tokio::test]
    async fn follow_up_sends_full_history_without_inline_charts() {
        let model = ScriptedModel::new(vec![
            reply("Chart: ![Chart](data:image/png;base64,AAAA)\nDone."),
            reply("Sure."),
        ]);
        let service = service(Arc::clone(&model));

        let first = service
            .send_message("alice", "plot it", None)
            .await
            .expect("first");
        service
            .send_message("alice", "thanks", Some(&first.conversation_id))
            .await
            .expect("second");

        let second_request = &model.requests()[1];
        assert_eq!(second_request.messages.len(), 3);
        assert_eq!(
            second_request.messages[1].content,
            TurnContent::Text("Chart: Done.".into())
        );
        assert_eq!(second_request.messages[2], ConversationTurn::user("thanks"));
    }

    #[tokio::test]
    async fn empty_reply_is_not_replayed() {
        let model = ScriptedModel::new(vec![
            ModelResponse {
                stop_reason: StopReason::EndTurn,
                content: Vec::new(),
                usage: Usage::new(10, 0),
                rate_limit: None,
            },
            reply("Here it is."),
        ]);
        let service = service(Arc::clone(&model));

        let first = service
            .send_message("alice", "plot it", None)
            .await
            .expect("first");
        assert_eq!(first.response, "");
        service
            .send_message("alice", "hello?", Some(&first.conversation_id))
            .await
            .expect("second");

        let second_request = &model.requests()[1];
        assert_eq!(
            second_request.messages,
            vec![
                ConversationTurn::user("plot it"),
                ConversationTurn::user("hello?")
            ]
        );
    }

    #[tokio::test]
    async fn unknown_or_foreign_conversation_is_not_found() {
        let model = ScriptedModel::new(vec![reply("Hello!")]);
        let service = service(Arc::clone(&model));
        let owned = service
            .send_message("alice", "hi", None)
            .await
            .expect("result");

        let err = service
            .send_message("bob", "hi", Some(&owned.conversation_id))
            .await
            .expect_err("foreign");
        assert!(matches!(err, ServiceError::ConversationNotFound { .. }));
        assert!(matches!(
            service.send_message("alice", "hi", Some("missing")).await,
            Err(ServiceError::ConversationNotFound { .. })
        ));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn stored_settings_override_defaults() {
        let model = ScriptedModel::new(vec![reply("ok")]);
        let service = service(Arc::clone(&model));

        let defaults = service.settings().await;
        assert_eq!(defaults.model, LoopSettings::default().model);

        let updated = service
            .update_settings(Some("claude-3-5-haiku-latest"), None)
            .await;
        assert_eq!(updated.model, "claude-3-5-haiku-latest");
        assert_eq!(updated.system_prompt, defaults.system_prompt);

        service
            .send_message("alice", "hi", None)
            .await
            .expect("result");
        assert_eq!(model.requests()[0].model, "claude-3-5-haiku-latest");
    }

    #[tokio::test]
    async fn tool_calls_are_logged_with_the_reply() {
        let model = ScriptedModel::new(vec![
            ModelResponse {
                stop_reason: StopReason::ToolUse,
                content: vec![ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "list_metrics".into(),
                    input: json!({}),
                }],
                usage: Usage::new(5, 5),
                rate_limit: None,
            },
            reply("MAE and RMSE."),
        ]);
        let service = service(model);

        let result = service
            .send_message("alice", "which metrics?", None)
            .await
            .expect("result");
        assert_eq!(result.usage, Usage::new(15, 7));

        let messages = service
            .conversation_messages("alice", &result.conversation_id)
            .await
            .expect("messages");
        assert_eq!(
            messages[1].tool_calls,
            Some(json!([{"name": "list_metrics", "input": {}}]))
        );
    }

    #[tokio::test]
    async fn delete_removes_only_owned_conversations() {
        let model = ScriptedModel::new(vec![reply("a")]);
        let service = service(model);
        let result = service
            .send_message("alice", "hi", None)
            .await
            .expect("result");

        service
            .delete_conversation("bob", &result.conversation_id)
            .await;
        assert_eq!(service.list_conversations("alice").await.len(), 1);

        service
            .delete_conversation("alice", &result.conversation_id)
            .await;
        assert!(service.list_conversations("alice").await.is_empty());
    }

    #[test]
    fn titles_are_truncated_on_characters() {
        assert_eq!(derive_title("short"), "short");
        let long = "é".repeat(60);
        assert_eq!(derive_title(&long), format!("{}...", "é".repeat(50)));
        assert_eq!(derive_title(&"x".repeat(50)), "x".repeat(50));
    }

    #[test]
    fn tool_list_uses_catalog() {
        let service = service(ScriptedModel::new(Vec::new()));
        assert_eq!(
            service.list_tools(),
            vec![ToolSummary {
                name: "list_metrics".into(),
                description: "Lists evaluation metrics".into(),
            }]
        );
    }
}
