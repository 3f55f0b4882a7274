use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::artifacts::fold_tool_result;
use super::errors::ChatError;
use super::models::{ChatOptions, ChatOutcome, LoopSettings, ToolCallRecord};
use crate::application::tooling::{ToolServerInterface, catalog};
use crate::domain::types::{
    ContentBlock, ConversationTurn, MessageRole, ToolCallRequest, ToolCallResult,
};
use crate::infrastructure::model::{ModelClient, ModelRequest, StopReason, Usage};

/// Drives model calls and tool execution until the model stops asking for
/// tools. Holds no per-conversation state.
pub struct ConversationLoop<M: ModelClient> {
    model: Arc<M>,
    tools: Arc<dyn ToolServerInterface>,
    settings: LoopSettings,
}

impl<M: ModelClient> ConversationLoop<M> {
    pub fn new(model: Arc<M>, tools: Arc<dyn ToolServerInterface>, settings: LoopSettings) -> Self {
        Self {
            model,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Arc<dyn ToolServerInterface> {
        &self.tools
    }

    pub async fn run(
        &self,
        history: Vec<ConversationTurn>,
        options: ChatOptions,
    ) -> Result<ChatOutcome, ChatError> {
        let model = non_empty(options.model).unwrap_or_else(|| self.settings.model.clone());
        let system = non_empty(options.system_prompt)
            .unwrap_or_else(|| self.settings.system_prompt.clone());
        let history_len = history.len();

        let mut request = ModelRequest {
            model,
            max_tokens: self.settings.max_tokens,
            system,
            tools: catalog::to_model_tools(&self.tools.catalog().await),
            messages: history,
        };

        let mut usage = Usage::default();
        let mut rate_limit = None;
        let mut tool_calls = Vec::new();
        let mut artifacts = Vec::new();

        info!(
            model = request.model.as_str(),
            history = history_len,
            tools = request.tools.len(),
            "Conversation loop started"
        );

        for round in 1..=self.settings.max_rounds {
            let response = self.model.chat(&request).await?;
            usage += response.usage;
            if response.rate_limit.is_some() {
                rate_limit = response.rate_limit.clone();
            }

            let blocks: Vec<ContentBlock> = response
                .content
                .into_iter()
                .filter(|block| !matches!(block, ContentBlock::Unsupported))
                .collect();
            let calls: Vec<ToolCallRequest> =
                blocks.iter().filter_map(ContentBlock::as_tool_call).collect();

            if response.stop_reason != StopReason::ToolUse || calls.is_empty() {
                let final_turn = ConversationTurn::blocks(MessageRole::Assistant, blocks);
                let content = final_turn.text();
                request.messages.push(final_turn);
                info!(
                    rounds = round,
                    tool_calls = tool_calls.len(),
                    total_tokens = usage.total_tokens,
                    "Conversation loop finished"
                );
                return Ok(ChatOutcome {
                    content,
                    tool_calls,
                    artifacts,
                    usage,
                    rate_limit,
                    turns: request.messages.split_off(history_len),
                    rounds: round,
                });
            }

            debug!(round, calls = calls.len(), "Model requested tools");
            for call in &calls {
                let input = Value::Object(call.arguments.clone());
                if let Some(observer) = &options.observer {
                    observer(&call.tool_name, &input);
                }
                tool_calls.push(ToolCallRecord {
                    name: call.tool_name.clone(),
                    input,
                });
            }

            // Calls run concurrently; join_all keeps request order.
            let results = join_all(calls.iter().map(|call| self.execute(call))).await;
            let tool_results: Vec<ContentBlock> = results
                .into_iter()
                .map(|result| fold_tool_result(result, &mut artifacts))
                .collect();

            request
                .messages
                .push(ConversationTurn::blocks(MessageRole::Assistant, blocks));
            request
                .messages
                .push(ConversationTurn::blocks(MessageRole::User, tool_results));
        }

        warn!(rounds = self.settings.max_rounds, "Conversation loop hit the round cap");
        Err(ChatError::LoopExceeded {
            rounds: self.settings.max_rounds,
        })
    }

    async fn execute(&self, call: &ToolCallRequest) -> ToolCallResult {
        match self.tools.call(&call.tool_name, &call.arguments).await {
            Ok(output) => ToolCallResult::from_output(call.call_id.clone(), output),
            Err(err) => {
                warn!(tool = call.tool_name.as_str(), %err, "Tool call failed");
                ToolCallResult::failure(call.call_id.clone(), err)
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
