use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::domain::types::{Artifact, ConversationTurn};
use crate::infrastructure::model::{RateLimitInfo, Usage};

/// Called with the tool name and arguments before each tool call runs.
pub type ToolCallObserver = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Per-run overrides. Empty values fall back to the loop settings.
#[derive(Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub observer: Option<ToolCallObserver>,
}

impl fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOptions")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub max_rounds: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for LoopSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            max_rounds: config.max_rounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Text blocks of the final model response, concatenated.
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub artifacts: Vec<Artifact>,
    pub usage: Usage,
    pub rate_limit: Option<RateLimitInfo>,
    /// Turns the loop appended to the history it was given.
    pub turns: Vec<ConversationTurn>,
    pub rounds: usize,
}
