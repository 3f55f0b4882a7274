//! Model types - Request, Response, and Error types

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::AddAssign;
use thiserror::Error;

use crate::domain::types::{ContentBlock, ConversationTurn};

/// A tool in the model's calling convention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One Messages API request. Serializes to the wire body as-is.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ModelTool>,
    pub messages: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    ToolUse,
    EndTurn,
    Other(String),
}

impl StopReason {
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("tool_use") => StopReason::ToolUse,
            Some("end_turn") => StopReason::EndTurn,
            Some(other) => StopReason::Other(other.to_string()),
            None => StopReason::Other(String::new()),
        }
    }
}

/// Token accounting, summed across rounds by the conversation loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        *self = Usage::new(
            self.input_tokens + other.input_tokens,
            self.output_tokens + other.output_tokens,
        );
    }
}

/// Input-token rate-limit headers of the last model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub input_tokens_limit: Option<u64>,
    pub input_tokens_remaining: Option<u64>,
    pub input_tokens_reset: Option<String>,
    /// Seconds, from `retry-after`. Only present on 429 responses.
    pub retry_after: Option<u64>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        };
        let number = |name: &str| text(name).and_then(|value| value.parse::<u64>().ok());

        let info = Self {
            input_tokens_limit: number("anthropic-ratelimit-input-tokens-limit"),
            input_tokens_remaining: number("anthropic-ratelimit-input-tokens-remaining"),
            input_tokens_reset: text("anthropic-ratelimit-input-tokens-reset"),
            retry_after: number("retry-after"),
        };
        (info != Self::default()).then_some(info)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    pub rate_limit: Option<RateLimitInfo>,
}

/// Model errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("model API rate limit exceeded: {message}")]
    RateLimited { info: RateLimitInfo, message: String },
    #[error("could not reach the model API: {message}")]
    ConnectionFailed { message: String },
    #[error("model API key is not configured (set ANTHROPIC_API_KEY)")]
    MissingApiKey,
    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model API returned an invalid response: {reason}")]
    InvalidResponse { reason: String },
}

impl ModelError {
    pub fn connection_failed(message: impl ToString) -> Self {
        Self::ConnectionFailed {
            message: message.to_string(),
        }
    }

    pub fn invalid_response(reason: impl ToString) -> Self {
        Self::InvalidResponse {
            reason: reason.to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ModelError::RateLimited { info, .. } => match info.retry_after {
                Some(seconds) => {
                    format!("The model is rate limited. Try again in {seconds} seconds.")
                }
                None => "The model is rate limited. Try again shortly.".to_string(),
            },
            ModelError::ConnectionFailed { .. } => {
                "Could not connect to the model service. Check your network.".to_string()
            }
            ModelError::MissingApiKey => {
                "No Anthropic API key configured. Set ANTHROPIC_API_KEY.".to_string()
            }
            ModelError::Api { status, .. } => {
                format!("The model service rejected the request ({status}).")
            }
            ModelError::InvalidResponse { .. } => {
                "The model service sent a response that could not be read.".to_string()
            }
        }
    }
}
