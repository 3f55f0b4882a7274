//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::traits::ModelClient;
use super::types::{ModelError, ModelRequest, ModelResponse, RateLimitInfo, StopReason, Usage};
use crate::config::ModelConfig;
use crate::constants::ANTHROPIC_VERSION;
use crate::domain::types::ContentBlock;

const MESSAGES_PATH: &str = "/v1/messages";

#[derive(Clone)]
pub struct AnthropicClient {
    endpoint: String,
    api_key: Option<String>,
    http: Client,
}

impl AnthropicClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            http: Client::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key.clone())
    }

    fn messages_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        format!("{base}{MESSAGES_PATH}")
    }

    fn require_api_key(&self) -> Result<&str, ModelError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ModelError::MissingApiKey)
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct WireErrorBody {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn or_unknown(value: &Option<impl ToString>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn id(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let api_key = self.require_api_key()?;

        info!(
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending request to Anthropic"
        );

        let response = self
            .http
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                error!(%err, "Anthropic API connection failed");
                ModelError::connection_failed(err)
            })?;

        let status = response.status();
        let rate_limit = RateLimitInfo::from_headers(response.headers());

        if status == StatusCode::TOO_MANY_REQUESTS {
            let info = rate_limit.unwrap_or_default();
            error!(
                input_tokens_limit = %or_unknown(&info.input_tokens_limit),
                input_tokens_remaining = %or_unknown(&info.input_tokens_remaining),
                input_tokens_reset = %or_unknown(&info.input_tokens_reset),
                retry_after = %or_unknown(&info.retry_after),
                "Rate limit exceeded"
            );
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::RateLimited {
                info,
                message: error_message(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(ModelError::connection_failed)?;

        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: WireResponse =
            serde_json::from_str(&body).map_err(ModelError::invalid_response)?;
        let usage = parsed
            .usage
            .map(|usage| Usage::new(usage.input_tokens, usage.output_tokens))
            .unwrap_or_default();
        debug!(
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("none"),
            blocks = parsed.content.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received response from Anthropic"
        );

        Ok(ModelResponse {
            stop_reason: StopReason::from_wire(parsed.stop_reason.as_deref()),
            content: parsed.content,
            usage,
            rate_limit,
        })
    }
}
