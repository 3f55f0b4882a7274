//! Model traits

use super::types::{ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;

/// A remote language model reachable through the Messages API shape.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn id(&self) -> &str;

    async fn chat(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;
}
