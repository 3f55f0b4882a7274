use async_trait::async_trait;
use std::sync::Arc;

use super::error::ToolingError;
use crate::domain::types::{Tool, ToolArguments, ToolOutput};

/// What the conversation loop needs from the tool side: the current catalog
/// and a way to execute one call.
#[async_trait]
pub trait ToolServerInterface: Send + Sync {
    fn tools(&self) -> Arc<[Tool]>;

    /// Catalog for a new exchange. Implementations may connect first; the
    /// default hands back the cached one.
    async fn catalog(&self) -> Arc<[Tool]> {
        self.tools()
    }

    async fn call(&self, tool: &str, arguments: &ToolArguments) -> Result<ToolOutput, ToolingError>;
}
