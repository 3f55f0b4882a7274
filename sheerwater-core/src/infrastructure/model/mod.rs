//! Model infrastructure module
//!
//! # Structure
//! - `types` - Request, Response, Error types
//! - `traits` - the `ModelClient` seam used by the conversation loop
//! - `anthropic` - Messages API client

pub mod anthropic;
pub mod traits;
pub mod types;

pub use anthropic::AnthropicClient;
pub use traits::ModelClient;
pub use types::{
    ModelError, ModelRequest, ModelResponse, ModelTool, RateLimitInfo, StopReason, Usage,
};
