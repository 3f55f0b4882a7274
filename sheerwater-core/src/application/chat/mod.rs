//! # Chat Module
//!
//! The tool-use conversation loop:
//! 1. Send the history and tool catalog to the model
//! 2. Stop when the model no longer asks for tools
//! 3. Otherwise run the requested tools, divert charts to artifacts, and
//!    append the tool results
//! 4. Repeat up to the round cap

pub mod artifacts;
mod errors;
mod models;
mod runner;

pub use artifacts::{CHART_PLACEHOLDER, extract_chart_url, strip_inline_charts};
pub use errors::ChatError;
pub use models::{ChatOptions, ChatOutcome, LoopSettings, ToolCallObserver, ToolCallRecord};
pub use runner::ConversationLoop;
