//! # Sheerwater Core
//!
//! Chat core for the Sheerwater forecast-evaluation assistant: a resilient
//! connection to one MCP tool server, a tool-use conversation loop against the
//! Anthropic Messages API, and the conversation service that persists history
//! around it.

pub mod application;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{chat, service, tooling};
pub use config::{AppConfig, ConfigError};
pub use domain::types;
pub use infrastructure::{model, rpc};
