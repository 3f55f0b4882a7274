//! # Sheerwater Session
//!
//! Conversation persistence for the chat surface. The core only requires that
//! message history round-trips in its original role, content and order; this
//! crate provides the [`ConversationStore`] contract and an in-memory
//! implementation suitable for a single process.

mod error;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use store::{ConversationStore, DEFAULT_LIST_LIMIT};
pub use types::{Conversation, StoredMessage};
