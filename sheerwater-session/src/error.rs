use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation '{id}' not found")]
    ConversationNotFound { id: String },
    #[error("conversation '{id}' already exists")]
    DuplicateConversation { id: String },
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::ConversationNotFound { id: id.into() }
    }
}
