use crate::infrastructure::model::ModelError;
use thiserror::Error;

/// Tool failures never show up here; they are folded into tool results.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model kept requesting tools after {rounds} rounds")]
    LoopExceeded { rounds: usize },
}

impl ChatError {
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Model(err) => err.user_message(),
            ChatError::LoopExceeded { rounds } => format!(
                "The assistant used tools for {rounds} rounds without finishing. Try a narrower question."
            ),
        }
    }
}
