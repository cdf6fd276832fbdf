//! Error types for the triage conversation.

/// Errors from the conversation core and the commands driving it.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("still waiting for the assistant to reply")]
    Busy,
    #[error("the assessment is already complete")]
    AssessmentComplete,
    #[error("no assessment is available yet")]
    NotReady,
    #[error("received a model response while none was pending")]
    UnexpectedResponse,
    #[error("conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Storage(format!("{:#}", err))
    }
}
