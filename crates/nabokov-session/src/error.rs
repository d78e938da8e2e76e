//! Error types for the nabokov-session crate.

use nabokov_provider::ProviderError;

/// Errors from the card store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Card not found
    #[error("Card not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced to the code that started a generation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Request rejected before anything was written
    #[error("{0}")]
    Validation(ProviderError),

    /// Generation failed after the skeleton was written. The card already
    /// holds a readable failure message.
    #[error("Failed to generate: {source}")]
    Generation {
        card_id: String,
        source: ProviderError,
    },

    /// Feature precondition not met
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session task panicked or was aborted
    #[error("generation task failed: {0}")]
    Join(String),
}

impl SessionError {
    /// Underlying provider error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            SessionError::Validation(err) | SessionError::Generation { source: err, .. } => {
                Some(err)
            }
            _ => None,
        }
    }
}
