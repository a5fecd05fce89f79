use amaplayer_core::ClassifiedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    /// Terminal failure: a non-retryable error, or the retry budget ran out.
    #[error("{error} (after {attempts} attempt(s))")]
    Failed {
        error: ClassifiedError,
        attempts: u32,
    },

    /// A newer request for the same key replaced this one.
    #[error("request for '{key}' was superseded by a newer one")]
    Superseded { key: String },

    #[error("no tokio runtime: the store must be created inside a runtime")]
    NoRuntime,
}

impl ActionError {
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            ActionError::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The text shown to the user next to a rolled-back entity.
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Failed { error, .. } => error.message.clone(),
            other => other.to_string(),
        }
    }
}
