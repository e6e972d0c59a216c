//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// An upstream record has not reached the status this work needs yet.
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] reel_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("AI error: {0}")]
    Ai(#[from] reel_ai::AiError),

    #[error("Model error: {0}")]
    Model(#[from] reel_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionNotMet(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Referenced record is absent. The stage loop fails these outright
    /// instead of requeueing.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkerError::NotFound(_) => true,
            WorkerError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, WorkerError::PreconditionNotMet(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_store::StoreError;

    #[test]
    fn test_classification() {
        assert!(WorkerError::not_found("video v1").is_not_found());
        assert!(WorkerError::from(StoreError::not_found("videos", "v1")).is_not_found());
        assert!(WorkerError::precondition("not pending").is_precondition());
        assert!(!WorkerError::processing_failed("boom").is_not_found());
    }
}
