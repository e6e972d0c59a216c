//! Model validation errors.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unsupported aspect ratio: {0}, expected one of 9x16, 16x9, 1x1")]
    InvalidAspectRatio(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    #[error("Broken scene list: {0}")]
    BrokenSceneList(String),
}

impl ModelError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn broken_list(msg: impl Into<String>) -> Self {
        Self::BrokenSceneList(msg.into())
    }
}
