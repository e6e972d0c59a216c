//! Error types for AI provider calls.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0} not set")]
    MissingApiKey(&'static str),

    #[error("{provider} returned {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} returned no content")]
    EmptyResponse(&'static str),

    #[error("Could not parse model output: {0}")]
    InvalidJson(String),

    #[error("All Gemini models failed: {0}")]
    AllModelsFailed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    pub fn api(provider: &'static str, status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        Self::Api {
            provider,
            status: status.as_u16(),
            message: message.into(),
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson(message.into())
    }

    /// Rate limits and server errors are worth trying on another model.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            AiError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
