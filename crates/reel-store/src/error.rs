//! Store error types.

use reel_firestore::FirestoreError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Record already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    #[error("Concurrent modification of {0}, gave up after retries")]
    Conflict(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: impl ToString, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.into(),
        }
    }

    pub fn already_exists(collection: impl ToString, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            collection: collection.to_string(),
            id: id.into(),
        }
    }

    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
