//! Firestore REST API client.
//!
//! This crate provides:
//! - Service account authentication via gcp_auth, or an emulator
//! - Document CRUD with optimistic `updateTime` preconditions
//! - Structured queries and batch writes
//! - JSON <-> Firestore value conversion
//! - Retry with backoff for transient failures

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use types::{
    fields_from_json, fields_to_json, Document, FieldOperator, QueryFilter, StructuredQuery,
    Value, Write,
};
