//! Document storage for the reel pipeline.
//!
//! Every stage coordinates through status fields on stored records. This
//! crate provides the `Store` seam, an atomic claim primitive, and two
//! backends: Firestore for deployments and an in-memory store for tests.

pub mod error;
pub mod filter;
pub mod firestore;
pub mod memory;
pub mod repository;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use filter::{lookup, Document, Filter, Patch};
pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use repository::Repository;
pub use store::Store;
