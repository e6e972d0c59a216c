//! The storage seam shared by every stage.

use async_trait::async_trait;
use reel_models::Collection;

use crate::error::StoreResult;
use crate::filter::{Document, Filter, Patch};

/// Collection-of-records storage with an atomic claim primitive.
///
/// `find` returns records in creation order. `claim_next` picks the oldest
/// record matching the filter and applies the patch in one atomic step, so
/// concurrent claimers with the same filter never receive the same record.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, collection: Collection, id: &str, doc: Document) -> StoreResult<()>;

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    /// Apply a patch to an existing record and return the updated record.
    async fn update(&self, collection: Collection, id: &str, patch: &Patch) -> StoreResult<Document>;

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>>;

    /// Delete all matching records, returning how many were removed.
    async fn delete_where(&self, collection: Collection, filter: &Filter) -> StoreResult<usize>;

    /// Atomically take the oldest matching record by applying `patch` to it.
    async fn claim_next(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>>;
}
