//! Typed access to the store.

use std::sync::Arc;

use reel_models::Entity;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::filter::{lookup, Document, Filter, Patch};
use crate::store::Store;

/// Serializes entities to records and back.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn Store>,
}

impl Repository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn to_doc<E: Entity>(entity: &E) -> StoreResult<Document> {
        match serde_json::to_value(entity)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::invalid_document(format!(
                "{} did not serialize to an object: {}",
                E::COLLECTION,
                other
            ))),
        }
    }

    fn from_doc<E: Entity>(doc: Document) -> StoreResult<E> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    pub async fn insert<E: Entity>(&self, entity: &E) -> StoreResult<()> {
        self.store
            .insert(E::COLLECTION, entity.id_str(), Self::to_doc(entity)?)
            .await
    }

    pub async fn get<E: Entity>(&self, id: &str) -> StoreResult<Option<E>> {
        self.store
            .get(E::COLLECTION, id)
            .await?
            .map(Self::from_doc)
            .transpose()
    }

    /// Like `get`, but a missing record is an error.
    pub async fn require<E: Entity>(&self, id: &str) -> StoreResult<E> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(E::COLLECTION, id))
    }

    pub async fn find<E: Entity>(&self, filter: &Filter, limit: Option<usize>) -> StoreResult<Vec<E>> {
        self.store
            .find(E::COLLECTION, filter, limit)
            .await?
            .into_iter()
            .map(Self::from_doc)
            .collect()
    }

    pub async fn update<E: Entity>(&self, id: &str, patch: &Patch) -> StoreResult<E> {
        Self::from_doc(self.store.update(E::COLLECTION, id, patch).await?)
    }

    pub async fn claim_next<E: Entity>(&self, filter: &Filter, patch: &Patch) -> StoreResult<Option<E>> {
        self.store
            .claim_next(E::COLLECTION, filter, patch)
            .await?
            .map(Self::from_doc)
            .transpose()
    }

    pub async fn delete_where<E: Entity>(&self, filter: &Filter) -> StoreResult<usize> {
        self.store.delete_where(E::COLLECTION, filter).await
    }

    /// Distinct non-null values of `field` across matching records, in
    /// first-seen order.
    pub async fn distinct<E: Entity>(&self, filter: &Filter, field: &str) -> StoreResult<Vec<Value>> {
        let docs = self.store.find(E::COLLECTION, filter, None).await?;
        let mut seen: Vec<Value> = Vec::new();
        for doc in &docs {
            let v = lookup(doc, field);
            if !v.is_null() && !seen.contains(v) {
                seen.push(v.clone());
            }
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use reel_models::{AspectRatio, FormatSpec, VideoJob, VideoJobStatus, VideoRequest};

    fn repo() -> Repository {
        Repository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_entity_round_trip() {
        let repo = repo();
        let request = VideoRequest::new("en", "Bakery launch", "upbeat");
        let job = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Square, 30), "0");
        repo.insert(&job).await.unwrap();

        let loaded: VideoJob = repo.require(job.id.as_str()).await.unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.aspect_ratio, AspectRatio::Square);
        assert_eq!(loaded.status, VideoJobStatus::Requested);
    }

    #[tokio::test]
    async fn test_typed_update_and_claim() {
        let repo = repo();
        let request = VideoRequest::new("en", "topic", "style");
        let job = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 15), "0");
        repo.insert(&job).await.unwrap();

        let claimed: Option<VideoJob> = repo
            .claim_next(
                &Filter::eq("status", "requested"),
                &Patch::new().set("status", "script_generation_started"),
            )
            .await
            .unwrap();
        assert_eq!(claimed.unwrap().status, VideoJobStatus::ScriptGenerationStarted);

        let updated: VideoJob = repo
            .update(job.id.as_str(), &Patch::new().inc("script_generation_attempts", 1))
            .await
            .unwrap();
        assert_eq!(updated.script_generation_attempts, 1);
    }

    #[tokio::test]
    async fn test_distinct() {
        let repo = repo();
        let request = VideoRequest::new("en", "topic", "style");
        for (key, ratio) in [("0", AspectRatio::Portrait), ("1", AspectRatio::Square), ("2", AspectRatio::Portrait)] {
            repo.insert(&VideoJob::spawn(&request, FormatSpec::new(ratio, 30), key))
                .await
                .unwrap();
        }
        let ratios = repo.distinct::<VideoJob>(&Filter::all(), "aspect_ratio").await.unwrap();
        assert_eq!(ratios, vec![Value::from("9x16"), Value::from("1x1")]);
    }

    #[tokio::test]
    async fn test_require_missing() {
        let err = repo().require::<VideoJob>("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
