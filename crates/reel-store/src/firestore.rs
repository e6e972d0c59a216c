//! Firestore-backed store.
//!
//! Equality terms are pushed down to `runQuery`; the full filter is then
//! re-checked client-side. Records carry a hidden `_seq` field (insert time in
//! epoch micros) that queries order by, so scans see the oldest records first.
//!
//! Claims and updates are read-modify-write guarded by the document's
//! `updateTime`. A claimer that loses the race moves on to the next
//! candidate instead of failing.

use async_trait::async_trait;
use reel_firestore::{
    fields_from_json, Document as FsDocument, FieldOperator, FirestoreClient, FirestoreError,
    QueryFilter, StructuredQuery, Value, Write,
};
use reel_models::Collection;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Document, Filter, Patch};
use crate::store::Store;

const SEQ_FIELD: &str = "_seq";
const PAGE_SIZE: usize = 100;
const MAX_UPDATE_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct FirestoreStore {
    client: FirestoreClient,
}

impl FirestoreStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn from_env() -> StoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env().await?))
    }

    fn strip_hidden(mut doc: Document) -> Document {
        doc.remove(SEQ_FIELD);
        doc
    }

    fn build_query(collection: Collection, filter: &Filter, offset: usize) -> StructuredQuery {
        let terms = filter
            .equalities()
            .into_iter()
            .map(|(field, value)| QueryFilter::field(field, FieldOperator::Equal, Value::from_json(value)))
            .collect();

        let mut query = StructuredQuery::collection(collection.as_str())
            .order_ascending(SEQ_FIELD)
            .with_limit(PAGE_SIZE as i32);
        if let Some(pushed) = QueryFilter::and(terms) {
            query = query.with_filter(pushed);
        }
        if offset > 0 {
            query = query.with_offset(offset as i32);
        }
        query
    }

    /// Walk matching documents page by page until `visit` returns `false`.
    async fn scan<F>(&self, collection: Collection, filter: &Filter, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(FsDocument, Document) -> bool,
    {
        let mut offset = 0;
        loop {
            let query = Self::build_query(collection, filter, offset);
            let page = self
                .client
                .with_retry("run_query", || self.client.run_query("", query.clone()))
                .await?;
            let fetched = page.len();

            for raw in page {
                let json = raw.to_json();
                if filter.matches(&json) && !visit(raw, json) {
                    return Ok(());
                }
            }

            if fetched < PAGE_SIZE {
                return Ok(());
            }
            offset += fetched;
        }
    }

    async fn candidates(&self, collection: Collection, filter: &Filter, limit: Option<usize>) -> StoreResult<Vec<(FsDocument, Document)>> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }
        self.scan(collection, filter, |raw, json| {
            out.push((raw, json));
            out.len() < limit
        })
        .await?;
        Ok(out)
    }

    /// Write the patched roots of `doc` if it is unchanged since `update_time`.
    async fn write_patched(
        &self,
        collection: Collection,
        id: &str,
        mut doc: Document,
        patch: &Patch,
        update_time: Option<&str>,
    ) -> Result<Document, FirestoreError> {
        patch.apply(&mut doc);
        let roots = patch.touched_roots();
        let subset: serde_json::Map<String, serde_json::Value> = roots
            .iter()
            .map(|r| (r.clone(), doc.get(r).cloned().unwrap_or(serde_json::Value::Null)))
            .collect();

        self.client
            .update_document_with_precondition(
                collection.as_str(),
                id,
                fields_from_json(&subset),
                Some(roots.as_slice()),
                update_time,
            )
            .await?;
        Ok(Self::strip_hidden(doc))
    }
}

#[async_trait]
impl Store for FirestoreStore {
    async fn insert(&self, collection: Collection, id: &str, mut doc: Document) -> StoreResult<()> {
        doc.insert(
            SEQ_FIELD.to_string(),
            serde_json::Value::from(chrono::Utc::now().timestamp_micros()),
        );
        let fields = fields_from_json(&doc);

        match self
            .client
            .with_retry("create_document", || {
                self.client.create_document(collection.as_str(), id, fields.clone())
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(FirestoreError::AlreadyExists(_)) => Err(StoreError::already_exists(collection, id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let doc = self
            .client
            .with_retry("get_document", || self.client.get_document(collection.as_str(), id))
            .await?;
        Ok(doc.map(|d| Self::strip_hidden(d.to_json())))
    }

    async fn update(&self, collection: Collection, id: &str, patch: &Patch) -> StoreResult<Document> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let raw = self
                .client
                .with_retry("get_document", || self.client.get_document(collection.as_str(), id))
                .await?
                .ok_or_else(|| StoreError::not_found(collection, id))?;

            let update_time = raw.update_time.clone();
            match self
                .write_patched(collection, id, raw.to_json(), patch, update_time.as_deref())
                .await
            {
                Ok(doc) => return Ok(doc),
                Err(e) if e.is_precondition_failed() => {
                    debug!(collection = %collection, id = %id, "Concurrent update, re-reading");
                }
                Err(FirestoreError::NotFound(_)) => return Err(StoreError::not_found(collection, id)),
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!("{}/{}", collection, id)))
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        Ok(self
            .candidates(collection, filter, limit)
            .await?
            .into_iter()
            .map(|(_, json)| Self::strip_hidden(json))
            .collect())
    }

    async fn delete_where(&self, collection: Collection, filter: &Filter) -> StoreResult<usize> {
        let names: Vec<String> = self
            .candidates(collection, filter, None)
            .await?
            .into_iter()
            .filter_map(|(raw, _)| raw.name)
            .collect();

        for chunk in names.chunks(500) {
            let writes: Vec<Write> = chunk.iter().map(|n| Write::delete(n.clone())).collect();
            self.client
                .with_retry("batch_write", || self.client.batch_write(writes.clone()))
                .await?;
        }
        Ok(names.len())
    }

    async fn claim_next(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>> {
        // Losing a race to another claimer is expected; each loss means one
        // fewer candidate, so a fresh scan always makes progress.
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let candidates = self.candidates(collection, filter, Some(PAGE_SIZE)).await?;
            if candidates.is_empty() {
                return Ok(None);
            }

            for (raw, json) in candidates {
                let Some(id) = raw.doc_id().map(str::to_string) else {
                    continue;
                };
                match self
                    .write_patched(collection, &id, json, patch, raw.update_time.as_deref())
                    .await
                {
                    Ok(doc) => return Ok(Some(doc)),
                    Err(e) if e.is_precondition_failed() => {
                        debug!(collection = %collection, id = %id, "Lost claim race, trying next candidate");
                    }
                    Err(FirestoreError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pushes_down_equalities_only() {
        let filter = Filter::eq("status", "requested")
            .and(Filter::lt("script_generation_attempts", 3))
            .and(Filter::not_in("request_id", ["r9"]));
        let query = FirestoreStore::build_query(Collection::Videos, &filter, 0);
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["from"][0]["collectionId"], "videos");
        assert_eq!(json["where"]["fieldFilter"]["field"]["fieldPath"], "status");
        assert_eq!(json["orderBy"][0]["field"]["fieldPath"], SEQ_FIELD);
        assert!(json.get("offset").is_none());
    }

    #[test]
    fn test_query_paging_offset() {
        let query = FirestoreStore::build_query(Collection::Scenes, &Filter::all(), 200);
        let json = serde_json::to_value(&query).unwrap();
        assert!(json.get("where").is_none());
        assert_eq!(json["offset"], 200);
        assert_eq!(json["limit"], PAGE_SIZE);
    }
}
