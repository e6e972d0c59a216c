//! In-process store for tests and single-process runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reel_models::Collection;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Document, Filter, Patch};
use crate::store::Store;

#[derive(Default)]
struct Table {
    /// Records keyed by insertion sequence, which gives creation order.
    rows: BTreeMap<u64, Document>,
    index: HashMap<String, u64>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<Collection, Table>,
    next_seq: u64,
}

/// All operations run under one lock, so claims are trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .await
            .tables
            .get(&collection)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, collection: Collection, id: &str, doc: Document) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        let table = inner.tables.entry(collection).or_default();
        if table.index.contains_key(id) {
            return Err(StoreError::already_exists(collection, id));
        }
        table.index.insert(id.to_string(), seq);
        table.rows.insert(seq, doc);
        inner.next_seq += 1;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.get(&collection).and_then(|t| {
            t.index.get(id).and_then(|seq| t.rows.get(seq)).cloned()
        }))
    }

    async fn update(&self, collection: Collection, id: &str, patch: &Patch) -> StoreResult<Document> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .tables
            .get_mut(&collection)
            .and_then(|t| {
                let seq = *t.index.get(id)?;
                t.rows.get_mut(&seq)
            })
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        patch.apply(doc);
        Ok(doc.clone())
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock().await;
        let Some(table) = inner.tables.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(table
            .rows
            .values()
            .filter(|d| filter.matches(d))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_where(&self, collection: Collection, filter: &Filter) -> StoreResult<usize> {
        let mut inner = self.inner.lock().await;
        let Some(table) = inner.tables.get_mut(&collection) else {
            return Ok(0);
        };
        let doomed: Vec<u64> = table
            .rows
            .iter()
            .filter(|(_, d)| filter.matches(d))
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &doomed {
            table.rows.remove(seq);
        }
        table.index.retain(|_, seq| !doomed.contains(seq));
        Ok(doomed.len())
    }

    async fn claim_next(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<Option<Document>> {
        let mut inner = self.inner.lock().await;
        let Some(table) = inner.tables.get_mut(&collection) else {
            return Ok(None);
        };
        let Some(doc) = table.rows.values_mut().find(|d| filter.matches(d)) else {
            return Ok(None);
        };
        patch.apply(doc);
        Ok(Some(doc.clone()))
    }
}
