use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::backend::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::patch::{Patch, ServerClock};
use crate::query::Query;
use crate::value::{Document, Fields};

/// Process-local store. Every write runs under one lock, which makes each
/// single-document write atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    clock: ServerClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else { return Ok(Vec::new()) };
        let candidates = docs.iter().map(|(id, fields)| Document::new(id.clone(), fields.clone()));
        Ok(query.run(candidates))
    }

    async fn set(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        let now = self.clock.tick();
        let mut fields = Fields::new();
        patch.apply(&mut fields, now);
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        let now = self.clock.tick();
        let mut collections = self.collections.write();
        let fields = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(format!("{collection}/{id} does not exist")))?;
        patch.apply(fields, now);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
