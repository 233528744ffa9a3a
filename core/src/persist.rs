use async_trait::async_trait;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::backend::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::patch::{Patch, ServerClock};
use crate::query::Query;
use crate::value::{Document, Fields};

/// On-disk store backed by sled. Each collection is its own tree, each
/// document one bincode-encoded entry keyed by id. Merge-patches go through
/// `update_and_fetch`, so concurrent writers to one document never lose
/// each other's set operations.
pub struct SledStore {
    db: sled::Db,
    root: Option<PathBuf>,
    clock: ServerClock,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let db = sled::open(&root).map_err(|e| storage_error("open store", e))?;
        tracing::debug!(path = %root.display(), "opened sled store");
        Ok(Self { db, root: Some(root), clock: ServerClock::default() })
    }

    /// Store that lives until dropped; used by tests and dry runs.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| storage_error("open temporary store", e))?;
        Ok(Self { db, root: None, clock: ServerClock::default() })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn collections(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter_map(|name| String::from_utf8(name.to_vec()).ok())
            .filter(|name| !name.starts_with("__sled__"))
            .collect()
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush().map_err(|e| storage_error("flush", e))?;
        Ok(())
    }

    fn tree(&self, collection: &str) -> StoreResult<sled::Tree> {
        self.db
            .open_tree(collection)
            .map_err(|e| storage_error(&format!("open collection {collection}"), e))
    }
}

fn storage_error(context: &str, err: impl Display) -> StoreError {
    StoreError::unknown(format!("storage failure: {context}")).with_cause(err)
}

fn encode(fields: &Fields) -> StoreResult<Vec<u8>> {
    bincode::serialize(fields).map_err(|e| storage_error("encode document", e))
}

fn decode(bytes: &[u8]) -> StoreResult<Fields> {
    bincode::deserialize(bytes).map_err(|e| storage_error("decode document", e))
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let tree = self.tree(collection)?;
        match tree.get(id.as_bytes()).map_err(|e| storage_error("read", e))? {
            Some(bytes) => Ok(Some(Document::new(id, decode(&bytes)?))),
            None => Ok(None),
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let tree = self.tree(collection)?;
        let mut candidates = Vec::new();
        for entry in tree.iter() {
            let (key, bytes) = entry.map_err(|e| storage_error("scan", e))?;
            let id = String::from_utf8_lossy(&key).into_owned();
            candidates.push(Document::new(id, decode(&bytes)?));
        }
        Ok(query.run(candidates))
    }

    async fn set(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        let tree = self.tree(collection)?;
        let mut fields = Fields::new();
        patch.apply(&mut fields, self.clock.tick());
        tree.insert(id.as_bytes(), encode(&fields)?)
            .map_err(|e| storage_error("write", e))?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        let tree = self.tree(collection)?;
        let now = self.clock.tick();
        // sled may rerun the closure under contention; the outcome of the
        // last run is the one that landed.
        let mut outcome: StoreResult<()> = Ok(());
        tree.update_and_fetch(id.as_bytes(), |current| {
            let Some(bytes) = current else {
                outcome = Err(StoreError::not_found(format!("{collection}/{id} does not exist")));
                return None;
            };
            let updated = decode(bytes).and_then(|mut fields| {
                patch.apply(&mut fields, now);
                encode(&fields)
            });
            match updated {
                Ok(encoded) => {
                    outcome = Ok(());
                    Some(encoded)
                }
                Err(err) => {
                    outcome = Err(err);
                    Some(bytes.to_vec())
                }
            }
        })
        .map_err(|e| storage_error("merge write", e))?;
        outcome
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let tree = self.tree(collection)?;
        tree.remove(id.as_bytes()).map_err(|e| storage_error("delete", e))?;
        Ok(())
    }
}
