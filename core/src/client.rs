use std::future::Future;
use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::backend::DocumentStore;
use crate::config::ClientConfig;
use crate::error::{StoreError, StoreResult};
use crate::patch::{FieldOp, Patch};
use crate::query::{Direction, Query};
use crate::value::{Document, Value};

/// Field stamped by the server on every `add`.
pub const CREATED_AT: &str = "createdAt";
/// Field that mirrors the document id inside the document.
pub const DOC_ID: &str = "docId";

/// Typed CRUD/query façade over a remote document store. Holds no state of
/// its own beyond the shared backend handle and call limits; cloning is
/// cheap.
#[derive(Clone)]
pub struct DocumentStoreClient {
    store: Arc<dyn DocumentStore>,
    config: ClientConfig,
}

impl DocumentStoreClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, ClientConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: ClientConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `None` when the document does not exist.
    pub async fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_address(collection, Some(id))?;
        self.call("get", collection, || self.store.get(collection, id)).await
    }

    /// Every document in `collection`; empty when the collection is.
    pub async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_address(collection, None)?;
        self.call("list", collection, || self.store.list(collection)).await
    }

    pub async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> StoreResult<Vec<Document>> {
        let query = Query::new().where_eq(field, value);
        self.query(collection, &query).await
    }

    pub async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        validate_address(collection, None)?;
        for filter in &query.filters {
            validate_field(&filter.field)?;
        }
        self.call("query", collection, || self.store.query(collection, query)).await
    }

    /// Newest first by the server-assigned `createdAt`, optionally narrowed
    /// by one equality predicate. Documents not yet stamped are left out.
    pub async fn list_recent(&self, collection: &str, filter: Option<(&str, Value)>) -> StoreResult<Vec<Document>> {
        let mut query = Query::new().order_by(CREATED_AT, Direction::Descending);
        if let Some((field, value)) = filter {
            query = query.where_eq(field, value);
        }
        self.query(collection, &query).await
    }

    /// Write a whole document and return its id. With `id` this replaces
    /// whatever lives there; without it a fresh id is minted. `createdAt` is
    /// stamped by the server and `docId` mirrors the final id.
    pub async fn add(&self, collection: &str, fields: impl Into<Patch>, id: Option<&str>) -> StoreResult<String> {
        validate_address(collection, id)?;
        // minted up front so a retried attempt rewrites the same document
        let id = match id {
            Some(id) => id.to_string(),
            None => self.store.mint_id(collection),
        };
        let patch: Patch = fields.into();
        let patch = patch.set(DOC_ID, id.as_str()).server_timestamp(CREATED_AT);
        self.call("add", collection, || self.store.set(collection, &id, &patch)).await?;
        debug!(collection, id = %id, "document added");
        Ok(id)
    }

    /// Merge-patch; untouched fields keep their values. `NotFound` if absent.
    pub async fn update(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        validate_address(collection, Some(id))?;
        if patch.is_empty() {
            return Err(StoreError::validation(format!("empty update for {collection}/{id}")));
        }
        for (path, _) in patch.iter() {
            validate_field(path)?;
        }
        // a timed-out increment may already have landed; replaying it would count twice
        let retries = if patch.iter().any(|(_, op)| matches!(op, FieldOp::Increment(_))) {
            0
        } else {
            self.config.max_retries
        };
        self.call_with_retries("update", collection, retries, || self.store.update(collection, id, patch)).await
    }

    /// Deleting a missing document is a successful no-op.
    pub async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_address(collection, Some(id))?;
        match self.call("delete", collection, || self.store.delete(collection, id)).await {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Merge `patch` into every document where `field == value`. Returns how
    /// many were touched; documents deleted between the match and the write
    /// are skipped.
    pub async fn update_by_field(
        &self,
        collection: &str,
        field: &str,
        value: impl Into<Value>,
        patch: &Patch,
    ) -> StoreResult<usize> {
        let matches = self.query_by_field(collection, field, value).await?;
        let mut touched = 0;
        for doc in &matches {
            match self.update(collection, &doc.id, patch).await {
                Ok(()) => touched += 1,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        debug!(collection, field, touched, "batch update");
        Ok(touched)
    }

    pub async fn delete_by_field(&self, collection: &str, field: &str, value: impl Into<Value>) -> StoreResult<usize> {
        let matches = self.query_by_field(collection, field, value).await?;
        for doc in &matches {
            self.delete(collection, &doc.id).await?;
        }
        debug!(collection, field, deleted = matches.len(), "batch delete");
        Ok(matches.len())
    }

    /// Run one store call under the configured timeout, retrying network
    /// failures with exponential backoff.
    async fn call<T, F, Fut>(&self, op: &'static str, collection: &str, attempt_call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.call_with_retries(op, collection, self.config.max_retries, attempt_call).await
    }

    async fn call_with_retries<T, F, Fut>(
        &self,
        op: &'static str,
        collection: &str,
        max_retries: u32,
        mut attempt_call: F,
    ) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = match timeout(self.config.timeout, attempt_call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::network(format!(
                    "{op} on {collection} timed out after {:?}",
                    self.config.timeout
                ))),
            };
            match result {
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    let delay = self.config.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(op, collection, attempt, ?delay, error = %err, "retrying store call");
                    sleep(delay).await;
                }
                Err(err) => {
                    debug!(op, collection, kind = %err.kind, error = %err, "store call failed");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

fn validate_address(collection: &str, id: Option<&str>) -> StoreResult<()> {
    if collection.trim().is_empty() || collection.contains('/') {
        return Err(StoreError::validation(format!("invalid collection name {collection:?}")));
    }
    if let Some(id) = id {
        if id.trim().is_empty() || id.contains('/') {
            return Err(StoreError::validation(format!("invalid document id {id:?} in {collection}")));
        }
    }
    Ok(())
}

fn validate_field(path: &str) -> StoreResult<()> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(StoreError::validation(format!("invalid field path {path:?}")));
    }
    Ok(())
}
