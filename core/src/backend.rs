use async_trait::async_trait;

use crate::error::StoreResult;
use crate::patch::Patch;
use crate::query::Query;
use crate::value::Document;

/// The remote document store as the client sees it: single-document atomic
/// writes plus simple predicate queries, addressed by `(collection, id)`.
/// There are no cross-document transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    /// Full replace. The document is created if absent.
    async fn set(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()>;

    /// Merge-patch. Fails with `NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()>;

    /// Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.query(collection, &Query::new()).await
    }

    /// Fresh identity for a new document in `collection`.
    fn mint_id(&self, _collection: &str) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}
