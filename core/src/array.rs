use tracing::debug;

use crate::client::DocumentStoreClient;
use crate::error::StoreResult;
use crate::patch::{FieldOp, Patch};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    Union,
    Remove,
}

/// Set-semantics updates of array fields. Each call is one merge-patch
/// carrying a union/remove sentinel; the store resolves it against the
/// current contents, so no read-modify-write happens on the client.
/// Element order is not meaningful.
#[derive(Clone)]
pub struct ArrayFieldMutator {
    client: DocumentStoreClient,
}

impl ArrayFieldMutator {
    pub fn new(client: DocumentStoreClient) -> Self {
        Self { client }
    }

    /// Add `value` unless already present. Repeating the call is a no-op.
    pub async fn union(&self, collection: &str, id: &str, field: &str, value: impl Into<Value>) -> StoreResult<()> {
        self.apply(collection, id, field, value.into(), ArrayOp::Union).await
    }

    /// Drop `value` if present. Repeating the call is a no-op.
    pub async fn remove(&self, collection: &str, id: &str, field: &str, value: impl Into<Value>) -> StoreResult<()> {
        self.apply(collection, id, field, value.into(), ArrayOp::Remove).await
    }

    pub async fn apply(&self, collection: &str, id: &str, field: &str, value: Value, op: ArrayOp) -> StoreResult<()> {
        let sentinel = match op {
            ArrayOp::Union => FieldOp::ArrayUnion(vec![value]),
            ArrayOp::Remove => FieldOp::ArrayRemove(vec![value]),
        };
        self.client.update(collection, id, &Patch::new().with(field, sentinel)).await?;
        debug!(collection, id, field, ?op, "array field updated");
        Ok(())
    }
}
