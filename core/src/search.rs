use std::collections::HashSet;

use tokio::task::JoinSet;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::client::DocumentStoreClient;
use crate::error::{StoreError, StoreResult};
use crate::patch::Patch;
use crate::query::{Direction, FilterOp, Query};
use crate::value::Document;

/// Upper bound appended to a prefix. Sorts after every BMP code point, so
/// `[p, p + HIGH_SENTINEL]` holds exactly the strings starting with `p`
/// whose next character is in the BMP.
pub const HIGH_SENTINEL: char = '\u{FFFF}';

/// Shadow-field normalization: NFC composition, then Unicode lower-casing.
pub fn normalize(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Conventional name of the shadow of `field`: `title` -> `titleLower`.
pub fn shadow_name(field: &str) -> String {
    format!("{field}Lower")
}

/// Add writes for a display field and its lower-cased shadow to the same
/// patch, so both land in one single-document write.
pub fn shadowed(patch: Patch, field: &str, shadow: &str, text: &str) -> Patch {
    patch.set(field, text).set(shadow, normalize(text))
}

/// Inclusive lexical bounds for a prefix query. Empty and whitespace-only
/// prefixes are rejected rather than turned into an unbounded scan.
pub fn prefix_bounds(prefix: &str) -> StoreResult<(String, String)> {
    if prefix.trim().is_empty() {
        return Err(StoreError::validation("search prefix must not be empty"));
    }
    let low = normalize(prefix);
    let mut high = low.clone();
    high.push(HIGH_SENTINEL);
    Ok((low, high))
}

/// Prefix search over maintained shadow fields, expressed as range queries.
#[derive(Clone)]
pub struct PrefixSearchIndex {
    client: DocumentStoreClient,
}

impl PrefixSearchIndex {
    pub fn new(client: DocumentStoreClient) -> Self {
        Self { client }
    }

    /// Documents whose `field` starts with `prefix`, ordered by `field`.
    /// `field` must be a shadow field; the prefix is normalized here.
    pub async fn search(&self, collection: &str, field: &str, prefix: &str) -> StoreResult<Vec<Document>> {
        let (low, high) = prefix_bounds(prefix)?;
        self.range(collection, field, low, high).await
    }

    /// Prefix search over several shadow fields at once. The per-field
    /// queries run concurrently; the merged result keeps the first
    /// occurrence of each document id, walking fields in the given order.
    pub async fn search_any(&self, collection: &str, fields: &[&str], prefix: &str) -> StoreResult<Vec<Document>> {
        let (low, high) = prefix_bounds(prefix)?;
        let mut tasks = JoinSet::new();
        for (slot, field) in fields.iter().enumerate() {
            let index = self.clone();
            let collection = collection.to_string();
            let field = field.to_string();
            let (low, high) = (low.clone(), high.clone());
            tasks.spawn(async move { (slot, index.range(&collection, &field, low, high).await) });
        }

        let mut per_field: Vec<Vec<Document>> = vec![Vec::new(); fields.len()];
        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined.map_err(|e| StoreError::unknown("search task aborted").with_cause(e))?;
            per_field[slot] = result?;
        }

        let mut seen = HashSet::new();
        let merged: Vec<Document> = per_field
            .into_iter()
            .flatten()
            .filter(|doc| seen.insert(doc.id.clone()))
            .collect();
        debug!(collection, ?fields, prefix, hits = merged.len(), "fan-out prefix search");
        Ok(merged)
    }

    async fn range(&self, collection: &str, field: &str, low: String, high: String) -> StoreResult<Vec<Document>> {
        let query = Query::new()
            .filter(field, FilterOp::Ge, low)
            .filter(field, FilterOp::Le, high)
            .order_by(field, Direction::Ascending);
        self.client.query(collection, &query).await
    }
}
