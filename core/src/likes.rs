use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::array::ArrayFieldMutator;
use crate::client::DocumentStoreClient;
use crate::error::{StoreError, StoreResult};
use crate::guard::PairKey;
use crate::models::{decode_all, fields, CurrentUser, Like, Post, LIKES, POSTS};
use crate::optimistic::RemoteToggle;
use crate::query::Query;

/// Like records are keyed by post and user, so liking twice rewrites the
/// same document instead of adding a second one.
pub fn like_id(post_id: &str, uid: &str) -> String {
    format!("{post_id}_{uid}")
}

/// Remote half of the like toggle for one signed-in user: the Like record
/// first, then the post's `likerIds` set. A failed second write undoes the
/// first before the error is returned.
#[derive(Clone)]
pub struct LikeWrites {
    client: DocumentStoreClient,
    arrays: ArrayFieldMutator,
    actor: CurrentUser,
}

impl LikeWrites {
    pub fn new(client: DocumentStoreClient, actor: CurrentUser) -> Self {
        let arrays = ArrayFieldMutator::new(client.clone());
        Self { client, arrays, actor }
    }

    pub fn actor(&self) -> &CurrentUser {
        &self.actor
    }

    fn check_actor(&self, key: &PairKey) -> StoreResult<()> {
        if key.actor != self.actor.uid {
            return Err(StoreError::permission_denied(format!(
                "{} cannot change likes on behalf of {}",
                self.actor.uid, key.actor
            )));
        }
        Ok(())
    }

    /// Drop every Like record for the pair, including ones written under
    /// older, random ids.
    async fn delete_records(&self, post_id: &str) -> StoreResult<usize> {
        self.client.delete(LIKES, &like_id(post_id, &self.actor.uid)).await?;
        let query = Query::new().where_eq(fields::POST_ID, post_id).where_eq(fields::UID, self.actor.uid.as_str());
        let strays = self.client.query(LIKES, &query).await?;
        for doc in &strays {
            self.client.delete(LIKES, &doc.id).await?;
        }
        Ok(strays.len())
    }
}

#[async_trait]
impl RemoteToggle for LikeWrites {
    async fn switch_on(&self, key: &PairKey) -> StoreResult<()> {
        self.check_actor(key)?;
        let post_id = key.target.as_str();
        let id = like_id(post_id, &self.actor.uid);
        self.client.add(LIKES, Like::patch_for(&self.actor, post_id), Some(id.as_str())).await?;

        if let Err(err) = self.arrays.union(POSTS, post_id, fields::LIKER_IDS, self.actor.uid.as_str()).await {
            if let Err(undo) = self.client.delete(LIKES, &id).await {
                warn!(%key, error = %undo, "could not undo like record");
            }
            return Err(err);
        }
        debug!(%key, "liked");
        Ok(())
    }

    async fn switch_off(&self, key: &PairKey) -> StoreResult<()> {
        self.check_actor(key)?;
        let post_id = key.target.as_str();
        let strays = self.delete_records(post_id).await?;
        if strays > 0 {
            info!(%key, strays, "removed stray like records");
        }

        if let Err(err) = self.arrays.remove(POSTS, post_id, fields::LIKER_IDS, self.actor.uid.as_str()).await {
            // the post may be gone; there is nothing left to restore then
            if !err.is_not_found() {
                let id = like_id(post_id, &self.actor.uid);
                if let Err(undo) = self.client.add(LIKES, Like::patch_for(&self.actor, post_id), Some(id.as_str())).await {
                    warn!(%key, error = %undo, "could not restore like record");
                }
            }
            return Err(err);
        }
        debug!(%key, "unliked");
        Ok(())
    }
}

/// Difference between a post's `likerIds` and its Like records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeAudit {
    pub post_id: String,
    /// Users with a Like record who are absent from the set.
    pub missing_from_set: Vec<String>,
    /// Users in the set with no Like record.
    pub orphaned_in_set: Vec<String>,
}

impl LikeAudit {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_set.is_empty() && self.orphaned_in_set.is_empty()
    }
}

/// Read side of likes plus invariant checks.
#[derive(Clone)]
pub struct Likes {
    client: DocumentStoreClient,
    arrays: ArrayFieldMutator,
}

impl Likes {
    pub fn new(client: DocumentStoreClient) -> Self {
        let arrays = ArrayFieldMutator::new(client.clone());
        Self { client, arrays }
    }

    pub fn writes(&self, actor: CurrentUser) -> LikeWrites {
        LikeWrites::new(self.client.clone(), actor)
    }

    /// Like records for a post, newest first.
    pub async fn likers(&self, post_id: &str) -> StoreResult<Vec<Like>> {
        let docs = self.client.list_recent(LIKES, Some((fields::POST_ID, post_id.into()))).await?;
        Ok(decode_all(&docs))
    }

    pub async fn audit(&self, post_id: &str) -> StoreResult<LikeAudit> {
        let doc = self
            .client
            .get_by_id(POSTS, post_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("post {post_id}")))?;
        let post = Post::try_from(&doc)?;
        let recorded: BTreeSet<String> = self
            .client
            .query_by_field(LIKES, fields::POST_ID, post_id)
            .await?
            .iter()
            .filter_map(|doc| doc.str_field(fields::UID).map(str::to_string))
            .collect();

        Ok(LikeAudit {
            post_id: post_id.to_string(),
            missing_from_set: recorded.difference(&post.liker_ids).cloned().collect(),
            orphaned_in_set: post.liker_ids.difference(&recorded).cloned().collect(),
        })
    }

    /// Bring `likerIds` in line with the Like records, which are taken as
    /// authoritative. Returns the audit as found before repairing.
    pub async fn repair(&self, post_id: &str) -> StoreResult<LikeAudit> {
        let audit = self.audit(post_id).await?;
        for uid in &audit.missing_from_set {
            self.arrays.union(POSTS, post_id, fields::LIKER_IDS, uid.as_str()).await?;
        }
        for uid in &audit.orphaned_in_set {
            self.arrays.remove(POSTS, post_id, fields::LIKER_IDS, uid.as_str()).await?;
        }
        if !audit.is_consistent() {
            info!(
                post_id,
                added = audit.missing_from_set.len(),
                removed = audit.orphaned_in_set.len(),
                "repaired liker set"
            );
        }
        Ok(audit)
    }
}
