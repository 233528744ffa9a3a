use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::client::DocumentStoreClient;
use crate::error::{StoreError, StoreResult};
use crate::models::{decode_all, fields, CreatorRef, CurrentUser, MediaRef, Post, COMMENTS, LIKES, POSTS};
use crate::patch::Patch;
use crate::search::{normalize, shadowed, PrefixSearchIndex};

/// Fields supplied when publishing. Media is uploaded beforehand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub video: MediaRef,
    #[serde(default)]
    pub thumbnail: MediaRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEdit {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// What went with a removed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Removed {
    pub likes: usize,
    pub comments: usize,
}

#[derive(Clone)]
pub struct Posts {
    client: DocumentStoreClient,
    search: PrefixSearchIndex,
}

impl Posts {
    pub fn new(client: DocumentStoreClient) -> Self {
        let search = PrefixSearchIndex::new(client.clone());
        Self { client, search }
    }

    pub async fn publish(&self, author: &CurrentUser, new: NewPost) -> StoreResult<Post> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(StoreError::validation("post title must not be empty"));
        }
        if new.video.url.trim().is_empty() {
            return Err(StoreError::validation("post needs a video url"));
        }
        let post = Post {
            id: String::new(),
            title: title.to_string(),
            title_lower: normalize(title),
            description: new.description,
            video: new.video,
            thumbnail: new.thumbnail,
            creator: CreatorRef::from_user(author),
            liker_ids: BTreeSet::new(),
            view_count: 0,
            created_at: None,
        };
        let id = self.client.add(POSTS, post.to_patch(), None).await?;
        info!(id = %id, creator = %author.uid, "post published");
        self.require(&id).await
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<Post>> {
        self.client.get_by_id(POSTS, id).await?.as_ref().map(Post::try_from).transpose()
    }

    /// Title and its shadow always travel in the same patch.
    pub async fn edit_details(&self, actor: &CurrentUser, id: &str, edit: PostEdit) -> StoreResult<Post> {
        let post = self.require(id).await?;
        ensure_owner(actor, &post)?;

        let mut patch = Patch::new();
        if let Some(title) = edit.title.as_deref().map(str::trim) {
            if title.is_empty() {
                return Err(StoreError::validation("post title must not be empty"));
            }
            patch = shadowed(patch, fields::TITLE, fields::TITLE_LOWER, title);
        }
        if let Some(description) = edit.description {
            patch = patch.set(fields::DESCRIPTION, description);
        }
        self.client.update(POSTS, id, &patch).await?;
        self.require(id).await
    }

    /// Delete a post, then its Like records and comments.
    pub async fn remove(&self, actor: &CurrentUser, id: &str) -> StoreResult<Removed> {
        let post = self.require(id).await?;
        ensure_owner(actor, &post)?;

        self.client.delete(POSTS, id).await?;
        let removed = Removed {
            likes: self.client.delete_by_field(LIKES, fields::POST_ID, id).await?,
            comments: self.client.delete_by_field(COMMENTS, fields::POST_ID, id).await?,
        };
        info!(id, likes = removed.likes, comments = removed.comments, "post removed");
        Ok(removed)
    }

    /// Newest first.
    pub async fn feed(&self, limit: Option<usize>) -> StoreResult<Vec<Post>> {
        let docs = self.client.list_recent(POSTS, None).await?;
        let mut posts: Vec<Post> = decode_all(&docs);
        if let Some(limit) = limit {
            posts.truncate(limit);
        }
        Ok(posts)
    }

    pub async fn by_creator(&self, uid: &str) -> StoreResult<Vec<Post>> {
        let docs = self.client.list_recent(POSTS, Some((fields::CREATOR_UID, uid.into()))).await?;
        Ok(decode_all(&docs))
    }

    /// Counted by the store, so concurrent viewers never overwrite each
    /// other.
    pub async fn record_view(&self, id: &str) -> StoreResult<()> {
        self.client.update(POSTS, id, &Patch::new().increment(fields::VIEW_COUNT, 1)).await?;
        debug!(id, "view recorded");
        Ok(())
    }

    /// Posts whose title or creator name starts with `prefix`.
    pub async fn search(&self, prefix: &str) -> StoreResult<Vec<Post>> {
        let docs = self
            .search
            .search_any(POSTS, &[fields::TITLE_LOWER, fields::CREATOR_NAME_LOWER], prefix)
            .await?;
        Ok(decode_all(&docs))
    }

    async fn require(&self, id: &str) -> StoreResult<Post> {
        self.get(id).await?.ok_or_else(|| StoreError::not_found(format!("post {id}")))
    }
}

fn ensure_owner(actor: &CurrentUser, post: &Post) -> StoreResult<()> {
    if post.creator.uid != actor.uid {
        return Err(StoreError::permission_denied(format!("post {} belongs to another user", post.id)));
    }
    Ok(())
}
