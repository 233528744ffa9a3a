use tracing::debug;

use crate::client::DocumentStoreClient;
use crate::error::{StoreError, StoreResult};
use crate::models::{decode_all, fields, Comment, CurrentUser, COMMENTS, POSTS};

pub const MAX_COMMENT_CHARS: usize = 2_000;

#[derive(Clone)]
pub struct Comments {
    client: DocumentStoreClient,
}

impl Comments {
    pub fn new(client: DocumentStoreClient) -> Self {
        Self { client }
    }

    pub async fn add(&self, author: &CurrentUser, post_id: &str, text: &str) -> StoreResult<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::validation("comment must not be empty"));
        }
        if text.chars().count() > MAX_COMMENT_CHARS {
            return Err(StoreError::validation(format!("comment longer than {MAX_COMMENT_CHARS} characters")));
        }
        if self.client.get_by_id(POSTS, post_id).await?.is_none() {
            return Err(StoreError::not_found(format!("post {post_id}")));
        }

        let id = self.client.add(COMMENTS, Comment::patch_for(author, post_id, text), None).await?;
        debug!(post_id, id = %id, "comment added");
        let doc = self
            .client
            .get_by_id(COMMENTS, &id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("comment {id}")))?;
        Comment::try_from(&doc)
    }

    /// Newest first.
    pub async fn for_post(&self, post_id: &str) -> StoreResult<Vec<Comment>> {
        let docs = self.client.list_recent(COMMENTS, Some((fields::POST_ID, post_id.into()))).await?;
        Ok(decode_all(&docs))
    }

    /// Only the author may remove a comment. Removing one that is already
    /// gone succeeds.
    pub async fn remove(&self, actor: &CurrentUser, id: &str) -> StoreResult<()> {
        let Some(doc) = self.client.get_by_id(COMMENTS, id).await? else {
            return Ok(());
        };
        let comment = Comment::try_from(&doc)?;
        if comment.uid != actor.uid {
            return Err(StoreError::permission_denied(format!("comment {id} belongs to another user")));
        }
        self.client.delete(COMMENTS, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::patch::Patch;
    use std::sync::Arc;

    async fn setup() -> (Comments, String) {
        let client = DocumentStoreClient::new(Arc::new(MemoryStore::new()));
        let post = client.add(POSTS, Patch::new().set(fields::TITLE, "t"), None).await.unwrap();
        (Comments::new(client), post)
    }

    #[tokio::test]
    async fn blank_comments_are_rejected() {
        let (comments, post) = setup().await;
        let err = comments.add(&CurrentUser::new("u1", "Ann", ""), &post, "   ").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn comments_list_newest_first_and_only_author_removes() {
        let (comments, post) = setup().await;
        let ann = CurrentUser::new("u1", "Ann", "");
        let first = comments.add(&ann, &post, "first!").await.unwrap();
        comments.add(&ann, &post, "second").await.unwrap();

        let listed: Vec<String> = comments.for_post(&post).await.unwrap().into_iter().map(|c| c.text).collect();
        assert_eq!(listed, ["second", "first!"]);

        let err = comments.remove(&CurrentUser::new("u2", "Bob", ""), &first.id).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PermissionDenied);
        comments.remove(&ann, &first.id).await.unwrap();
        comments.remove(&ann, &first.id).await.unwrap();
        assert_eq!(comments.for_post(&post).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commenting_on_a_missing_post_is_not_found() {
        let (comments, _) = setup().await;
        let err = comments.add(&CurrentUser::new("u1", "Ann", ""), "ghost", "hi").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
