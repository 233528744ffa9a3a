use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::DocumentStoreClient;
use crate::error::{StoreError, StoreResult};
use crate::models::{decode_all, fields, CurrentUser, UserProfile, POSTS, USERS};
use crate::patch::Patch;
use crate::search::{normalize, shadowed, PrefixSearchIndex};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// User profiles, stored under the user's uid.
#[derive(Clone)]
pub struct Profiles {
    client: DocumentStoreClient,
    search: PrefixSearchIndex,
}

impl Profiles {
    pub fn new(client: DocumentStoreClient) -> Self {
        let search = PrefixSearchIndex::new(client.clone());
        Self { client, search }
    }

    /// Create the profile on first sign-in. An existing profile is returned
    /// untouched.
    pub async fn register(&self, user: &CurrentUser, email: &str) -> StoreResult<UserProfile> {
        if let Some(existing) = self.get(&user.uid).await? {
            return Ok(existing);
        }
        let patch = shadowed(Patch::new(), fields::NAME, fields::NAME_LOWER, &user.name)
            .set(fields::UID, user.uid.as_str())
            .set(fields::EMAIL, email)
            .set(fields::BIO, "")
            .set(fields::AVATAR, user.avatar.as_str());
        self.client.add(USERS, patch, Some(user.uid.as_str())).await?;
        info!(uid = %user.uid, "profile registered");
        self.require(&user.uid).await
    }

    pub async fn get(&self, uid: &str) -> StoreResult<Option<UserProfile>> {
        self.client.get_by_id(USERS, uid).await?.as_ref().map(UserProfile::try_from).transpose()
    }

    /// Name and avatar changes are copied onto the user's posts. `bio` is a
    /// plain field: concurrent edits are last-write-wins.
    pub async fn update(&self, uid: &str, edit: ProfileEdit) -> StoreResult<UserProfile> {
        let mut patch = Patch::new();
        let mut creator = Patch::new();
        if let Some(name) = edit.name.as_deref().map(str::trim) {
            if name.is_empty() {
                return Err(StoreError::validation("display name must not be empty"));
            }
            patch = shadowed(patch, fields::NAME, fields::NAME_LOWER, name);
            creator = creator.set(fields::CREATOR_NAME, name).set(fields::CREATOR_NAME_LOWER, normalize(name));
        }
        if let Some(avatar) = edit.avatar {
            patch = patch.set(fields::AVATAR, avatar.as_str());
            creator = creator.set(fields::CREATOR_AVATAR, avatar);
        }
        if let Some(bio) = edit.bio {
            patch = patch.set(fields::BIO, bio);
        }

        self.client.update(USERS, uid, &patch).await?;
        if !creator.is_empty() {
            let touched = self.client.update_by_field(POSTS, fields::CREATOR_UID, uid, &creator).await?;
            info!(uid, posts = touched, "creator details propagated");
        }
        self.require(uid).await
    }

    /// All profiles, or those whose name starts with `prefix`.
    pub async fn creators(&self, prefix: Option<&str>) -> StoreResult<Vec<UserProfile>> {
        let docs = match prefix {
            Some(prefix) => self.search.search(USERS, fields::NAME_LOWER, prefix).await?,
            None => self.client.get_all(USERS).await?,
        };
        Ok(decode_all(&docs))
    }

    async fn require(&self, uid: &str) -> StoreResult<UserProfile> {
        self.get(uid).await?.ok_or_else(|| StoreError::not_found(format!("user {uid}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{MediaRef, Post};
    use crate::posts::{NewPost, Posts};
    use std::sync::Arc;

    #[tokio::test]
    async fn rename_reaches_existing_posts() {
        let client = DocumentStoreClient::new(Arc::new(MemoryStore::new()));
        let profiles = Profiles::new(client.clone());
        let posts = Posts::new(client);
        let ann = CurrentUser::new("u1", "Ann", "a.png");
        profiles.register(&ann, "ann@example.com").await.unwrap();
        let new = NewPost { title: "Clip".into(), video: MediaRef { url: "v".into(), public_id: String::new() }, ..Default::default() };
        let post = posts.publish(&ann, new).await.unwrap();

        let edit = ProfileEdit { name: Some("Annabel".into()), ..Default::default() };
        let profile = profiles.update("u1", edit).await.unwrap();
        assert_eq!(profile.name_lower, "annabel");

        let post: Post = posts.get(&post.id).await.unwrap().unwrap();
        assert_eq!(post.creator.name, "Annabel");
        assert_eq!(posts.search("annab").await.unwrap().len(), 1);
        assert_eq!(profiles.creators(Some("ANN")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let profiles = Profiles::new(DocumentStoreClient::new(Arc::new(MemoryStore::new())));
        let ann = CurrentUser::new("u1", "Ann", "");
        profiles.register(&ann, "a@x").await.unwrap();
        profiles.update("u1", ProfileEdit { bio: Some("hi".into()), ..Default::default() }).await.unwrap();
        let again = profiles.register(&ann, "a@x").await.unwrap();
        assert_eq!(again.bio, "hi");
    }

    #[tokio::test]
    async fn updating_a_missing_profile_is_not_found() {
        let profiles = Profiles::new(DocumentStoreClient::new(Arc::new(MemoryStore::new())));
        let err = profiles.update("ghost", ProfileEdit { bio: Some("x".into()), ..Default::default() }).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
