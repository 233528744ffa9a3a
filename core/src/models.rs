//! Per-collection schemas. Documents are decoded here, at the store
//! boundary, so everything above works with typed records; a missing or
//! mistyped required field is a `Validation` error naming the document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::client::CREATED_AT;
use crate::error::{StoreError, StoreResult};
use crate::patch::Patch;
use crate::search::normalize;
use crate::value::{Document, Fields, Timestamp, Value};

pub const POSTS: &str = "posts";
pub const LIKES: &str = "likes";
pub const COMMENTS: &str = "comments";
pub const USERS: &str = "users";

pub mod fields {
    pub const TITLE: &str = "title";
    pub const TITLE_LOWER: &str = "titleLower";
    pub const DESCRIPTION: &str = "description";
    pub const VIDEO: &str = "video";
    pub const THUMBNAIL: &str = "thumbnail";
    pub const CREATOR: &str = "creator";
    pub const CREATOR_UID: &str = "creator.uid";
    pub const CREATOR_NAME: &str = "creator.name";
    pub const CREATOR_NAME_LOWER: &str = "creator.nameLower";
    pub const CREATOR_AVATAR: &str = "creator.avatar";
    pub const LIKER_IDS: &str = "likerIds";
    pub const VIEW_COUNT: &str = "viewCount";
    pub const POST_ID: &str = "postId";
    pub const UID: &str = "uid";
    pub const NAME: &str = "name";
    pub const NAME_LOWER: &str = "nameLower";
    pub const AVATAR: &str = "avatar";
    pub const TEXT: &str = "text";
    pub const EMAIL: &str = "email";
    pub const BIO: &str = "bio";
}

/// Identity handed in by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub uid: String,
    pub name: String,
    pub avatar: String,
}

impl CurrentUser {
    pub fn new(uid: impl Into<String>, name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self { uid: uid.into(), name: name.into(), avatar: avatar.into() }
    }
}

/// A media object already uploaded to the CDN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    #[serde(default)]
    pub public_id: String,
}

impl MediaRef {
    fn to_value(&self) -> Value {
        let mut map = Fields::new();
        map.insert("url".into(), Value::from(&self.url));
        map.insert("publicId".into(), Value::from(&self.public_id));
        Value::Map(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorRef {
    pub uid: String,
    pub name: String,
    pub name_lower: String,
    pub avatar: String,
}

impl CreatorRef {
    pub fn from_user(user: &CurrentUser) -> Self {
        Self { uid: user.uid.clone(), name: user.name.clone(), name_lower: normalize(&user.name), avatar: user.avatar.clone() }
    }

    fn to_value(&self) -> Value {
        let mut map = Fields::new();
        map.insert("uid".into(), Value::from(&self.uid));
        map.insert("name".into(), Value::from(&self.name));
        map.insert("nameLower".into(), Value::from(&self.name_lower));
        map.insert("avatar".into(), Value::from(&self.avatar));
        Value::Map(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub title_lower: String,
    pub description: String,
    pub video: MediaRef,
    pub thumbnail: MediaRef,
    pub creator: CreatorRef,
    pub liker_ids: BTreeSet<String>,
    pub view_count: i64,
    pub created_at: Option<Timestamp>,
}

impl Post {
    pub fn like_count(&self) -> i64 {
        self.liker_ids.len() as i64
    }

    pub fn is_liked_by(&self, uid: &str) -> bool {
        self.liker_ids.contains(uid)
    }

    /// Fields for a brand new post; `createdAt` and `docId` are added by
    /// the client on write.
    pub fn to_patch(&self) -> Patch {
        Patch::new()
            .set(fields::TITLE, self.title.as_str())
            .set(fields::TITLE_LOWER, self.title_lower.as_str())
            .set(fields::DESCRIPTION, self.description.as_str())
            .set(fields::VIDEO, self.video.to_value())
            .set(fields::THUMBNAIL, self.thumbnail.to_value())
            .set(fields::CREATOR, self.creator.to_value())
            .set(fields::LIKER_IDS, Value::Array(self.liker_ids.iter().map(Value::from).collect()))
            .set(fields::VIEW_COUNT, self.view_count)
    }
}

impl TryFrom<&Document> for Post {
    type Error = StoreError;

    fn try_from(doc: &Document) -> StoreResult<Self> {
        let r = Reader::new(POSTS, doc);
        let title = r.string(fields::TITLE)?;
        let creator_name = r.string(fields::CREATOR_NAME)?;
        Ok(Self {
            id: doc.id.clone(),
            title_lower: r.optional_string(fields::TITLE_LOWER).unwrap_or_else(|| normalize(&title)),
            title,
            description: r.optional_string(fields::DESCRIPTION).unwrap_or_default(),
            video: r.media(fields::VIDEO)?,
            thumbnail: r.media(fields::THUMBNAIL).unwrap_or_default(),
            creator: CreatorRef {
                uid: r.string(fields::CREATOR_UID)?,
                name_lower: r.optional_string(fields::CREATOR_NAME_LOWER).unwrap_or_else(|| normalize(&creator_name)),
                name: creator_name,
                avatar: r.optional_string(fields::CREATOR_AVATAR).unwrap_or_default(),
            },
            liker_ids: r.string_set(fields::LIKER_IDS)?,
            view_count: r.int_or_zero(fields::VIEW_COUNT)?,
            created_at: r.timestamp(CREATED_AT),
        })
    }
}

/// Canonical record that `uid` liked `post_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub uid: String,
    pub name: String,
    pub avatar: String,
    pub created_at: Option<Timestamp>,
}

impl Like {
    pub fn patch_for(actor: &CurrentUser, post_id: &str) -> Patch {
        Patch::new()
            .set(fields::POST_ID, post_id)
            .set(fields::UID, actor.uid.as_str())
            .set(fields::NAME, actor.name.as_str())
            .set(fields::AVATAR, actor.avatar.as_str())
    }
}

impl TryFrom<&Document> for Like {
    type Error = StoreError;

    fn try_from(doc: &Document) -> StoreResult<Self> {
        let r = Reader::new(LIKES, doc);
        Ok(Self {
            id: doc.id.clone(),
            post_id: r.string(fields::POST_ID)?,
            uid: r.string(fields::UID)?,
            name: r.optional_string(fields::NAME).unwrap_or_default(),
            avatar: r.optional_string(fields::AVATAR).unwrap_or_default(),
            created_at: r.timestamp(CREATED_AT),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub uid: String,
    pub name: String,
    pub avatar: String,
    pub text: String,
    pub created_at: Option<Timestamp>,
}

impl Comment {
    pub fn patch_for(author: &CurrentUser, post_id: &str, text: &str) -> Patch {
        Patch::new()
            .set(fields::POST_ID, post_id)
            .set(fields::UID, author.uid.as_str())
            .set(fields::NAME, author.name.as_str())
            .set(fields::AVATAR, author.avatar.as_str())
            .set(fields::TEXT, text)
    }
}

impl TryFrom<&Document> for Comment {
    type Error = StoreError;

    fn try_from(doc: &Document) -> StoreResult<Self> {
        let r = Reader::new(COMMENTS, doc);
        Ok(Self {
            id: doc.id.clone(),
            post_id: r.string(fields::POST_ID)?,
            uid: r.string(fields::UID)?,
            name: r.optional_string(fields::NAME).unwrap_or_default(),
            avatar: r.optional_string(fields::AVATAR).unwrap_or_default(),
            text: r.string(fields::TEXT)?,
            created_at: r.timestamp(CREATED_AT),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub name_lower: String,
    pub bio: String,
    pub avatar: String,
    pub created_at: Option<Timestamp>,
}

impl UserProfile {
    pub fn current_user(&self) -> CurrentUser {
        CurrentUser::new(&self.uid, &self.name, &self.avatar)
    }
}

impl TryFrom<&Document> for UserProfile {
    type Error = StoreError;

    fn try_from(doc: &Document) -> StoreResult<Self> {
        let r = Reader::new(USERS, doc);
        let name = r.optional_string(fields::NAME).unwrap_or_default();
        Ok(Self {
            uid: r.optional_string(fields::UID).unwrap_or_else(|| doc.id.clone()),
            email: r.optional_string(fields::EMAIL).unwrap_or_default(),
            name_lower: r.optional_string(fields::NAME_LOWER).unwrap_or_else(|| normalize(&name)),
            name,
            bio: r.optional_string(fields::BIO).unwrap_or_default(),
            avatar: r.optional_string(fields::AVATAR).unwrap_or_default(),
            created_at: r.timestamp(CREATED_AT),
        })
    }
}

/// Decode every document, skipping (and logging) the ones that do not fit
/// the schema.
pub fn decode_all<'a, T>(docs: &'a [Document]) -> Vec<T>
where
    T: TryFrom<&'a Document, Error = StoreError>,
{
    docs.iter()
        .filter_map(|doc| match T::try_from(doc) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(id = %doc.id, error = %err, "skipping malformed document");
                None
            }
        })
        .collect()
}

struct Reader<'a> {
    collection: &'static str,
    doc: &'a Document,
}

impl<'a> Reader<'a> {
    fn new(collection: &'static str, doc: &'a Document) -> Self {
        Self { collection, doc }
    }

    fn invalid(&self, path: &str, expected: &str) -> StoreError {
        StoreError::validation(format!(
            "{}/{}: field `{path}` must be {expected}",
            self.collection, self.doc.id
        ))
    }

    fn string(&self, path: &str) -> StoreResult<String> {
        self.doc.str_field(path).map(str::to_string).ok_or_else(|| self.invalid(path, "a string"))
    }

    fn optional_string(&self, path: &str) -> Option<String> {
        self.doc.str_field(path).map(str::to_string)
    }

    fn int_or_zero(&self, path: &str) -> StoreResult<i64> {
        match self.doc.get(path) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value.as_i64().ok_or_else(|| self.invalid(path, "an integer")),
        }
    }

    fn string_set(&self, path: &str) -> StoreResult<BTreeSet<String>> {
        match self.doc.get(path) {
            None | Some(Value::Null) => Ok(BTreeSet::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(|| self.invalid(path, "an array of strings")))
                .collect(),
            Some(_) => Err(self.invalid(path, "an array of strings")),
        }
    }

    fn media(&self, path: &str) -> StoreResult<MediaRef> {
        let url = self.string(&format!("{path}.url"))?;
        let public_id = self.optional_string(&format!("{path}.publicId")).unwrap_or_default();
        Ok(MediaRef { url, public_id })
    }

    fn timestamp(&self, path: &str) -> Option<Timestamp> {
        self.doc.get(path).and_then(Value::as_timestamp)
    }
}
