use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use reel_core::comments::Comments;
use reel_core::likes::Likes;
use reel_core::models::{Comment, CurrentUser, Like, Post, UserProfile};
use reel_core::posts::{NewPost, PostEdit, Posts, Removed};
use reel_core::profiles::{ProfileEdit, Profiles};
use reel_core::{
    DocumentStoreClient, Envelope, InflightKeys, OptimisticMutationController, PairKey, ReactionBoard, StoreError,
    ToggleView,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod error;

pub use error::ApiError;

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub posts: Posts,
    pub likes: Likes,
    pub comments: Comments,
    pub profiles: Profiles,
    /// Like/unlike requests currently running, process-wide.
    pub inflight: Arc<InflightKeys>,
}

impl AppState {
    pub fn new(client: DocumentStoreClient) -> Self {
        Self {
            posts: Posts::new(client.clone()),
            likes: Likes::new(client.clone()),
            comments: Comments::new(client.clone()),
            profiles: Profiles::new(client),
            inflight: InflightKeys::new(),
        }
    }
}

/// Caller identity, set by the authenticating proxy in front of us.
pub struct Actor(pub CurrentUser);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_headers(&parts.headers).ok_or(ApiError::Unauthenticated)
    }
}

impl Actor {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());
        let uid = header("X-User-Id")?;
        let name = header("X-User-Name").unwrap_or(uid);
        let avatar = header("X-User-Avatar").unwrap_or("");
        Some(Actor(CurrentUser::new(uid, name, avatar)))
    }
}

#[derive(Deserialize)]
pub struct FeedParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 20 }

#[derive(Deserialize)]
pub struct CreatorParams {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct NewComment {
    pub text: String,
}

#[derive(Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub email: String,
}

pub fn build_app(client: DocumentStoreClient) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/posts", get(feed).post(publish))
        .route("/posts/:id", get(get_post).patch(edit_post).delete(remove_post))
        .route("/posts/:id/views", post(record_view))
        .route("/posts/:id/like", post(like).delete(unlike))
        .route("/posts/:id/likes", get(likers))
        .route("/posts/:id/comments", get(comments_for).post(add_comment))
        .route("/comments/:id", delete(remove_comment))
        .route("/search", get(search))
        .route("/users", post(register))
        .route("/users/:uid", get(get_profile).put(update_profile))
        .route("/creators", get(creators))
        .with_state(AppState::new(client))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

async fn feed(State(state): State<AppState>, Query(params): Query<FeedParams>) -> ApiResult<Vec<Post>> {
    ok(state.posts.feed(params.limit).await?)
}

async fn publish(
    State(state): State<AppState>,
    Actor(user): Actor,
    Json(body): Json<NewPost>,
) -> Result<(StatusCode, Json<Envelope<Post>>), ApiError> {
    let post = state.posts.publish(&user, body).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(post))))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Post> {
    let post = state.posts.get(&id).await?.ok_or_else(|| StoreError::not_found(format!("post {id}")))?;
    ok(post)
}

async fn edit_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Actor(user): Actor,
    Json(edit): Json<PostEdit>,
) -> ApiResult<Post> {
    ok(state.posts.edit_details(&user, &id, edit).await?)
}

async fn remove_post(State(state): State<AppState>, Path(id): Path<String>, Actor(user): Actor) -> ApiResult<Removed> {
    ok(state.posts.remove(&user, &id).await?)
}

async fn record_view(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.posts.record_view(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like(State(state): State<AppState>, Path(id): Path<String>, Actor(user): Actor) -> ApiResult<ToggleView> {
    set_like(&state, user, &id, true).await
}

async fn unlike(State(state): State<AppState>, Path(id): Path<String>, Actor(user): Actor) -> ApiResult<ToggleView> {
    set_like(&state, user, &id, false).await
}

/// Each request drives its own board. The post is read under the pair's
/// permit from the shared arena, so a like and an unlike for one pair never
/// interleave; the loser gets 409.
async fn set_like(state: &AppState, user: CurrentUser, post_id: &str, on: bool) -> ApiResult<ToggleView> {
    let key = PairKey::new(user.uid.as_str(), post_id);
    let uid = user.uid.clone();
    let controller =
        OptimisticMutationController::with_inflight(ReactionBoard::new(), state.inflight.clone(), state.likes.writes(user));
    let view = controller
        .set_loaded(&key, on, || async {
            let post = state.posts.get(post_id).await?.ok_or_else(|| StoreError::not_found(format!("post {post_id}")))?;
            Ok::<_, StoreError>((post.is_liked_by(&uid), post.like_count()))
        })
        .await?;
    ok(view)
}

async fn likers(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Like>> {
    ok(state.likes.likers(&id).await?)
}

async fn comments_for(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Comment>> {
    ok(state.comments.for_post(&id).await?)
}

async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Actor(user): Actor,
    Json(body): Json<NewComment>,
) -> Result<(StatusCode, Json<Envelope<Comment>>), ApiError> {
    let comment = state.comments.add(&user, &id, &body.text).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(comment))))
}

async fn remove_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Actor(user): Actor,
) -> Result<StatusCode, ApiError> {
    state.comments.remove(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<Post>> {
    let mut posts = state.posts.search(&params.q).await?;
    posts.truncate(params.k.clamp(1, 100));
    ok(posts)
}

async fn register(
    State(state): State<AppState>,
    Actor(user): Actor,
    Json(body): Json<Registration>,
) -> ApiResult<UserProfile> {
    ok(state.profiles.register(&user, &body.email).await?)
}

async fn get_profile(State(state): State<AppState>, Path(uid): Path<String>) -> ApiResult<UserProfile> {
    let profile = state.profiles.get(&uid).await?.ok_or_else(|| StoreError::not_found(format!("user {uid}")))?;
    ok(profile)
}

async fn update_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Actor(user): Actor,
    Json(edit): Json<ProfileEdit>,
) -> ApiResult<UserProfile> {
    if user.uid != uid {
        return Err(StoreError::permission_denied("profiles can only be edited by their owner").into());
    }
    ok(state.profiles.update(&uid, edit).await?)
}

async fn creators(State(state): State<AppState>, Query(params): Query<CreatorParams>) -> ApiResult<Vec<UserProfile>> {
    ok(state.profiles.creators(params.q.as_deref()).await?)
}
