mod common;

use common::{client_over, draft, user, Op, ScriptedStore};
use reel_core::likes::{like_id, Likes};
use reel_core::models::{fields, LIKES};
use reel_core::posts::Posts;
use reel_core::{
    ClientConfig, DocumentStoreClient, ErrorKind, InflightKeys, MutationError, OptimisticMutationController, PairKey,
    ReactionBoard, ToggleState,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    store: Arc<ScriptedStore>,
    client: DocumentStoreClient,
    posts: Posts,
    likes: Likes,
    post_id: String,
}

async fn fixture() -> Fixture {
    let store = ScriptedStore::new();
    let client = client_over(store.clone());
    let posts = Posts::new(client.clone());
    let likes = Likes::new(client.clone());
    let post = posts.publish(&user("creator", "Cleo"), draft("clip")).await.unwrap();
    Fixture { store, client, posts, likes, post_id: post.id }
}

impl Fixture {
    async fn seeded_board(&self, uid: &str) -> (Arc<ReactionBoard>, PairKey) {
        let post = self.posts.get(&self.post_id).await.unwrap().unwrap();
        let key = PairKey::new(uid, &self.post_id);
        let board = ReactionBoard::new();
        board.seed(key.clone(), post.is_liked_by(uid), post.like_count());
        (board, key)
    }

    async fn record_count(&self, uid: &str) -> usize {
        let docs = self.client.query_by_field(LIKES, fields::POST_ID, self.post_id.as_str()).await.unwrap();
        docs.iter().filter(|d| d.str_field(fields::UID) == Some(uid)).count()
    }

    async fn in_set(&self, uid: &str) -> bool {
        self.posts.get(&self.post_id).await.unwrap().unwrap().is_liked_by(uid)
    }
}

#[tokio::test]
async fn settled_activate_leaves_one_record_and_set_membership() {
    let fx = fixture().await;
    let (board, key) = fx.seeded_board("u1").await;
    let controller = OptimisticMutationController::new(board, fx.likes.writes(user("u1", "Ann")));

    let view = controller.activate(&key).await.unwrap();
    assert_eq!(view.state, ToggleState::On);
    assert_eq!(view.count, 1);
    assert!(fx.in_set("u1").await);
    assert_eq!(fx.record_count("u1").await, 1);
    assert!(fx.client.get_by_id(LIKES, &like_id(&fx.post_id, "u1")).await.unwrap().is_some());
    assert!(fx.likes.audit(&fx.post_id).await.unwrap().is_consistent());
}

#[tokio::test]
async fn failed_union_reverts_local_state_and_the_record() {
    let fx = fixture().await;
    let (board, key) = fx.seeded_board("u1").await;
    let before = board.view(&key).unwrap();
    let controller = OptimisticMutationController::new(board.clone(), fx.likes.writes(user("u1", "Ann")));

    fx.store.fail(Op::Update, ErrorKind::Network, 1);
    match controller.activate(&key).await {
        Err(MutationError::Reverted { source, view }) => {
            assert_eq!(source.kind, ErrorKind::Network);
            assert_eq!(view, before);
        }
        other => panic!("expected a reverted activate, got {other:?}"),
    }
    assert_eq!(board.view(&key), Some(before));
    assert!(!fx.in_set("u1").await);
    assert_eq!(fx.record_count("u1").await, 0);
}

#[tokio::test]
async fn failed_remove_restores_the_like() {
    let fx = fixture().await;
    let (board, key) = fx.seeded_board("u1").await;
    let controller = OptimisticMutationController::new(board.clone(), fx.likes.writes(user("u1", "Ann")));
    let liked = controller.activate(&key).await.unwrap();

    fx.store.fail(Op::Update, ErrorKind::PermissionDenied, 1);
    assert!(matches!(controller.deactivate(&key).await, Err(MutationError::Reverted { .. })));
    assert_eq!(board.view(&key), Some(liked));
    assert!(fx.in_set("u1").await);
    assert_eq!(fx.record_count("u1").await, 1);
}

#[tokio::test]
async fn deactivate_during_pending_activate_is_rejected_and_state_converges() {
    let fx = fixture().await;
    let (board, key) = fx.seeded_board("u1").await;
    let controller = Arc::new(OptimisticMutationController::new(board.clone(), fx.likes.writes(user("u1", "Ann"))));

    // hold the union so the activate stays pending
    let gate = fx.store.hold(Op::Update);
    let pending = tokio::spawn({
        let controller = controller.clone();
        let key = key.clone();
        async move { controller.activate(&key).await }
    });
    gate.reached.notified().await;
    assert_eq!(board.view(&key).map(|v| v.state), Some(ToggleState::PendingOn));

    let err = controller.deactivate(&key).await.unwrap_err();
    assert!(matches!(err, MutationError::InFlight { .. }));

    gate.release.notify_one();
    assert_eq!(pending.await.unwrap().unwrap().state, ToggleState::On);
    assert_eq!(fx.in_set("u1").await, fx.record_count("u1").await == 1);

    let view = controller.deactivate(&key).await.unwrap();
    assert_eq!(view.state, ToggleState::Off);
    assert!(!fx.in_set("u1").await);
    assert_eq!(fx.record_count("u1").await, 0);
}

#[tokio::test]
async fn controllers_sharing_an_arena_exclude_each_other() {
    let fx = fixture().await;
    let arena = InflightKeys::new();
    let (first_board, key) = fx.seeded_board("u1").await;
    let (second_board, _) = fx.seeded_board("u1").await;
    let first = Arc::new(OptimisticMutationController::with_inflight(
        first_board,
        arena.clone(),
        fx.likes.writes(user("u1", "Ann")),
    ));
    let second = OptimisticMutationController::with_inflight(second_board, arena.clone(), fx.likes.writes(user("u1", "Ann")));

    let gate = fx.store.hold(Op::Update);
    let pending = tokio::spawn({
        let first = first.clone();
        let key = key.clone();
        async move { first.activate(&key).await }
    });
    gate.reached.notified().await;
    assert!(arena.is_inflight(&key));
    assert!(matches!(second.activate(&key).await, Err(MutationError::InFlight { .. })));

    gate.release.notify_one();
    pending.await.unwrap().unwrap();
    assert!(arena.is_empty());
    assert_eq!(fx.record_count("u1").await, 1);
}

#[tokio::test(start_paused = true)]
async fn a_timed_out_write_rolls_back() {
    let store = ScriptedStore::new();
    let config = ClientConfig::default().with_timeout(Duration::from_millis(50)).with_retries(0, Duration::ZERO);
    let client = DocumentStoreClient::with_config(store.clone(), config);
    let posts = Posts::new(client.clone());
    let post = posts.publish(&user("creator", "Cleo"), draft("clip")).await.unwrap();

    let key = PairKey::new("u1", &post.id);
    let board = ReactionBoard::new();
    let before = board.seed(key.clone(), false, 0);
    let controller = OptimisticMutationController::new(board.clone(), Likes::new(client.clone()).writes(user("u1", "Ann")));

    store.delay(Op::Update, Duration::from_secs(5));
    match controller.activate(&key).await {
        Err(MutationError::Reverted { source, .. }) => assert_eq!(source.kind, ErrorKind::Network),
        other => panic!("expected a timeout rollback, got {other:?}"),
    }
    assert_eq!(board.view(&key), Some(before));
    assert!(client.get_all(LIKES).await.unwrap().is_empty());
}
