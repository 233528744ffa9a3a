//! Local-first toggles (like/unlike) backed by remote writes.
//!
//! The visible state lives in a [`ReactionBoard`] owned by the caller. A
//! transition flips the board immediately, runs the remote writes, and
//! either confirms or reverts. [`InflightKeys`] keeps at most one
//! transition per (actor, target) pair outstanding; a second request for a
//! busy pair is rejected, never queued.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::error::StoreResult;
use crate::guard::{InflightKeys, InflightPermit, PairKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleState {
    Off,
    PendingOn,
    On,
    PendingOff,
}

impl ToggleState {
    /// What the UI shows: pending states already display their target.
    pub fn is_active(self) -> bool {
        matches!(self, ToggleState::PendingOn | ToggleState::On)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, ToggleState::PendingOn | ToggleState::PendingOff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleView {
    pub state: ToggleState,
    pub active: bool,
    pub count: i64,
}

impl ToggleView {
    fn of(state: ToggleState, count: i64) -> Self {
        Self { state, active: state.is_active(), count }
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("a mutation for {key} is already in flight")]
    InFlight { key: PairKey },
    #[error("no toggle state tracked for {key}")]
    NotTracked { key: PairKey },
    /// The confirmed state could not be read before starting.
    #[error("could not load toggle state: {0}")]
    Load(#[from] StoreError),
    /// The remote writes failed and the board was put back.
    #[error("remote write failed and was reverted: {source}")]
    Reverted {
        #[source]
        source: StoreError,
        view: ToggleView,
    },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: ToggleState,
    count: i64,
    generation: u64,
}

#[derive(Debug, Default)]
struct BoardInner {
    entries: HashMap<PairKey, Entry>,
    next_generation: u64,
}

/// Injectable container for toggle state, shared by reference between the
/// controller and whatever renders it.
#[derive(Debug, Default)]
pub struct ReactionBoard {
    inner: Mutex<BoardInner>,
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    On,
    Off,
    Flip,
}

enum Begin {
    Started { on: bool, generation: u64, view: ToggleView },
    Unchanged(ToggleView),
}

impl ReactionBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start tracking `key` from a confirmed remote state. Re-seeding a
    /// pair detaches any transition still running for it.
    pub fn seed(&self, key: PairKey, active: bool, count: i64) -> ToggleView {
        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let state = if active { ToggleState::On } else { ToggleState::Off };
        let entry = Entry { state, count, generation: inner.next_generation };
        inner.entries.insert(key, entry);
        ToggleView::of(state, count)
    }

    pub fn view(&self, key: &PairKey) -> Option<ToggleView> {
        self.inner.lock().entries.get(key).map(|e| ToggleView::of(e.state, e.count))
    }

    /// Stop tracking `key`. A transition that completes afterwards leaves
    /// the board alone.
    pub fn forget(&self, key: &PairKey) {
        self.inner.lock().entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self, key: &PairKey, intent: Intent) -> Result<Begin, MutationError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(key)
            .ok_or_else(|| MutationError::NotTracked { key: key.clone() })?;
        let on = match (intent, entry.state) {
            (_, ToggleState::PendingOn | ToggleState::PendingOff) => {
                return Err(MutationError::InFlight { key: key.clone() })
            }
            (Intent::On, _) => true,
            (Intent::Off, _) => false,
            (Intent::Flip, settled) => !settled.is_active(),
        };
        match (entry.state, on) {
            (ToggleState::Off, true) => {
                entry.state = ToggleState::PendingOn;
                entry.count += 1;
            }
            (ToggleState::On, false) => {
                entry.state = ToggleState::PendingOff;
                entry.count -= 1;
            }
            _ => return Ok(Begin::Unchanged(ToggleView::of(entry.state, entry.count))),
        }
        Ok(Begin::Started { on, generation: entry.generation, view: ToggleView::of(entry.state, entry.count) })
    }

    /// Confirm or revert a transition started under `generation`. `None`
    /// when the pair has since been forgotten or re-seeded.
    fn settle(&self, key: &PairKey, generation: u64, succeeded: bool) -> Option<ToggleView> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(key).filter(|e| e.generation == generation)?;
        entry.state = match (entry.state, succeeded) {
            (ToggleState::PendingOn, true) => ToggleState::On,
            (ToggleState::PendingOff, true) => ToggleState::Off,
            (ToggleState::PendingOn, false) => {
                entry.count -= 1;
                ToggleState::Off
            }
            (ToggleState::PendingOff, false) => {
                entry.count += 1;
                ToggleState::On
            }
            (settled, _) => settled,
        };
        Some(ToggleView::of(entry.state, entry.count))
    }
}

/// The remote half of a toggle. Each call may issue several writes; on
/// error the implementation undoes what it can before returning.
#[async_trait]
pub trait RemoteToggle: Send + Sync {
    async fn switch_on(&self, key: &PairKey) -> StoreResult<()>;
    async fn switch_off(&self, key: &PairKey) -> StoreResult<()>;
}

pub struct OptimisticMutationController<R> {
    board: Arc<ReactionBoard>,
    inflight: Arc<InflightKeys>,
    remote: R,
}

impl<R: RemoteToggle> OptimisticMutationController<R> {
    pub fn new(board: Arc<ReactionBoard>, remote: R) -> Self {
        Self::with_inflight(board, InflightKeys::new(), remote)
    }

    /// Share the in-flight arena with other controllers, e.g. one per
    /// request over the same process-wide guard.
    pub fn with_inflight(board: Arc<ReactionBoard>, inflight: Arc<InflightKeys>, remote: R) -> Self {
        Self { board, inflight, remote }
    }

    pub fn board(&self) -> &Arc<ReactionBoard> {
        &self.board
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub async fn activate(&self, key: &PairKey) -> Result<ToggleView, MutationError> {
        let _permit = self.acquire(key)?;
        self.transition(key, Intent::On).await
    }

    pub async fn deactivate(&self, key: &PairKey) -> Result<ToggleView, MutationError> {
        let _permit = self.acquire(key)?;
        self.transition(key, Intent::Off).await
    }

    /// Flip from the current confirmed state.
    pub async fn toggle(&self, key: &PairKey) -> Result<ToggleView, MutationError> {
        let _permit = self.acquire(key)?;
        self.transition(key, Intent::Flip).await
    }

    /// Seed `key` from `load` and drive it to `on`, holding the pair's
    /// permit across both so no other transition for the pair can land
    /// between the read and the writes.
    pub async fn set_loaded<F, Fut>(&self, key: &PairKey, on: bool, load: F) -> Result<ToggleView, MutationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<(bool, i64)>>,
    {
        let _permit = self.acquire(key)?;
        let (active, count) = load().await?;
        self.board.seed(key.clone(), active, count);
        self.transition(key, if on { Intent::On } else { Intent::Off }).await
    }

    fn acquire(&self, key: &PairKey) -> Result<InflightPermit, MutationError> {
        self.inflight.try_acquire(key.clone()).ok_or_else(|| MutationError::InFlight { key: key.clone() })
    }

    /// Callers hold the pair's permit.
    async fn transition(&self, key: &PairKey, intent: Intent) -> Result<ToggleView, MutationError> {
        let (on, generation, optimistic) = match self.board.begin(key, intent)? {
            Begin::Unchanged(view) => return Ok(view),
            Begin::Started { on, generation, view } => (on, generation, view),
        };
        debug!(%key, on, count = optimistic.count, "optimistic transition applied");

        let result = if on { self.remote.switch_on(key).await } else { self.remote.switch_off(key).await };

        match result {
            Ok(()) => {
                let confirmed = if on { ToggleState::On } else { ToggleState::Off };
                let view = self.board.settle(key, generation, true).unwrap_or_else(|| {
                    debug!(%key, "transition settled after its view was dropped");
                    ToggleView::of(confirmed, optimistic.count)
                });
                Ok(view)
            }
            Err(source) => {
                let prior = if on { ToggleState::Off } else { ToggleState::On };
                let fallback = ToggleView::of(prior, if on { optimistic.count - 1 } else { optimistic.count + 1 });
                let view = self.board.settle(key, generation, false).unwrap_or(fallback);
                warn!(%key, on, error = %source, "remote toggle failed, reverted");
                Err(MutationError::Reverted { source, view })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Scripted {
        fail: AtomicBool,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl RemoteToggle for Scripted {
        async fn switch_on(&self, _key: &PairKey) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::network("offline"));
            }
            Ok(())
        }

        async fn switch_off(&self, key: &PairKey) -> StoreResult<()> {
            self.switch_on(key).await
        }
    }

    fn key() -> PairKey {
        PairKey::new("u1", "p1")
    }

    #[tokio::test]
    async fn success_settles_in_target_state() {
        let board = ReactionBoard::new();
        board.seed(key(), false, 3);
        let controller = OptimisticMutationController::new(board.clone(), Scripted::default());

        let view = controller.activate(&key()).await.unwrap();
        assert_eq!(view, ToggleView { state: ToggleState::On, active: true, count: 4 });
        let view = controller.toggle(&key()).await.unwrap();
        assert_eq!(view, ToggleView { state: ToggleState::Off, active: false, count: 3 });
    }

    #[tokio::test]
    async fn failure_reverts_state_and_count() {
        let board = ReactionBoard::new();
        let before = board.seed(key(), false, 3);
        let remote = Scripted::default();
        remote.fail.store(true, Ordering::SeqCst);
        let controller = OptimisticMutationController::new(board.clone(), remote);

        match controller.activate(&key()).await {
            Err(MutationError::Reverted { view, .. }) => assert_eq!(view, before),
            other => panic!("expected a reverted mutation, got {other:?}"),
        }
        assert_eq!(board.view(&key()), Some(before));
    }

    #[tokio::test]
    async fn repeated_activate_is_a_no_op() {
        let board = ReactionBoard::new();
        board.seed(key(), true, 1);
        let controller = OptimisticMutationController::new(board, Scripted::default());
        let view = controller.activate(&key()).await.unwrap();
        assert_eq!(view.count, 1);
        assert_eq!(controller.remote().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn untracked_pair_is_an_error() {
        let controller = OptimisticMutationController::new(ReactionBoard::new(), Scripted::default());
        assert!(matches!(controller.activate(&key()).await, Err(MutationError::NotTracked { .. })));
    }

    #[tokio::test]
    async fn second_request_while_pending_is_rejected() {
        let gate = Arc::new(Notify::new());
        let board = ReactionBoard::new();
        board.seed(key(), false, 0);
        let remote = Scripted { gate: Some(gate.clone()), ..Default::default() };
        let controller = Arc::new(OptimisticMutationController::new(board.clone(), remote));

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.activate(&key()).await }
        });
        while controller.remote().calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(board.view(&key()).map(|v| v.state), Some(ToggleState::PendingOn));
        assert!(matches!(controller.deactivate(&key()).await, Err(MutationError::InFlight { .. })));

        gate.notify_one();
        let view = first.await.unwrap().unwrap();
        assert_eq!(view.state, ToggleState::On);
        assert_eq!(controller.remote().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_completion_does_not_touch_a_forgotten_view() {
        let gate = Arc::new(Notify::new());
        let board = ReactionBoard::new();
        board.seed(key(), false, 0);
        let remote = Scripted { gate: Some(gate.clone()), ..Default::default() };
        let controller = Arc::new(OptimisticMutationController::new(board.clone(), remote));

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.activate(&key()).await }
        });
        while controller.remote().calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        board.forget(&key());
        gate.notify_one();
        pending.await.unwrap().unwrap();
        assert!(board.view(&key()).is_none());
    }

    #[tokio::test]
    async fn loading_holds_the_pair_against_other_transitions() {
        let loaded = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let board = ReactionBoard::new();
        let controller = Arc::new(OptimisticMutationController::new(board.clone(), Scripted::default()));

        let pending = tokio::spawn({
            let controller = controller.clone();
            let (loaded, release) = (loaded.clone(), release.clone());
            async move {
                controller
                    .set_loaded(&key(), false, || async move {
                        loaded.notify_one();
                        release.notified().await;
                        Ok::<_, StoreError>((true, 5))
                    })
                    .await
            }
        });
        loaded.notified().await;
        assert!(matches!(controller.activate(&key()).await, Err(MutationError::InFlight { .. })));
        assert!(matches!(controller.toggle(&key()).await, Err(MutationError::InFlight { .. })));

        release.notify_one();
        let view = pending.await.unwrap().unwrap();
        assert_eq!(view, ToggleView { state: ToggleState::Off, active: false, count: 4 });
        assert_eq!(controller.remote().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_starts_nothing() {
        let board = ReactionBoard::new();
        let controller = OptimisticMutationController::new(board.clone(), Scripted::default());
        let result = controller.set_loaded(&key(), true, || async { Err::<(bool, i64), _>(StoreError::not_found("post p1")) }).await;
        assert!(matches!(result, Err(MutationError::Load(ref err)) if err.is_not_found()));
        assert!(board.is_empty());
        assert_eq!(controller.remote().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn toggle_follows_the_settled_state() {
        let board = ReactionBoard::new();
        board.seed(key(), true, 2);
        let controller = OptimisticMutationController::new(board.clone(), Scripted::default());
        assert_eq!(controller.toggle(&key()).await.unwrap().state, ToggleState::Off);
        assert_eq!(controller.toggle(&key()).await.unwrap().state, ToggleState::On);
        assert_eq!(board.view(&key()).map(|v| v.count), Some(2));
        assert_eq!(controller.remote().calls.load(Ordering::SeqCst), 2);
    }
}
