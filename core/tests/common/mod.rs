#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reel_core::backend::DocumentStore;
use reel_core::models::{CurrentUser, MediaRef};
use reel_core::posts::NewPost;
use reel_core::{ClientConfig, Document, DocumentStoreClient, ErrorKind, MemoryStore, Patch, Query, StoreError, StoreResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Query,
    Set,
    Update,
    Delete,
}

/// Pauses one call until released.
#[derive(Default)]
pub struct Gate {
    pub reached: Notify,
    pub release: Notify,
}

/// Memory store with scripted failures, delays and pause points.
#[derive(Default)]
pub struct ScriptedStore {
    inner: MemoryStore,
    failures: Mutex<HashMap<Op, VecDeque<ErrorKind>>>,
    delays: Mutex<HashMap<Op, Duration>>,
    gates: Mutex<HashMap<Op, Arc<Gate>>>,
    calls: Mutex<HashMap<Op, usize>>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `times` calls of `op` fail with `kind`.
    pub fn fail(&self, op: Op, kind: ErrorKind, times: usize) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(op).or_default();
        queue.extend(std::iter::repeat(kind).take(times));
    }

    pub fn delay(&self, op: Op, by: Duration) {
        self.delays.lock().insert(op, by);
    }

    /// The next call of `op` waits until the returned gate is released.
    pub fn hold(&self, op: Op) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().insert(op, gate.clone());
        gate
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    async fn before(&self, op: Op) -> StoreResult<()> {
        *self.calls.lock().entry(op).or_default() += 1;
        let gate = self.gates.lock().remove(&op);
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        let delay = self.delays.lock().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front);
        match failure {
            Some(kind) => Err(StoreError::new(kind, format!("scripted {op:?} failure"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.before(Op::Get).await?;
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        self.before(Op::Query).await?;
        self.inner.query(collection, query).await
    }

    async fn set(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        self.before(Op::Set).await?;
        self.inner.set(collection, id, patch).await
    }

    async fn update(&self, collection: &str, id: &str, patch: &Patch) -> StoreResult<()> {
        self.before(Op::Update).await?;
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.before(Op::Delete).await?;
        self.inner.delete(collection, id).await
    }
}

/// Client without retries, so scripted failures surface on the first try.
pub fn client_over(store: Arc<ScriptedStore>) -> DocumentStoreClient {
    let config = ClientConfig::default().with_retries(0, Duration::ZERO);
    DocumentStoreClient::with_config(store, config)
}

pub fn user(uid: &str, name: &str) -> CurrentUser {
    CurrentUser::new(uid, name, format!("https://cdn/{uid}.png"))
}

pub fn draft(title: &str) -> NewPost {
    NewPost {
        title: title.to_string(),
        description: String::new(),
        video: MediaRef { url: format!("https://cdn/{title}.mp4"), public_id: title.to_string() },
        thumbnail: MediaRef::default(),
    }
}
