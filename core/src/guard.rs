use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// An (actor, target) pair, e.g. (user id, post id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub actor: String,
    pub target: String,
}

impl PairKey {
    pub fn new(actor: impl Into<String>, target: impl Into<String>) -> Self {
        Self { actor: actor.into(), target: target.into() }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.actor, self.target)
    }
}

/// Keys with a remote mutation outstanding. At most one permit per key
/// exists at any time.
#[derive(Debug, Default)]
pub struct InflightKeys {
    keys: Mutex<HashSet<PairKey>>,
}

impl InflightKeys {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `None` if another mutation already holds `key`.
    pub fn try_acquire(self: &Arc<Self>, key: PairKey) -> Option<InflightPermit> {
        let mut keys = self.keys.lock();
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InflightPermit { owner: Arc::clone(self), key })
    }

    pub fn is_inflight(&self, key: &PairKey) -> bool {
        self.keys.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

/// Releases its key when dropped, whichever way the mutation ended.
#[derive(Debug)]
pub struct InflightPermit {
    owner: Arc<InflightKeys>,
    key: PairKey,
}

impl InflightPermit {
    pub fn key(&self) -> &PairKey {
        &self.key
    }
}

impl Drop for InflightPermit {
    fn drop(&mut self) {
        self.owner.keys.lock().remove(&self.key);
    }
}
