//! Document-store client for the reel app: typed access to a remote
//! per-document-atomic store, set-semantics array updates, prefix search
//! over lower-cased shadow fields, and optimistic toggles with a per-pair
//! in-flight guard.

pub mod array;
pub mod backend;
pub mod client;
pub mod comments;
pub mod config;
pub mod error;
pub mod guard;
pub mod likes;
pub mod memory;
pub mod models;
pub mod optimistic;
pub mod patch;
pub mod persist;
pub mod posts;
pub mod profiles;
pub mod query;
pub mod search;
pub mod value;

pub use array::{ArrayFieldMutator, ArrayOp};
pub use backend::DocumentStore;
pub use client::DocumentStoreClient;
pub use config::ClientConfig;
pub use error::{Envelope, ErrorKind, Outcome, StoreError, StoreResult};
pub use guard::{InflightKeys, InflightPermit, PairKey};
pub use memory::MemoryStore;
pub use optimistic::{MutationError, OptimisticMutationController, ReactionBoard, RemoteToggle, ToggleState, ToggleView};
pub use patch::{FieldOp, Patch};
pub use persist::SledStore;
pub use query::{Direction, FilterOp, Query};
pub use search::PrefixSearchIndex;
pub use value::{Document, Fields, Timestamp, Value};
