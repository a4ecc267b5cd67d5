//! Resource store access.
//!
//! The controller talks to the cluster's resource store only through the
//! [`Client`] trait. The store provides per-object optimistic concurrency
//! (every write carries the resource version it was read at), finalizer
//! aware deletion, and a stream of change events.
//!
//! [`MemoryStore`] implements the contract in process for development mode
//! and tests.

mod memory;

use async_trait::async_trait;
use landform_api::{ApiError, Object, Resource};
use landform_id::ObjectKey;
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::{MemoryStore, StoreStats};

/// Errors returned by the resource store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    /// The stored resource version moved since the object was read.
    #[error("conflict writing {kind} {key}: the object has been modified")]
    Conflict { kind: &'static str, key: ObjectKey },

    #[error("invalid object: {0}")]
    Invalid(#[from] ApiError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of change reported by the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A change to a stored object.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: EventType,
    /// The object after the change, or its last state when deleted.
    pub object: Object,
}

/// Access to the resource store.
///
/// Every mutation is a single atomic request: it either applies completely
/// or not at all.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Fetch one object.
    async fn get<K: Resource>(&self, key: &ObjectKey) -> StoreResult<K>;

    /// List all objects of a kind in a namespace, ordered by name.
    async fn list<K: Resource>(&self, namespace: &str) -> StoreResult<Vec<K>>;

    /// Create an object. The store assigns uid, resource version and
    /// generation.
    async fn create<K: Resource>(&self, obj: &K) -> StoreResult<K>;

    /// Update metadata and spec. The status in `obj` is ignored.
    ///
    /// Fails with [`StoreError::Conflict`] if the resource version moved.
    /// Removing the last finalizer of a deleting object purges it.
    async fn update<K: Resource>(&self, obj: &K) -> StoreResult<K>;

    /// Update only the status subresource.
    async fn update_status<K: Resource>(&self, obj: &K) -> StoreResult<K>;

    /// Request deletion. Objects with finalizers get a deletion timestamp;
    /// objects without are purged immediately.
    async fn delete<K: Resource>(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
