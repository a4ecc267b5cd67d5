//! In-process resource store.
//!
//! Objects are kept as JSON documents keyed by kind and namespaced name,
//! mirroring how the cluster API stores them. Writes are serialized by a
//! single lock, which gives every mutation the atomicity the [`Client`]
//! contract requires.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use landform_api::{ObjectMeta, Resource, Scheme};
use landform_id::{ObjectKey, ResourceVersion, Uid};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use super::{Client, EventType, StoreError, StoreResult, WatchEvent};

const EVENT_BUFFER: usize = 1024;

type StoreKey = (&'static str, ObjectKey);

/// Write statistics.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub creates: AtomicU64,
    pub updates: AtomicU64,
    pub status_updates: AtomicU64,
    pub deletes: AtomicU64,
}

impl StoreStats {
    /// Total number of mutating requests, successful or not.
    pub fn writes(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
            + self.updates.load(Ordering::Relaxed)
            + self.status_updates.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
    }
}

/// In-memory implementation of [`Client`].
pub struct MemoryStore {
    objects: RwLock<HashMap<StoreKey, Value>>,
    next_version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
    scheme: Scheme,
    stats: StoreStats,
    /// Delete requests per object, including ones that only set a timestamp.
    delete_requests: RwLock<HashMap<StoreKey, u32>>,
    /// Objects whose next write fails with a conflict.
    injected_conflicts: RwLock<HashSet<StoreKey>>,
}

impl MemoryStore {
    /// Create an empty store. `scheme` decodes objects for watch events.
    pub fn new(scheme: Scheme) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            objects: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            events,
            scheme,
            stats: StoreStats::default(),
            delete_requests: RwLock::new(HashMap::new()),
            injected_conflicts: RwLock::new(HashSet::new()),
        }
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Number of delete requests issued for an object.
    pub async fn delete_requests<K: Resource>(&self, key: &ObjectKey) -> u32 {
        self.delete_requests
            .read()
            .await
            .get(&(K::KIND, key.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Make the next write to an object fail with a conflict.
    pub async fn inject_conflict<K: Resource>(&self, key: &ObjectKey) {
        self.injected_conflicts
            .write()
            .await
            .insert((K::KIND, key.clone()));
    }

    /// Returns true if the object is currently stored.
    pub async fn contains<K: Resource>(&self, key: &ObjectKey) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(K::KIND, key.clone()))
    }

    fn next_resource_version(&self) -> ResourceVersion {
        ResourceVersion::new(self.next_version.fetch_add(1, Ordering::SeqCst))
    }

    fn publish(&self, event_type: EventType, value: &Value) {
        // No receivers is fine; the controller may not be running yet.
        if self.events.receiver_count() == 0 {
            return;
        }
        match self.scheme.decode(value.clone()) {
            Ok(object) => {
                let _ = self.events.send(WatchEvent { event_type, object });
            }
            Err(e) => warn!(error = %e, "Dropping watch event for undecodable object"),
        }
    }

    async fn take_injected_conflict(&self, store_key: &StoreKey) -> bool {
        self.injected_conflicts.write().await.remove(store_key)
    }

    fn conflict<K: Resource>(key: &ObjectKey) -> StoreError {
        StoreError::Conflict {
            kind: K::KIND,
            key: key.clone(),
        }
    }

    fn not_found<K: Resource>(key: &ObjectKey) -> StoreError {
        StoreError::NotFound {
            kind: K::KIND,
            key: key.clone(),
        }
    }
}

fn read_meta(value: &Value) -> StoreResult<ObjectMeta> {
    let meta = value
        .get("metadata")
        .cloned()
        .ok_or_else(|| StoreError::Serialization("object has no metadata".to_string()))?;
    Ok(serde_json::from_value(meta)?)
}

fn write_meta(value: &mut Value, meta: &ObjectMeta) -> StoreResult<()> {
    value["metadata"] = serde_json::to_value(meta)?;
    Ok(())
}

#[async_trait]
impl Client for MemoryStore {
    async fn get<K: Resource>(&self, key: &ObjectKey) -> StoreResult<K> {
        let objects = self.objects.read().await;
        let value = objects
            .get(&(K::KIND, key.clone()))
            .ok_or_else(|| Self::not_found::<K>(key))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    async fn list<K: Resource>(&self, namespace: &str) -> StoreResult<Vec<K>> {
        let objects = self.objects.read().await;
        let mut matching: Vec<(&ObjectKey, &Value)> = objects
            .iter()
            .filter(|((kind, key), _)| *kind == K::KIND && key.namespace() == namespace)
            .map(|((_, key), value)| (key, value))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        matching
            .into_iter()
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn create<K: Resource>(&self, obj: &K) -> StoreResult<K> {
        self.stats.creates.fetch_add(1, Ordering::Relaxed);
        obj.validate()?;

        let key = obj.key();
        let store_key = (K::KIND, key.clone());
        let mut objects = self.objects.write().await;
        if objects.contains_key(&store_key) {
            return Err(StoreError::AlreadyExists { kind: K::KIND, key });
        }

        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.uid = Some(Uid::new());
        meta.resource_version = Some(self.next_resource_version());
        meta.generation = 1;
        meta.creation_timestamp = Some(Utc::now());
        meta.deletion_timestamp = None;

        let value = serde_json::to_value(&created)?;
        objects.insert(store_key, value.clone());
        drop(objects);

        debug!(kind = K::KIND, object = %key, "Created object");
        self.publish(EventType::Added, &value);
        Ok(created)
    }

    async fn update<K: Resource>(&self, obj: &K) -> StoreResult<K> {
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        obj.validate()?;

        let key = obj.key();
        let store_key = (K::KIND, key.clone());
        if self.take_injected_conflict(&store_key).await {
            return Err(Self::conflict::<K>(&key));
        }

        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&store_key)
            .ok_or_else(|| Self::not_found::<K>(&key))?;
        let stored_meta = read_meta(stored)?;
        if stored_meta.resource_version != obj.meta().resource_version {
            return Err(Self::conflict::<K>(&key));
        }

        let mut next = serde_json::to_value(obj)?;
        let spec_changed = next.get("spec") != stored.get("spec");
        next["status"] = stored.get("status").cloned().unwrap_or(Value::Null);

        let mut meta = read_meta(&next)?;
        meta.uid = stored_meta.uid;
        meta.creation_timestamp = stored_meta.creation_timestamp;
        meta.deletion_timestamp = stored_meta.deletion_timestamp;
        meta.generation = if spec_changed {
            stored_meta.generation + 1
        } else {
            stored_meta.generation
        };
        meta.resource_version = Some(self.next_resource_version());
        write_meta(&mut next, &meta)?;

        if meta.is_deleting() && meta.finalizers.is_empty() {
            objects.remove(&store_key);
            drop(objects);
            debug!(kind = K::KIND, object = %key, "Last finalizer removed, object purged");
            self.publish(EventType::Deleted, &next);
        } else {
            objects.insert(store_key, next.clone());
            drop(objects);
            self.publish(EventType::Modified, &next);
        }

        Ok(serde_json::from_value(next)?)
    }

    async fn update_status<K: Resource>(&self, obj: &K) -> StoreResult<K> {
        self.stats.status_updates.fetch_add(1, Ordering::Relaxed);

        let key = obj.key();
        let store_key = (K::KIND, key.clone());
        if self.take_injected_conflict(&store_key).await {
            return Err(Self::conflict::<K>(&key));
        }

        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&store_key)
            .ok_or_else(|| Self::not_found::<K>(&key))?;
        let mut meta = read_meta(stored)?;
        if meta.resource_version != obj.meta().resource_version {
            return Err(Self::conflict::<K>(&key));
        }

        let incoming = serde_json::to_value(obj)?;
        stored["status"] = incoming.get("status").cloned().unwrap_or(Value::Null);
        meta.resource_version = Some(self.next_resource_version());
        write_meta(stored, &meta)?;
        let next = stored.clone();
        drop(objects);

        self.publish(EventType::Modified, &next);
        Ok(serde_json::from_value(next)?)
    }

    async fn delete<K: Resource>(&self, key: &ObjectKey) -> StoreResult<()> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        let store_key = (K::KIND, key.clone());
        *self
            .delete_requests
            .write()
            .await
            .entry(store_key.clone())
            .or_insert(0) += 1;

        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&store_key)
            .ok_or_else(|| Self::not_found::<K>(key))?;
        let mut meta = read_meta(stored)?;

        if meta.finalizers.is_empty() {
            let last = objects.remove(&store_key);
            drop(objects);
            debug!(kind = K::KIND, object = %key, "Object purged");
            if let Some(last) = last {
                self.publish(EventType::Deleted, &last);
            }
            return Ok(());
        }

        if meta.is_deleting() {
            return Ok(());
        }

        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = Some(self.next_resource_version());
        write_meta(stored, &meta)?;
        let next = stored.clone();
        drop(objects);

        debug!(
            kind = K::KIND,
            object = %key,
            finalizers = ?meta.finalizers,
            "Deletion requested, waiting for finalizers"
        );
        self.publish(EventType::Modified, &next);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
