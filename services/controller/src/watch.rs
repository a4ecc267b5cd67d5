//! Maps store change events to installation keys.

use std::sync::Arc;

use landform_api::{Installation, Object, Resource};
use landform_id::ObjectKey;
use landform_reconcile::WorkQueue;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::installation::list_siblings;
use crate::store::{Client, StoreError, WatchEvent};

/// Keys of the installations that must be reconciled after `event`.
///
/// For an installation this is the installation itself, its parent, and
/// every deleting sibling (whose teardown may have been waiting on it). For
/// an execution it is the owning installation.
pub async fn keys_for_event<C: Client>(
    client: &C,
    event: &WatchEvent,
) -> Result<Vec<ObjectKey>, StoreError> {
    match &event.object {
        Object::Installation(installation) => {
            let key = installation.key();
            let mut keys = vec![key.clone()];
            if let Some(parent) = installation.parent_name() {
                keys.push(key.sibling(parent));
            }
            keys.extend(
                list_siblings(client, installation)
                    .await?
                    .into_iter()
                    .filter(|s| s.metadata.is_deleting())
                    .map(|s| s.key()),
            );
            Ok(keys)
        }
        Object::Execution(execution) => Ok(execution
            .metadata
            .controller_owner()
            .filter(|owner| owner.kind == Installation::KIND)
            .map(|owner| execution.key().sibling(owner.name.clone()))
            .into_iter()
            .collect()),
    }
}

/// Feeds the work queue from the store's event stream until shutdown.
pub async fn run_event_mapper<C: Client>(
    client: Arc<C>,
    queue: Arc<WorkQueue<ObjectKey>>,
    mut events: broadcast::Receiver<WatchEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting event mapper");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => match keys_for_event(client.as_ref(), &event).await {
                    Ok(keys) => {
                        for key in keys {
                            debug!(key = %key, event = ?event.event_type, "Enqueue");
                            queue.add(key).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to map event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, some changes were not enqueued");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!("Event mapper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventType, MemoryStore};
    use landform_api::{
        install, ArtifactReference, Execution, ExecutionSpec, InstallationSpec, ObjectMeta,
        Scheme, ENCOMPASSED_BY_LABEL, FINALIZER,
    };

    fn store() -> MemoryStore {
        let mut scheme = Scheme::new();
        install(&mut scheme);
        MemoryStore::new(scheme)
    }

    fn installation(name: &str) -> Installation {
        Installation::new(
            ObjectMeta::new("default", name),
            InstallationSpec {
                blueprint: ArtifactReference {
                    access_type: "local".into(),
                    name: "bp".into(),
                    version: "v1".into(),
                    digest: None,
                },
                ..Default::default()
            },
        )
    }

    fn modified(object: Object) -> WatchEvent {
        WatchEvent {
            event_type: EventType::Modified,
            object,
        }
    }

    #[tokio::test]
    async fn test_installation_event_enqueues_parent_and_deleting_siblings() {
        let store = store();

        let mut deleting = installation("network");
        deleting.metadata.add_finalizer(FINALIZER);
        store.create(&deleting).await.unwrap();
        store
            .delete::<Installation>(&ObjectKey::new("default", "network"))
            .await
            .unwrap();
        store.create(&installation("idle")).await.unwrap();

        let mut child = installation("db");
        child
            .metadata
            .labels
            .insert(ENCOMPASSED_BY_LABEL.into(), "stack".into());
        store.create(&child).await.unwrap();

        // Root installation: no parent, deleting sibling "network".
        let keys = keys_for_event(&store, &modified(Object::Installation(installation("app"))))
            .await
            .unwrap();
        assert_eq!(
            keys,
            vec![
                ObjectKey::new("default", "app"),
                ObjectKey::new("default", "network"),
            ]
        );

        // Child of "stack": parent enqueued, root siblings are another scope.
        let mut other_child = installation("cache");
        other_child
            .metadata
            .labels
            .insert(ENCOMPASSED_BY_LABEL.into(), "stack".into());
        let keys = keys_for_event(&store, &modified(Object::Installation(other_child)))
            .await
            .unwrap();
        assert_eq!(
            keys,
            vec![
                ObjectKey::new("default", "cache"),
                ObjectKey::new("default", "stack"),
            ]
        );
    }

    #[tokio::test]
    async fn test_execution_event_enqueues_owner() {
        let store = store();
        let owner = store.create(&installation("app")).await.unwrap();

        let mut meta = ObjectMeta::new("default", "app");
        meta.owner_references.extend(owner.controller_reference());
        let execution = Execution::new(meta, ExecutionSpec::default());

        let keys = keys_for_event(&store, &modified(Object::Execution(execution)))
            .await
            .unwrap();
        assert_eq!(keys, vec![ObjectKey::new("default", "app")]);

        let orphan = Execution::new(ObjectMeta::new("default", "x"), ExecutionSpec::default());
        let keys = keys_for_event(&store, &modified(Object::Execution(orphan)))
            .await
            .unwrap();
        assert!(keys.is_empty());
    }
}
