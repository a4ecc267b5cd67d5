//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use landform_api::{install, ArtifactReference, Installation, InstallationSpec, ObjectMeta, Scheme};
use landform_controller::installation::{Actuator, ActuatorConfig, SharedOperation};
use landform_controller::registry::{
    LocalRegistryConfig, Registries, RegistriesConfig, RegistryClassConfig, BLUEPRINT_FILE,
    COMPONENT_DESCRIPTOR_FILE, LOCAL_ACCESS_TYPE,
};
use landform_controller::store::{Client, MemoryStore};
use landform_id::ObjectKey;
use landform_reconcile::{Action, Reconciler};
use tempfile::TempDir;

pub const NAMESPACE: &str = "default";
pub const RETRY: Duration = Duration::from_millis(50);

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub actuator: Actuator<MemoryStore>,
    dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registries(|_| {})
    }

    /// Builds the harness with local registries rooted in a temp dir, then
    /// lets the caller adjust them.
    pub fn with_registries(customize: impl FnOnce(&mut Registries)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let local = |sub: &str| RegistryClassConfig {
            local: Some(LocalRegistryConfig {
                paths: vec![dir.path().join(sub)],
            }),
            cache: None,
        };
        let mut registries = Registries::from_config(&RegistriesConfig {
            blueprints: local("blueprints"),
            components: local("components"),
        });
        customize(&mut registries);

        let mut scheme = Scheme::new();
        install(&mut scheme);
        let store = Arc::new(MemoryStore::new(scheme));
        let operation = Arc::new(SharedOperation::new(Arc::clone(&store), Arc::new(registries)));
        let actuator = Actuator::new(
            operation,
            ActuatorConfig {
                blocked_retry_interval: RETRY,
            },
        );
        Self {
            store,
            actuator,
            dir,
        }
    }

    fn write(&self, class: &str, name: &str, version: &str, file: &str, body: &serde_json::Value) -> PathBuf {
        let dir = self.dir.path().join(class).join(name).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        std::fs::write(&path, serde_json::to_vec(body).unwrap()).unwrap();
        path
    }

    pub fn write_blueprint(&self, name: &str, version: &str, body: serde_json::Value) {
        self.write("blueprints", name, version, BLUEPRINT_FILE, &body);
    }

    pub fn write_raw_blueprint(&self, name: &str, version: &str, raw: &str) {
        let dir = self.dir.path().join("blueprints").join(name).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(BLUEPRINT_FILE), raw).unwrap();
    }

    pub fn write_component(&self, name: &str, version: &str, body: serde_json::Value) {
        self.write("components", name, version, COMPONENT_DESCRIPTOR_FILE, &body);
    }

    /// A blueprint without children.
    pub fn write_leaf_blueprint(&self, name: &str) {
        self.write_blueprint(name, "v1", serde_json::json!({ "name": name }));
    }

    pub async fn create(&self, installation: Installation) -> Installation {
        self.store.create(&installation).await.unwrap()
    }

    pub async fn get(&self, name: &str) -> Installation {
        self.store.get(&key(name)).await.unwrap()
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.store.contains::<Installation>(&key(name)).await
    }

    pub async fn reconcile(&self, name: &str) -> Action {
        self.actuator.reconcile(&key(name)).await.unwrap()
    }

    /// Reconciles until the actuator stops asking for an immediate requeue.
    pub async fn settle(&self, name: &str) -> Action {
        for _ in 0..10 {
            let action = self.reconcile(name).await;
            if action != Action::Requeue {
                return action;
            }
        }
        panic!("{name} did not settle");
    }

    pub fn writes(&self) -> u64 {
        self.store.stats().writes()
    }
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub fn local_ref(name: &str) -> ArtifactReference {
    ArtifactReference {
        access_type: LOCAL_ACCESS_TYPE.to_string(),
        name: name.to_string(),
        version: "v1".to_string(),
        digest: None,
    }
}

pub fn installation(name: &str, blueprint: &str) -> Installation {
    Installation::new(
        ObjectMeta::new(NAMESPACE, name),
        InstallationSpec {
            blueprint: local_ref(blueprint),
            ..Default::default()
        },
    )
}
