//! Artifact registries for blueprints and component descriptors.
//!
//! A [`RegistryManager`] dispatches a reference to the backend registered for
//! its access type. Backends of one artifact class share a [`ContentCache`]
//! keyed by content digest.

mod cache;
mod local;
mod manager;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use landform_api::{ArtifactReference, ObjectReference};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use cache::{CacheConfig, CacheStats, ContentCache};
pub use local::{LocalRegistry, LOCAL_ACCESS_TYPE};
pub use manager::RegistryManager;

/// File holding a blueprint inside a local registry version directory.
pub const BLUEPRINT_FILE: &str = "blueprint.json";

/// File holding a component descriptor inside a local registry version directory.
pub const COMPONENT_DESCRIPTOR_FILE: &str = "component-descriptor.json";

/// Errors from artifact resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no registry registered for access type '{0}'")]
    UnsupportedAccessType(String),

    #[error("artifact {0} not found")]
    NotFound(ArtifactReference),

    #[error("invalid artifact reference {reference}: {reason}")]
    InvalidReference {
        reference: ArtifactReference,
        reason: String,
    },

    #[error("digest mismatch for {reference}: pinned {expected}, got {actual}")]
    DigestMismatch {
        reference: ArtifactReference,
        expected: String,
        actual: String,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// Whether retrying cannot help until the installation or the registry
    /// configuration changes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RegistryError::UnsupportedAccessType(_)
                | RegistryError::InvalidReference { .. }
                | RegistryError::DigestMismatch { .. }
        )
    }
}

/// Resolved artifact bytes with their content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub data: Bytes,
    /// `sha256:<hex>`
    pub digest: String,
}

impl Content {
    pub fn new(data: Bytes) -> Self {
        let digest = digest_of(&data);
        Self { data, digest }
    }
}

/// Computes the `sha256:<hex>` digest of a byte slice.
pub fn digest_of(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// A registry backend serving one access type.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the raw bytes of an artifact.
    ///
    /// `credentials` are the pull secrets of the installation being
    /// reconciled; backends that need no authentication ignore them.
    async fn fetch(
        &self,
        reference: &ArtifactReference,
        credentials: &[ObjectReference],
    ) -> Result<Bytes, RegistryError>;
}

/// Configuration of one local registry backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRegistryConfig {
    /// Root directories searched in order.
    pub paths: Vec<PathBuf>,
}

/// Configuration of the registries for one artifact class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryClassConfig {
    #[serde(default)]
    pub local: Option<LocalRegistryConfig>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// Registry configuration for both artifact classes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistriesConfig {
    #[serde(default)]
    pub blueprints: RegistryClassConfig,
    #[serde(default)]
    pub components: RegistryClassConfig,
}

/// The blueprint and component registry managers.
pub struct Registries {
    pub blueprints: RegistryManager,
    pub components: RegistryManager,
}

impl Registries {
    /// Builds both managers, each with its own cache.
    pub fn from_config(config: &RegistriesConfig) -> Self {
        Self {
            blueprints: build_manager(&config.blueprints, BLUEPRINT_FILE),
            components: build_manager(&config.components, COMPONENT_DESCRIPTOR_FILE),
        }
    }
}

fn build_manager(config: &RegistryClassConfig, file_name: &str) -> RegistryManager {
    let cache = config
        .cache
        .clone()
        .map(|cache_config| Arc::new(ContentCache::new(cache_config)));
    let mut manager = RegistryManager::new(cache);
    if let Some(local) = &config.local {
        manager.set(
            LOCAL_ACCESS_TYPE,
            Arc::new(LocalRegistry::new(local.paths.clone(), file_name)),
        );
    }
    manager
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_format() {
        let content = Content::new(Bytes::from_static(b"hello"));
        assert_eq!(
            content.digest,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_config_parses_camel_case() {
        let config: RegistriesConfig = serde_json::from_str(
            r#"{
                "blueprints": {
                    "local": { "paths": ["/srv/blueprints"] },
                    "cache": { "maxSizeBytes": 1024 }
                }
            }"#,
        )
        .unwrap();
        let local = config.blueprints.local.unwrap();
        assert_eq!(local.paths, vec![PathBuf::from("/srv/blueprints")]);
        assert_eq!(config.blueprints.cache.unwrap().max_size_bytes, 1024);
        assert!(config.components.local.is_none());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(RegistryError::UnsupportedAccessType("oci".into()).is_configuration());
        assert!(!RegistryError::NotFound(ArtifactReference::default()).is_configuration());
    }
}
