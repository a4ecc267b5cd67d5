//! Access-type dispatch over registry backends.

use std::collections::HashMap;
use std::sync::Arc;

use landform_api::{ArtifactReference, ObjectReference};
use tracing::{debug, info};

use super::{Content, ContentCache, Registry, RegistryError};

/// Resolves artifact references through the backend registered for their
/// access type.
pub struct RegistryManager {
    backends: HashMap<String, Arc<dyn Registry>>,
    cache: Option<Arc<ContentCache>>,
}

impl RegistryManager {
    /// Create a manager. Every backend registered on it shares `cache`.
    pub fn new(cache: Option<Arc<ContentCache>>) -> Self {
        Self {
            backends: HashMap::new(),
            cache,
        }
    }

    /// Register the backend for an access type, replacing any earlier one.
    pub fn set(&mut self, access_type: &str, backend: Arc<dyn Registry>) {
        if self
            .backends
            .insert(access_type.to_string(), backend)
            .is_some()
        {
            info!(access_type, "Replaced registry backend");
        }
    }

    pub fn supports(&self, access_type: &str) -> bool {
        self.backends.contains_key(access_type)
    }

    pub fn cache(&self) -> Option<&Arc<ContentCache>> {
        self.cache.as_ref()
    }

    /// Resolve a reference to its content.
    ///
    /// A reference pinned to a digest is served from the cache when possible;
    /// fetched content must match the pin.
    pub async fn resolve(
        &self,
        reference: &ArtifactReference,
        credentials: &[ObjectReference],
    ) -> Result<Content, RegistryError> {
        let backend = self
            .backends
            .get(&reference.access_type)
            .ok_or_else(|| RegistryError::UnsupportedAccessType(reference.access_type.clone()))?;

        if let (Some(cache), Some(pinned)) = (&self.cache, &reference.digest) {
            if let Some(data) = cache.get(pinned).await {
                debug!(reference = %reference, "Serving artifact from cache");
                return Ok(Content {
                    data,
                    digest: pinned.clone(),
                });
            }
        }

        let content = Content::new(backend.fetch(reference, credentials).await?);
        if let Some(pinned) = &reference.digest {
            if *pinned != content.digest {
                return Err(RegistryError::DigestMismatch {
                    reference: reference.clone(),
                    expected: pinned.clone(),
                    actual: content.digest,
                });
            }
        }

        if let Some(cache) = &self.cache {
            cache.insert(&content.digest, content.data.clone()).await;
        }
        Ok(content)
    }
}
