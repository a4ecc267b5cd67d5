//! Filesystem registry.
//!
//! Layout: `<root>/<name>/<version>/<file>`. Roots are searched in order and
//! the first one holding the artifact wins.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use landform_api::{ArtifactReference, ObjectReference};
use tracing::debug;

use super::{Registry, RegistryError};

/// Access type served by [`LocalRegistry`].
pub const LOCAL_ACCESS_TYPE: &str = "local";

/// Serves artifacts from local directories.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    roots: Vec<PathBuf>,
    file_name: String,
}

impl LocalRegistry {
    pub fn new(roots: Vec<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            roots,
            file_name: file_name.into(),
        }
    }

    /// Path of the artifact relative to a root.
    fn relative_path(&self, reference: &ArtifactReference) -> Result<PathBuf, RegistryError> {
        let mut path = PathBuf::new();
        for part in [reference.name.as_str(), reference.version.as_str()] {
            if part.is_empty() {
                continue;
            }
            let part_path = Path::new(part);
            if !part_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                return Err(RegistryError::InvalidReference {
                    reference: reference.clone(),
                    reason: format!("'{part}' is not a relative path"),
                });
            }
            path.push(part_path);
        }
        if path.as_os_str().is_empty() {
            return Err(RegistryError::InvalidReference {
                reference: reference.clone(),
                reason: "name must be set".to_string(),
            });
        }
        path.push(&self.file_name);
        Ok(path)
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    async fn fetch(
        &self,
        reference: &ArtifactReference,
        _credentials: &[ObjectReference],
    ) -> Result<Bytes, RegistryError> {
        let relative = self.relative_path(reference)?;

        for root in &self.roots {
            let path = root.join(&relative);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    debug!(reference = %reference, path = %path.display(), "Read local artifact");
                    return Ok(Bytes::from(data));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(RegistryError::Io { path, source }),
            }
        }

        Err(RegistryError::NotFound(reference.clone()))
    }
}
