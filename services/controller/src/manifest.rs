//! Loading of JSON manifests into the store at startup.

use std::path::Path;

use anyhow::{Context, Result};
use landform_api::{Object, Scheme};
use landform_id::ObjectKey;
use serde_json::Value;
use tracing::{info, warn};

use crate::store::Client;

/// Reads every `*.json` file in `dir`, in file name order.
///
/// A file holds either a single object or an array of objects.
pub fn load_manifests(dir: &Path, scheme: &Scheme) -> Result<Vec<Object>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading manifest dir {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut objects = Vec::new();
    for path in paths {
        let raw = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let value: Value =
            serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let documents = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        for document in documents {
            let object = scheme
                .decode(document)
                .with_context(|| format!("decoding {}", path.display()))?;
            objects.push(object);
        }
    }
    Ok(objects)
}

/// Creates the objects in the store. Returns the keys of the installations
/// that were created.
pub async fn seed<C: Client>(client: &C, objects: Vec<Object>) -> Result<Vec<ObjectKey>> {
    let mut installations = Vec::new();
    for object in objects {
        let result = match &object {
            Object::Installation(inst) => client.create(inst).await.map(|created| {
                installations.push(created.metadata.key());
            }),
            Object::Execution(exec) => client.create(exec).await.map(|_| ()),
        };
        match result {
            Ok(()) => {}
            Err(e) if matches!(e, crate::store::StoreError::AlreadyExists { .. }) => {
                warn!(error = %e, "Skipping manifest, object already exists");
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(installations = installations.len(), "Seeded manifests");
    Ok(installations)
}
