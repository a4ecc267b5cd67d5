//! Object metadata shared by all resources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use landform_id::{ObjectKey, ResourceVersion, Uid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Standard metadata of a stored object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<ResourceVersion>,

    /// Bumped by the store whenever the spec changes.
    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Set by the store when deletion was requested while finalizers remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds the finalizer. Returns false if it was already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes the finalizer. Returns false if it was not present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    /// The owner reference flagged as controller, if any.
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.controller)
    }

    pub fn is_controlled_by(&self, owner_uid: Uid) -> bool {
        self.controller_owner().is_some_and(|o| o.uid == owner_uid)
    }
}

/// Reference from an owned object to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: Uid,
    #[serde(default)]
    pub controller: bool,
}

/// Namespaced reference to another object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ObjectReference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

impl From<&ObjectKey> for ObjectReference {
    fn from(key: &ObjectKey) -> Self {
        Self::new(key.namespace(), key.name())
    }
}

/// A resource kind the store can hold.
///
/// Implementors are plain serde documents with `metadata`, `spec` and
/// `status` fields; the store relies on those field names.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind name, e.g. `Installation`.
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Validates the object before it is admitted to the store.
    fn validate(&self) -> Result<(), ApiError> {
        validate_meta(Self::KIND, self.meta())
    }

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Builds a controller owner reference pointing at this object.
    ///
    /// Returns `None` for objects that were never stored and have no UID.
    fn controller_reference(&self) -> Option<OwnerReference> {
        let meta = self.meta();
        meta.uid.map(|uid| OwnerReference {
            api_version: crate::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            name: meta.name.clone(),
            uid,
            controller: true,
        })
    }
}

pub(crate) fn validate_meta(kind: &'static str, meta: &ObjectMeta) -> Result<(), ApiError> {
    let invalid = |reason: String| ApiError::Invalid {
        kind,
        name: meta.name.clone(),
        reason,
    };
    landform_id::validate_name(&meta.name).map_err(|e| invalid(format!("metadata.name: {e}")))?;
    landform_id::validate_name(&meta.namespace)
        .map_err(|e| invalid(format!("metadata.namespace: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_add_is_idempotent() {
        let mut meta = ObjectMeta::new("default", "a");
        assert!(meta.add_finalizer(crate::FINALIZER));
        assert!(!meta.add_finalizer(crate::FINALIZER));
        assert_eq!(meta.finalizers.len(), 1);
        assert!(meta.remove_finalizer(crate::FINALIZER));
        assert!(!meta.remove_finalizer(crate::FINALIZER));
    }

    #[test]
    fn test_controller_owner() {
        let uid = Uid::new();
        let mut meta = ObjectMeta::new("default", "child");
        meta.owner_references.push(OwnerReference {
            api_version: crate::API_VERSION.to_string(),
            kind: "Installation".to_string(),
            name: "parent".to_string(),
            uid,
            controller: true,
        });
        assert!(meta.is_controlled_by(uid));
        assert!(!meta.is_controlled_by(Uid::new()));
    }

    #[test]
    fn test_meta_serializes_camel_case_and_skips_empty() {
        let mut meta = ObjectMeta::new("default", "a");
        meta.resource_version = Some(ResourceVersion::new(7));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["resourceVersion"], "7");
        assert!(json.get("finalizers").is_none());
        assert!(json.get("deletionTimestamp").is_none());
    }
}
