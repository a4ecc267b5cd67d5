//! Explicit kind registration and decoding of raw objects.

use std::collections::HashMap;

use serde_json::Value;

use crate::{ApiError, Execution, Installation, Resource, API_VERSION};

/// A registered object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Installation,
    Execution,
}

/// A decoded object of any registered kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Installation(Installation),
    Execution(Execution),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Installation(_) => ObjectKind::Installation,
            Object::Execution(_) => ObjectKind::Execution,
        }
    }
}

/// Maps `apiVersion`/`kind` pairs to object kinds.
///
/// Built once at process startup and passed to whoever decodes raw
/// documents.
#[derive(Debug, Default, Clone)]
pub struct Scheme {
    kinds: HashMap<(String, String), ObjectKind>,
}

impl Scheme {
    /// Creates an empty scheme. Call [`install`] to register the core kinds.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, api_version: &str, kind: &str, object_kind: ObjectKind) {
        self.kinds
            .insert((api_version.to_string(), kind.to_string()), object_kind);
    }

    pub fn recognizes(&self, api_version: &str, kind: &str) -> bool {
        self.kinds
            .contains_key(&(api_version.to_string(), kind.to_string()))
    }

    /// Decodes and validates a raw document.
    pub fn decode(&self, value: Value) -> Result<Object, ApiError> {
        let api_version = value.get("apiVersion").and_then(Value::as_str);
        let kind = value.get("kind").and_then(Value::as_str);
        let (Some(api_version), Some(kind)) = (api_version, kind) else {
            return Err(ApiError::MissingTypeMeta);
        };

        let object_kind = self
            .kinds
            .get(&(api_version.to_string(), kind.to_string()))
            .copied()
            .ok_or_else(|| ApiError::UnknownKind {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })?;

        let object = match object_kind {
            ObjectKind::Installation => {
                let inst: Installation = serde_json::from_value(value)?;
                inst.validate()?;
                Object::Installation(inst)
            }
            ObjectKind::Execution => {
                let exec: Execution = serde_json::from_value(value)?;
                exec.validate()?;
                Object::Execution(exec)
            }
        };
        Ok(object)
    }

    /// Decodes a JSON byte slice.
    pub fn decode_slice(&self, raw: &[u8]) -> Result<Object, ApiError> {
        let value: Value = serde_json::from_slice(raw)?;
        self.decode(value)
    }
}

/// Registers the landform core kinds into `scheme`.
pub fn install(scheme: &mut Scheme) {
    scheme.register(API_VERSION, Installation::KIND, ObjectKind::Installation);
    scheme.register(API_VERSION, Execution::KIND, ObjectKind::Execution);
}
