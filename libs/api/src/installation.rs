//! The Installation resource.

use serde::{Deserialize, Serialize};

use crate::meta::validate_meta;
use crate::{
    ApiError, Condition, LastError, ObjectMeta, ObjectReference, Operation, Phase, Resource,
    API_VERSION, ENCOMPASSED_BY_LABEL,
};

/// A composite deployment described by a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "installation_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: InstallationSpec,
    #[serde(default)]
    pub status: InstallationStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn installation_kind() -> String {
    Installation::KIND.to_string()
}

impl Installation {
    pub fn new(metadata: ObjectMeta, spec: InstallationSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: installation_kind(),
            metadata,
            spec,
            status: InstallationStatus::default(),
        }
    }

    /// Name of the parent installation, if this is a sub-installation.
    pub fn parent_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .get(ENCOMPASSED_BY_LABEL)
            .map(String::as_str)
    }

    /// Whether two installations share a parent scope.
    pub fn shares_scope_with(&self, other: &Installation) -> bool {
        self.metadata.namespace == other.metadata.namespace
            && self.parent_name() == other.parent_name()
    }

    /// The requested operation, decoded from the operation annotation.
    pub fn operation(&self) -> Operation {
        Operation::from_meta(&self.metadata)
    }

    /// Whether this installation declares a data import of `data_ref`.
    pub fn is_importing_data(&self, data_ref: &str) -> bool {
        self.spec.imports.data.iter().any(|i| i.data_ref == data_ref)
    }

    /// Whether this installation declares a target import of `target`.
    pub fn is_importing_target(&self, target: &str) -> bool {
        self.spec.imports.targets.iter().any(|i| i.target == target)
    }
}

impl Resource for Installation {
    const KIND: &'static str = "Installation";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ApiError> {
        validate_meta(Self::KIND, &self.metadata)?;
        let invalid = |reason: &str| ApiError::Invalid {
            kind: Self::KIND,
            name: self.metadata.name.clone(),
            reason: reason.to_string(),
        };
        if self.spec.blueprint.access_type.is_empty() {
            return Err(invalid("spec.blueprint.type must be set"));
        }
        if self.spec.blueprint.name.is_empty() {
            return Err(invalid("spec.blueprint.name must be set"));
        }
        if self.spec.imports.data.iter().any(|i| i.data_ref.is_empty())
            || self.spec.exports.data.iter().any(|e| e.data_ref.is_empty())
        {
            return Err(invalid("data imports and exports need a dataRef"));
        }
        if self.spec.imports.targets.iter().any(|i| i.target.is_empty())
            || self.spec.exports.targets.iter().any(|e| e.target.is_empty())
        {
            return Err(invalid("target imports and exports need a target"));
        }
        Ok(())
    }
}

/// Desired state of an installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    pub blueprint: ArtifactReference,

    /// Component descriptor the blueprint is expected to belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_descriptor: Option<ArtifactReference>,

    #[serde(default)]
    pub imports: Imports,

    #[serde(default)]
    pub exports: Exports,

    /// Secrets handed to registry backends as pull credentials.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registry_pull_secrets: Vec<ObjectReference>,
}

/// Typed reference to an artifact held in a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReference {
    /// Access type selecting the registry backend, e.g. `local`.
    #[serde(rename = "type")]
    pub access_type: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Content digest (`sha256:<hex>`) the artifact is pinned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.access_type, self.name)?;
        if !self.version.is_empty() {
            write!(f, ":{}", self.version)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Imports {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetImport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exports {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataExport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetExport>,
}

/// Imports the data object with logical name `data_ref` as `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataImport {
    pub name: String,
    pub data_ref: String,
}

/// Imports the target with logical name `target` as `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetImport {
    pub name: String,
    pub target: String,
}

/// Exports the blueprint export `name` as data object `data_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    pub name: String,
    pub data_ref: String,
}

/// Exports the blueprint export `name` as target `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetExport {
    pub name: String,
    pub target: String,
}

/// Observed state of an installation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub observed_generation: i64,

    /// The Execution owned by this installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ref: Option<ObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl InstallationStatus {
    /// Field-by-field comparison of the persisted status projection.
    ///
    /// Every serialized field must be listed here; a field missing from the
    /// comparison would never trigger a status write.
    pub fn same_as(&self, other: &InstallationStatus) -> bool {
        self.phase == other.phase
            && self.observed_generation == other.observed_generation
            && self.execution_ref == other.execution_ref
            && self.last_error == other.last_error
            && self.conditions == other.conditions
    }
}

impl PartialEq for InstallationStatus {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{set_condition, update_last_error, ConditionStatus, ErrorCode};

    fn installation(name: &str) -> Installation {
        Installation::new(
            ObjectMeta::new("default", name),
            InstallationSpec {
                blueprint: ArtifactReference {
                    access_type: "local".to_string(),
                    name: "example.com/blueprint".to_string(),
                    version: "v1".to_string(),
                    digest: None,
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_status_compare_detects_each_field() {
        let base = InstallationStatus::default();

        let mut changed = base.clone();
        changed.phase = Phase::Deleting;
        assert!(!base.same_as(&changed));

        let mut changed = base.clone();
        changed.observed_generation = 3;
        assert!(!base.same_as(&changed));

        let mut changed = base.clone();
        changed.execution_ref = Some(ObjectReference::new("default", "exec"));
        assert!(!base.same_as(&changed));

        let mut changed = base.clone();
        changed.last_error = Some(update_last_error(
            None,
            "Reconcile",
            "Test",
            "boom",
            vec![ErrorCode::InternalProblem],
        ));
        assert!(!base.same_as(&changed));

        let mut changed = base.clone();
        set_condition(
            &mut changed.conditions,
            "Deleted",
            ConditionStatus::False,
            "SiblingImport",
            "",
        );
        assert!(!base.same_as(&changed));

        assert!(base.same_as(&base.clone()));
    }

    #[test]
    fn test_importing_matches_logical_name() {
        let mut inst = installation("b");
        inst.spec.imports.data.push(DataImport {
            name: "config".to_string(),
            data_ref: "foo".to_string(),
        });
        inst.spec.imports.targets.push(TargetImport {
            name: "cluster".to_string(),
            target: "dev-cluster".to_string(),
        });
        assert!(inst.is_importing_data("foo"));
        assert!(!inst.is_importing_data("config"));
        assert!(inst.is_importing_target("dev-cluster"));
        assert!(!inst.is_importing_target("foo"));
    }

    #[test]
    fn test_scope() {
        let a = installation("a");
        let mut b = installation("b");
        assert!(a.shares_scope_with(&b));

        b.metadata
            .labels
            .insert(ENCOMPASSED_BY_LABEL.to_string(), "root".to_string());
        assert!(!a.shares_scope_with(&b));
        assert_eq!(b.parent_name(), Some("root"));
    }

    #[test]
    fn test_validate_requires_blueprint() {
        let mut inst = installation("a");
        assert!(inst.validate().is_ok());
        inst.spec.blueprint.name.clear();
        assert!(matches!(inst.validate(), Err(ApiError::Invalid { .. })));
    }

    #[test]
    fn test_decode_defaults() {
        let inst: Installation = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "a", "namespace": "default"},
            "spec": {"blueprint": {"type": "local", "name": "bp", "version": "v1"}}
        }))
        .unwrap();
        assert_eq!(inst.kind, "Installation");
        assert_eq!(inst.api_version, API_VERSION);
        assert_eq!(inst.status.phase, Phase::Pending);
        assert_eq!(inst.spec.blueprint.to_string(), "local://bp:v1");
    }
}
