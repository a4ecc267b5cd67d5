//! Blueprint and component descriptor documents.

use std::collections::HashSet;

use landform_api::{ArtifactReference, DeployItemTemplate, Exports, Imports};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::Content;

/// Resource type naming a blueprint inside a component descriptor.
pub const BLUEPRINT_RESOURCE_TYPE: &str = "blueprint";

/// Errors from decoding or checking blueprint documents.
///
/// All of these are configuration problems: they go away only when the
/// referenced documents or the installation change.
#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("cannot parse {document}: {source}")]
    Parse {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid blueprint '{name}': {reason}")]
    Invalid { name: String, reason: String },

    #[error("blueprint {blueprint} is not a resource of component {component}")]
    NotInComponent {
        blueprint: ArtifactReference,
        component: String,
    },
}

/// Kind of a declared import or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
    Data,
    Target,
}

/// A declared blueprint import or export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
}

/// A nested installation declared by a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubInstallationTemplate {
    pub name: String,
    pub blueprint: ArtifactReference,
    #[serde(default)]
    pub imports: Imports,
    #[serde(default)]
    pub exports: Exports,
}

/// A parsed blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub name: String,
    #[serde(default)]
    pub imports: Vec<Parameter>,
    #[serde(default)]
    pub exports: Vec<Parameter>,
    #[serde(default)]
    pub deploy_items: Vec<DeployItemTemplate>,
    #[serde(default)]
    pub sub_installations: Vec<SubInstallationTemplate>,
}

impl Blueprint {
    pub fn from_content(content: &Content) -> Result<Self, BlueprintError> {
        let blueprint: Blueprint =
            serde_json::from_slice(&content.data).map_err(|source| BlueprintError::Parse {
                document: "blueprint",
                source,
            })?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    fn validate(&self) -> Result<(), BlueprintError> {
        let invalid = |reason: String| BlueprintError::Invalid {
            name: self.name.clone(),
            reason,
        };

        let mut items = HashSet::new();
        for item in &self.deploy_items {
            if !items.insert(item.name.as_str()) {
                return Err(invalid(format!("duplicate deploy item '{}'", item.name)));
            }
        }

        let mut subs = HashSet::new();
        for sub in &self.sub_installations {
            landform_id::validate_name(&sub.name)
                .map_err(|e| invalid(format!("sub-installation '{}': {e}", sub.name)))?;
            if !subs.insert(sub.name.as_str()) {
                return Err(invalid(format!("duplicate sub-installation '{}'", sub.name)));
            }
        }
        Ok(())
    }

    pub fn has_children(&self) -> bool {
        !self.deploy_items.is_empty() || !self.sub_installations.is_empty()
    }
}

/// A resource listed in a component descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub access: ArtifactReference,
}

/// A parsed component descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub resources: Vec<ComponentResource>,
}

impl ComponentDescriptor {
    pub fn from_content(content: &Content) -> Result<Self, BlueprintError> {
        serde_json::from_slice(&content.data).map_err(|source| BlueprintError::Parse {
            document: "component descriptor",
            source,
        })
    }

    /// Checks that `blueprint` is listed as a blueprint resource. The digest
    /// is only compared when both sides pin one.
    pub fn ensure_contains(&self, blueprint: &ArtifactReference) -> Result<(), BlueprintError> {
        let listed = self.resources.iter().any(|r| {
            r.resource_type == BLUEPRINT_RESOURCE_TYPE
                && r.access.access_type == blueprint.access_type
                && r.access.name == blueprint.name
                && r.access.version == blueprint.version
                && match (&r.access.digest, &blueprint.digest) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        });
        if listed {
            Ok(())
        } else {
            Err(BlueprintError::NotInComponent {
                blueprint: blueprint.clone(),
                component: format!("{}:{}", self.name, self.version),
            })
        }
    }
}
