//! The Execution resource.

use serde::{Deserialize, Serialize};

use crate::meta::validate_meta;
use crate::{ApiError, ObjectMeta, Phase, Resource, API_VERSION};

/// Deploy items materialized from an installation's blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "execution_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ExecutionSpec,
    #[serde(default)]
    pub status: ExecutionStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn execution_kind() -> String {
    Execution::KIND.to_string()
}

impl Execution {
    pub fn new(metadata: ObjectMeta, spec: ExecutionSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: execution_kind(),
            metadata,
            spec,
            status: ExecutionStatus::default(),
        }
    }

    /// Whether the deploy item subsystem finished the current generation.
    pub fn is_completed(&self) -> bool {
        self.status.phase == Phase::Completed
            && self.status.observed_generation == self.metadata.generation
    }
}

impl Resource for Execution {
    const KIND: &'static str = "Execution";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ApiError> {
        validate_meta(Self::KIND, &self.metadata)?;
        let mut seen = std::collections::HashSet::new();
        for item in &self.spec.deploy_items {
            if !seen.insert(item.name.as_str()) {
                return Err(ApiError::Invalid {
                    kind: Self::KIND,
                    name: self.metadata.name.clone(),
                    reason: format!("duplicate deploy item '{}'", item.name),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSpec {
    #[serde(default)]
    pub deploy_items: Vec<DeployItemTemplate>,
}

/// A single unit of deployment work handed to a deployer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployItemTemplate {
    pub name: String,
    /// Deployer type, e.g. `landform.io/helm`.
    #[serde(rename = "type")]
    pub deployer_type: String,
    /// Deployer-specific provider configuration.
    #[serde(default)]
    pub configuration: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub observed_generation: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_deploy_items_rejected() {
        let item = DeployItemTemplate {
            name: "chart".to_string(),
            deployer_type: "landform.io/helm".to_string(),
            configuration: serde_json::json!({}),
        };
        let exec = Execution::new(
            ObjectMeta::new("default", "a"),
            ExecutionSpec {
                deploy_items: vec![item.clone(), item],
            },
        );
        assert!(exec.validate().is_err());
    }

    #[test]
    fn test_completed_requires_current_generation() {
        let mut exec = Execution::new(ObjectMeta::new("default", "a"), ExecutionSpec::default());
        exec.metadata.generation = 2;
        exec.status.phase = Phase::Completed;
        exec.status.observed_generation = 1;
        assert!(!exec.is_completed());
        exec.status.observed_generation = 2;
        assert!(exec.is_completed());
    }
}
