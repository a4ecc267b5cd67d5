//! Per-reconcile view of one installation and its surroundings.

use std::sync::Arc;

use landform_api::{
    condition_reasons, condition_types, set_condition, ConditionStatus, Installation, Resource,
};
use thiserror::Error;
use tracing::debug;

use super::blueprint::{Blueprint, BlueprintError, ComponentDescriptor};
use super::SharedOperation;
use crate::registry::RegistryError;
use crate::store::{Client, StoreError};

/// Errors from assembling the operation context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("resolving artifact: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),
}

impl ContextError {
    pub fn is_configuration(&self) -> bool {
        match self {
            ContextError::Store(_) => false,
            ContextError::Registry(e) => e.is_configuration(),
            ContextError::Blueprint(_) => true,
        }
    }
}

/// The blueprint of an installation together with its content digest.
#[derive(Debug, Clone)]
pub struct ResolvedBlueprint {
    pub blueprint: Blueprint,
    pub digest: String,
    pub component: Option<ComponentDescriptor>,
}

/// Everything one reconcile of an installation works on.
///
/// `installation` is the working copy; its status is compared against the
/// stored one after processing.
pub struct InstallationOperation<C: Client> {
    operation: Arc<SharedOperation<C>>,
    pub installation: Installation,
    /// Installations sharing the parent scope, excluding this one.
    pub siblings: Vec<Installation>,
    /// Resolved only for installations that are not being deleted.
    pub blueprint: Option<ResolvedBlueprint>,
}

impl<C: Client> InstallationOperation<C> {
    /// Assemble the context. Teardown does not depend on the blueprint, so
    /// deleting installations skip resolution.
    pub async fn build(
        operation: Arc<SharedOperation<C>>,
        mut installation: Installation,
    ) -> Result<Self, (Installation, ContextError)> {
        let siblings = match list_siblings(operation.client(), &installation).await {
            Ok(siblings) => siblings,
            Err(e) => return Err((installation, e.into())),
        };

        let blueprint = if installation.metadata.is_deleting() {
            None
        } else {
            match resolve_blueprint(&operation, &installation).await {
                Ok(resolved) => {
                    set_condition(
                        &mut installation.status.conditions,
                        condition_types::BLUEPRINT_RESOLVED,
                        ConditionStatus::True,
                        condition_reasons::RESOLVED,
                        format!("resolved {}", resolved.digest),
                    );
                    Some(resolved)
                }
                Err(e) => {
                    set_condition(
                        &mut installation.status.conditions,
                        condition_types::BLUEPRINT_RESOLVED,
                        ConditionStatus::False,
                        condition_reasons::RESOLUTION_FAILED,
                        e.to_string(),
                    );
                    return Err((installation, e));
                }
            }
        };

        Ok(Self {
            operation,
            installation,
            siblings,
            blueprint,
        })
    }

    pub fn client(&self) -> &C {
        self.operation.client()
    }

    /// Installations controlled by this one.
    pub async fn sub_installations(&self) -> Result<Vec<Installation>, StoreError> {
        let Some(uid) = self.installation.metadata.uid else {
            return Ok(Vec::new());
        };
        let all: Vec<Installation> = self
            .client()
            .list(&self.installation.metadata.namespace)
            .await?;
        Ok(all
            .into_iter()
            .filter(|i| i.metadata.is_controlled_by(uid))
            .collect())
    }

    /// Give the working copy back.
    pub fn into_installation(self) -> Installation {
        self.installation
    }
}

/// Lists the installations sharing `installation`'s parent scope.
pub async fn list_siblings<C: Client>(
    client: &C,
    installation: &Installation,
) -> Result<Vec<Installation>, StoreError> {
    let all: Vec<Installation> = client.list(&installation.metadata.namespace).await?;
    Ok(all
        .into_iter()
        .filter(|other| {
            other.metadata.name != installation.metadata.name
                && other.shares_scope_with(installation)
        })
        .collect())
}

async fn resolve_blueprint<C: Client>(
    operation: &SharedOperation<C>,
    installation: &Installation,
) -> Result<ResolvedBlueprint, ContextError> {
    let spec = &installation.spec;
    let credentials = &spec.registry_pull_secrets;
    let registries = operation.registries();

    let content = registries
        .blueprints
        .resolve(&spec.blueprint, credentials)
        .await?;
    let blueprint = Blueprint::from_content(&content)?;

    let component = match &spec.component_descriptor {
        Some(reference) => {
            let content = registries.components.resolve(reference, credentials).await?;
            let descriptor = ComponentDescriptor::from_content(&content)?;
            descriptor.ensure_contains(&spec.blueprint)?;
            Some(descriptor)
        }
        None => None,
    };

    debug!(
        installation = %installation.key(),
        blueprint = %spec.blueprint,
        digest = %content.digest,
        "Resolved blueprint"
    );
    Ok(ResolvedBlueprint {
        blueprint,
        digest: content.digest,
        component,
    })
}
