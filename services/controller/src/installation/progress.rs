//! Creation and progress of an installation.
//!
//! Materializes the Execution and the sub-installations declared by the
//! blueprint, then derives the installation phase from theirs.

use std::collections::BTreeSet;

use landform_api::{
    Execution, ExecutionSpec, Installation, InstallationSpec, ObjectMeta, ObjectReference,
    Operation, Phase, Resource, ENCOMPASSED_BY_LABEL, OPERATION_ANNOTATION,
};
use thiserror::Error;
use tracing::{debug, info};

use super::blueprint::{Blueprint, SubInstallationTemplate};
use super::InstallationOperation;
use crate::store::{Client, StoreError};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("installation has no resolved blueprint")]
    MissingBlueprint,

    #[error("{kind} {name} exists but is not owned by this installation")]
    NameTaken { kind: &'static str, name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProgressError {
    pub fn is_configuration(&self) -> bool {
        match self {
            ProgressError::NameTaken { .. } => true,
            ProgressError::Store(StoreError::Invalid(_)) => true,
            _ => false,
        }
    }
}

/// Name of the sub-installation created from a template.
pub fn sub_installation_name(parent: &str, template: &str) -> String {
    format!("{parent}-{template}")
}

/// Runs one progress pass.
///
/// `forced` marks every child for a forced reconcile; the installation
/// then stays Progressing until the children report back.
pub async fn ensure<C: Client>(
    op: &mut InstallationOperation<C>,
    forced: bool,
) -> Result<(), ProgressError> {
    let blueprint = op
        .blueprint
        .as_ref()
        .map(|resolved| resolved.blueprint.clone())
        .ok_or(ProgressError::MissingBlueprint)?;

    let generation = op.installation.metadata.generation;
    if op.installation.status.phase == Phase::Pending
        || op.installation.status.observed_generation != generation
    {
        info!(
            installation = %op.installation.key(),
            generation,
            forced,
            "Starting reconcile of new generation"
        );
        op.installation.status.phase = Phase::Progressing;
        op.installation.status.observed_generation = generation;
    }

    let execution = ensure_execution(op, &blueprint, forced).await?;
    let subs = ensure_sub_installations(op, &blueprint, forced).await?;

    let stale_execution = execution.is_none() && op.installation.status.execution_ref.is_some();
    op.installation.status.phase = if forced || stale_execution {
        Phase::Progressing
    } else {
        combine_phases(execution.as_ref(), &subs)
    };
    op.installation.status.last_error = None;
    Ok(())
}

/// Phase of the installation derived from its children.
///
/// A child counts as finished only when it observed its current generation
/// and has no pending operation.
pub fn combine_phases(execution: Option<&Execution>, subs: &[Installation]) -> Phase {
    let mut failed = false;
    let mut finished = true;

    if let Some(execution) = execution {
        failed |= execution.status.phase == Phase::Failed;
        finished &= execution.is_completed() && !has_pending_operation(&execution.metadata);
    }
    for sub in subs {
        failed |= sub.status.phase == Phase::Failed;
        finished &= sub.status.phase == Phase::Completed
            && sub.status.observed_generation == sub.metadata.generation
            && !has_pending_operation(&sub.metadata);
    }

    if failed {
        Phase::Failed
    } else if finished {
        Phase::Completed
    } else {
        Phase::Progressing
    }
}

fn has_pending_operation(meta: &ObjectMeta) -> bool {
    meta.annotations.contains_key(OPERATION_ANNOTATION)
}

fn mark_forced(meta: &mut ObjectMeta) {
    if let Some(value) = Operation::ForceReconcile.annotation_value() {
        meta.annotations
            .insert(OPERATION_ANNOTATION.to_string(), value.to_string());
    }
}

async fn ensure_execution<C: Client>(
    op: &mut InstallationOperation<C>,
    blueprint: &Blueprint,
    forced: bool,
) -> Result<Option<Execution>, ProgressError> {
    let inst_key = op.installation.key();

    if blueprint.deploy_items.is_empty() {
        remove_unused_execution(op).await?;
        return Ok(None);
    }

    let spec = ExecutionSpec {
        deploy_items: blueprint.deploy_items.clone(),
    };
    let uid = op.installation.metadata.uid;

    let execution = match op.client().get::<Execution>(&inst_key).await {
        Ok(mut existing) => {
            if !uid.is_some_and(|uid| existing.metadata.is_controlled_by(uid)) {
                return Err(ProgressError::NameTaken {
                    kind: Execution::KIND,
                    name: existing.metadata.name,
                });
            }
            let mut changed = false;
            if existing.spec != spec {
                existing.spec = spec;
                changed = true;
            }
            if forced {
                mark_forced(&mut existing.metadata);
                changed = true;
            }
            if changed {
                debug!(execution = %inst_key, "Updating execution");
                op.client().update(&existing).await?
            } else {
                existing
            }
        }
        Err(e) if e.is_not_found() => {
            let mut metadata = ObjectMeta::new(inst_key.namespace(), inst_key.name());
            metadata
                .owner_references
                .extend(op.installation.controller_reference());
            let created = op.client().create(&Execution::new(metadata, spec)).await?;
            info!(installation = %inst_key, "Created execution");
            created
        }
        Err(e) => return Err(e.into()),
    };

    op.installation.status.execution_ref = Some(ObjectReference::from(&inst_key));
    Ok(Some(execution))
}

/// Deletes an execution the blueprint no longer needs. The reference is
/// kept until the execution is gone.
async fn remove_unused_execution<C: Client>(
    op: &mut InstallationOperation<C>,
) -> Result<(), ProgressError> {
    let Some(exec_ref) = op.installation.status.execution_ref.clone() else {
        return Ok(());
    };
    let key = exec_ref.key();

    let execution = match op.client().get::<Execution>(&key).await {
        Ok(execution) => execution,
        Err(e) if e.is_not_found() => {
            op.installation.status.execution_ref = None;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if execution.metadata.is_deleting() {
        return Ok(());
    }

    match op.client().delete::<Execution>(&key).await {
        Ok(()) => info!(installation = %op.installation.key(), execution = %key, "Deleting unused execution"),
        Err(e) if e.is_not_found() => op.installation.status.execution_ref = None,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn ensure_sub_installations<C: Client>(
    op: &mut InstallationOperation<C>,
    blueprint: &Blueprint,
    forced: bool,
) -> Result<Vec<Installation>, ProgressError> {
    let parent = &op.installation;
    let existing = op.sub_installations().await?;

    let wanted: BTreeSet<String> = blueprint
        .sub_installations
        .iter()
        .map(|t| sub_installation_name(&parent.metadata.name, &t.name))
        .collect();

    for stale in existing
        .iter()
        .filter(|s| !wanted.contains(&s.metadata.name) && !s.metadata.is_deleting())
    {
        match op.client().delete::<Installation>(&stale.key()).await {
            Ok(()) => info!(sub_installation = %stale.key(), "Removed sub-installation no longer in blueprint"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut subs = Vec::with_capacity(blueprint.sub_installations.len());
    for template in &blueprint.sub_installations {
        let desired = desired_sub_installation(parent, template);
        let key = desired.key();

        let current = match existing.iter().find(|s| s.metadata.name == key.name()) {
            Some(current) => {
                let mut current = current.clone();
                let mut changed = false;
                if current.spec != desired.spec {
                    current.spec = desired.spec;
                    changed = true;
                }
                if forced {
                    mark_forced(&mut current.metadata);
                    changed = true;
                }
                if changed {
                    op.client().update(&current).await?
                } else {
                    current
                }
            }
            None => match op.client().create(&desired).await {
                Ok(created) => {
                    info!(sub_installation = %key, "Created sub-installation");
                    created
                }
                Err(StoreError::AlreadyExists { .. }) => {
                    return Err(ProgressError::NameTaken {
                        kind: Installation::KIND,
                        name: key.name().to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            },
        };
        subs.push(current);
    }
    Ok(subs)
}

fn desired_sub_installation(parent: &Installation, template: &SubInstallationTemplate) -> Installation {
    let mut metadata = ObjectMeta::new(
        parent.metadata.namespace.clone(),
        sub_installation_name(&parent.metadata.name, &template.name),
    );
    metadata
        .labels
        .insert(ENCOMPASSED_BY_LABEL.to_string(), parent.metadata.name.clone());
    metadata
        .owner_references
        .extend(parent.controller_reference());

    Installation::new(
        metadata,
        InstallationSpec {
            blueprint: template.blueprint.clone(),
            component_descriptor: parent.spec.component_descriptor.clone(),
            imports: template.imports.clone(),
            exports: template.exports.clone(),
            registry_pull_secrets: parent.spec.registry_pull_secrets.clone(),
        },
    )
}
