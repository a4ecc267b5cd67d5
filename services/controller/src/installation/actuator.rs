//! The installation reconciler.
//!
//! One reconcile:
//!
//! 1. Fetch the installation; a missing object needs no work.
//! 2. Add the finalizer if it is missing and the object is not deleting.
//! 3. Decode the operation annotation.
//! 4. Skip final phases whose generation was already observed, unless an
//!    operation was requested.
//! 5. Build the operation context, then tear down or make progress.
//! 6. Persist the status if it differs from what was read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use landform_api::{
    condition_reasons, condition_types, set_condition, update_last_error, ConditionStatus,
    ErrorCode, Installation, InstallationStatus, Operation, Phase, FINALIZER,
    OPERATION_ANNOTATION,
};
use landform_id::ObjectKey;
use landform_reconcile::{Action, Reconciler};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::context::ContextError;
use super::deletion::{ensure_deletion, DeletionError};
use super::progress::{self, ProgressError};
use super::{InstallationOperation, SharedOperation};
use crate::store::{Client, StoreError};

/// Default delay before a blocked or waiting deletion is checked again.
pub const DEFAULT_BLOCKED_RETRY_INTERVAL: Duration = Duration::from_secs(10);

const OPERATION_RECONCILE: &str = "Reconcile";
const OPERATION_DELETE: &str = "Delete";

/// Errors surfaced by a reconcile.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Deletion(#[from] DeletionError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl ActuatorError {
    /// Configuration problems are recorded and not retried on a timer.
    pub fn is_configuration(&self) -> bool {
        match self {
            ActuatorError::Store(e) => matches!(e, StoreError::Invalid(_)),
            ActuatorError::Context(e) => e.is_configuration(),
            ActuatorError::Deletion(_) => false,
            ActuatorError::Progress(e) => e.is_configuration(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            ActuatorError::Store(e)
            | ActuatorError::Context(ContextError::Store(e))
            | ActuatorError::Deletion(DeletionError::Store(e))
            | ActuatorError::Progress(ProgressError::Store(e)) => e.is_conflict(),
            _ => false,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ActuatorError::Store(_) => "PersistInstallation",
            ActuatorError::Context(_) => "BuildContext",
            ActuatorError::Deletion(_) => "EnsureDeletion",
            ActuatorError::Progress(_) => "EnsureProgress",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Delay before a blocked or waiting deletion is checked again.
    pub blocked_retry_interval: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            blocked_retry_interval: DEFAULT_BLOCKED_RETRY_INTERVAL,
        }
    }
}

/// Reconciles installations.
pub struct Actuator<C: Client> {
    operation: Arc<SharedOperation<C>>,
    config: ActuatorConfig,
}

impl<C: Client> Actuator<C> {
    pub fn new(operation: Arc<SharedOperation<C>>, config: ActuatorConfig) -> Self {
        Self { operation, config }
    }

    fn client(&self) -> &C {
        self.operation.client()
    }

    /// Persists metadata and spec, keeping the working status.
    async fn update_metadata(&self, installation: Installation) -> Result<Installation, StoreError> {
        let status = installation.status.clone();
        let mut updated = self.client().update(&installation).await?;
        updated.status = status;
        Ok(updated)
    }

    async fn run(&self, key: &ObjectKey) -> Result<Action, ActuatorError> {
        let mut installation = match self.client().get::<Installation>(key).await {
            Ok(installation) => installation,
            Err(e) if e.is_not_found() => {
                debug!("Installation no longer exists");
                return Ok(Action::done());
            }
            Err(e) => return Err(e.into()),
        };

        let deleting = installation.metadata.is_deleting();
        if !deleting && !installation.metadata.has_finalizer(FINALIZER) {
            installation.metadata.add_finalizer(FINALIZER);
            self.client().update(&installation).await?;
            debug!("Added finalizer");
            return Ok(Action::requeue());
        }

        let snapshot = installation.status.clone();
        let operation = installation.operation();
        let forced = operation == Operation::ForceReconcile;
        let requested = forced || operation == Operation::Reconcile;
        match operation {
            Operation::Reconcile => {
                installation.metadata.annotations.remove(OPERATION_ANNOTATION);
                installation = self.update_metadata(installation).await?;
                info!("Reconcile requested");
            }
            Operation::ForceReconcile => {
                info!("Forced reconcile requested");
                installation.status.phase = Phase::Pending;
            }
            Operation::Abort => info!("Abort requested, ignoring"),
            Operation::None => {}
        }

        let status = &installation.status;
        if !deleting
            && !requested
            && status.phase.is_final()
            && status.observed_generation == installation.metadata.generation
        {
            debug!(phase = %status.phase, "Installation is up to date");
            return Ok(Action::done());
        }

        let (installation, outcome) = self.process(installation, forced).await;
        let mut installation = installation;

        let action = match outcome {
            Ok(Outcome::Deleted) => return Ok(Action::done()),
            Ok(Outcome::Action(action)) => action,
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "Conflict, reconciling again from a fresh read");
                return Ok(Action::requeue());
            }
            Err(e) => {
                let op_name = if deleting {
                    OPERATION_DELETE
                } else {
                    OPERATION_RECONCILE
                };
                if e.is_configuration() {
                    warn!(error = %e, "Configuration problem");
                    installation.status.last_error = Some(update_last_error(
                        installation.status.last_error.as_ref(),
                        op_name,
                        e.reason(),
                        e.to_string(),
                        vec![ErrorCode::ConfigurationProblem],
                    ));
                    if !deleting {
                        installation.status.phase = Phase::Failed;
                        installation.status.observed_generation = installation.metadata.generation;
                    }
                    if forced {
                        installation = self.clear_operation(installation).await?;
                    }
                    self.write_status(&installation, &snapshot).await?;
                    return Ok(Action::done());
                }

                installation.status.last_error = Some(update_last_error(
                    installation.status.last_error.as_ref(),
                    op_name,
                    e.reason(),
                    e.to_string(),
                    Vec::new(),
                ));
                self.write_status(&installation, &snapshot).await?;
                return Err(e);
            }
        };

        if forced {
            installation = self.clear_operation(installation).await?;
        }
        if !self.write_status(&installation, &snapshot).await? {
            return Ok(Action::requeue());
        }
        Ok(action)
    }

    async fn process(
        &self,
        installation: Installation,
        forced: bool,
    ) -> (Installation, Result<Outcome, ActuatorError>) {
        let mut op = match InstallationOperation::build(Arc::clone(&self.operation), installation).await
        {
            Ok(op) => op,
            Err((installation, e)) => return (installation, Err(e.into())),
        };

        let outcome = if op.installation.metadata.is_deleting() {
            self.delete(&mut op).await
        } else {
            progress::ensure(&mut op, forced)
                .await
                .map(|()| Outcome::Action(Action::done()))
                .map_err(ActuatorError::from)
        };
        (op.into_installation(), outcome)
    }

    async fn delete(&self, op: &mut InstallationOperation<C>) -> Result<Outcome, ActuatorError> {
        let retry = Action::requeue_after(self.config.blocked_retry_interval);
        match ensure_deletion(op).await {
            Ok(()) => Ok(Outcome::Deleted),
            Err(DeletionError::BlockedBySibling(conflict)) => {
                set_condition(
                    &mut op.installation.status.conditions,
                    condition_types::DELETED,
                    ConditionStatus::False,
                    condition_reasons::SIBLING_IMPORT,
                    conflict.to_string(),
                );
                info!(%conflict, "Deletion waits for sibling");
                Ok(Outcome::Action(retry))
            }
            Err(e @ DeletionError::WaitingForChildren { .. }) => {
                set_condition(
                    &mut op.installation.status.conditions,
                    condition_types::DELETED,
                    ConditionStatus::False,
                    condition_reasons::WAITING_FOR_DELETION,
                    e.to_string(),
                );
                debug!(reason = %e, "Deletion in progress");
                Ok(Outcome::Action(retry))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the operation annotation, keeping the working status.
    async fn clear_operation(&self, mut installation: Installation) -> Result<Installation, StoreError> {
        if installation
            .metadata
            .annotations
            .remove(OPERATION_ANNOTATION)
            .is_none()
        {
            return Ok(installation);
        }
        self.update_metadata(installation).await
    }

    /// Writes the status if it moved. Returns false on a conflict.
    async fn write_status(
        &self,
        installation: &Installation,
        snapshot: &InstallationStatus,
    ) -> Result<bool, StoreError> {
        if installation.status.same_as(snapshot) {
            return Ok(true);
        }
        match self.client().update_status(installation).await {
            Ok(_) => {
                debug!(phase = %installation.status.phase, "Status updated");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

enum Outcome {
    /// The finalizer was removed; the object is gone or about to be.
    Deleted,
    Action(Action),
}

#[async_trait]
impl<C: Client> Reconciler for Actuator<C> {
    type Key = ObjectKey;
    type Error = ActuatorError;

    #[instrument(skip_all, fields(installation = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ActuatorError> {
        match self.run(key).await {
            Err(ActuatorError::Store(e)) if e.is_conflict() => {
                debug!(error = %e, "Conflict, reconciling again from a fresh read");
                Ok(Action::requeue())
            }
            result => result,
        }
    }
}
