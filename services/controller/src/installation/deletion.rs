//! Installation teardown.
//!
//! Deletion runs as a repeatable cycle. Each cycle checks sibling
//! dependencies, advances the deletion of the owned Execution and of the
//! owned sub-installations, and removes the finalizer once both are gone.
//! A cycle that cannot finish reports why and is retried later.

use landform_api::{Execution, Installation, Phase, Resource, FINALIZER};
use thiserror::Error;
use tracing::{debug, info};

use super::dependency::{find_blocking_sibling, SiblingConflict};
use super::InstallationOperation;
use crate::store::{Client, StoreError};

/// Why a deletion cycle did not complete.
#[derive(Debug, Error)]
pub enum DeletionError {
    /// A sibling still imports one of the exports.
    #[error("deletion blocked: {0}")]
    BlockedBySibling(SiblingConflict),

    /// Owned children are still being torn down.
    #[error("waiting for deletion of {}", waiting_for(.execution, .sub_installations))]
    WaitingForChildren {
        execution: bool,
        sub_installations: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn waiting_for(execution: &bool, sub_installations: &usize) -> String {
    match (*execution, *sub_installations) {
        (true, 0) => "execution".to_string(),
        (false, n) => format!("{n} sub-installation(s)"),
        (true, n) => format!("execution and {n} sub-installation(s)"),
    }
}

impl DeletionError {
    /// Blocked and waiting cycles are expected and retried on a timer.
    pub fn is_pending(&self) -> bool {
        !matches!(self, DeletionError::Store(_))
    }
}

/// Runs one deletion cycle.
///
/// Returns `Ok(())` only after the finalizer was removed. The caller must
/// not write the status afterwards.
pub async fn ensure_deletion<C: Client>(
    op: &mut InstallationOperation<C>,
) -> Result<(), DeletionError> {
    op.installation.status.phase = Phase::Deleting;

    if let Some(conflict) = find_blocking_sibling(&op.installation, &op.siblings) {
        debug!(installation = %op.installation.key(), %conflict, "Deletion blocked by sibling");
        return Err(DeletionError::BlockedBySibling(conflict));
    }

    let execution_deleted = delete_execution(op).await?;
    let remaining_subs = delete_sub_installations(op).await?;

    if !execution_deleted || remaining_subs > 0 {
        return Err(DeletionError::WaitingForChildren {
            execution: !execution_deleted,
            sub_installations: remaining_subs,
        });
    }

    let key = op.installation.key();
    if op.installation.metadata.remove_finalizer(FINALIZER) {
        match op.client().update(&op.installation).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        info!(installation = %key, "All children deleted, finalizer removed");
    }
    Ok(())
}

/// Returns true once the owned Execution is gone.
async fn delete_execution<C: Client>(op: &mut InstallationOperation<C>) -> Result<bool, StoreError> {
    let Some(exec_ref) = op.installation.status.execution_ref.clone() else {
        return Ok(true);
    };
    let key = exec_ref.key();

    let execution = match op.client().get::<Execution>(&key).await {
        Ok(execution) => execution,
        Err(e) if e.is_not_found() => {
            op.installation.status.execution_ref = None;
            return Ok(true);
        }
        Err(e) => return Err(e),
    };

    if execution.metadata.is_deleting() {
        debug!(execution = %key, "Execution is being deleted");
        return Ok(false);
    }

    match op.client().delete::<Execution>(&key).await {
        Ok(()) => info!(execution = %key, "Requested execution deletion"),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    Ok(false)
}

/// Returns the number of owned sub-installations still present.
async fn delete_sub_installations<C: Client>(
    op: &InstallationOperation<C>,
) -> Result<usize, StoreError> {
    let subs: Vec<Installation> = op.sub_installations().await?;
    for sub in &subs {
        if sub.metadata.is_deleting() {
            continue;
        }
        let key = sub.key();
        match op.client().delete::<Installation>(&key).await {
            Ok(()) => info!(sub_installation = %key, "Requested sub-installation deletion"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(subs.len())
}
