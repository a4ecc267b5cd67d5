//! Installation lifecycle.
//!
//! The [`Actuator`] is the reconcile entrypoint. Each reconcile assembles an
//! [`InstallationOperation`] and hands it to either the deletion
//! orchestrator ([`ensure_deletion`]) or the progress logic
//! ([`progress::ensure`]).

mod actuator;
pub mod blueprint;
mod context;
pub mod deletion;
pub mod dependency;
mod operation;
pub mod progress;

pub use actuator::{Actuator, ActuatorConfig, ActuatorError, DEFAULT_BLOCKED_RETRY_INTERVAL};
pub use context::{list_siblings, ContextError, InstallationOperation, ResolvedBlueprint};
pub use deletion::{ensure_deletion, DeletionError};
pub use dependency::{find_blocking_sibling, has_blocking_sibling_dependency, SiblingConflict};
pub use operation::SharedOperation;
