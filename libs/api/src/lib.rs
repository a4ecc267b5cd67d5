//! # landform-api
//!
//! Resource types stored in the cluster and exchanged with the controller.
//!
//! ## Resources
//!
//! - [`Installation`]: a composite deployment with a blueprint reference,
//!   imports and exports. Owns at most one [`Execution`] and any number of
//!   child installations.
//! - [`Execution`]: the deploy items materialized from an installation's
//!   blueprint.
//!
//! ## Conventions
//!
//! - Every object carries [`ObjectMeta`]; `generation` moves only when the
//!   spec changes, `resourceVersion` moves on every write.
//! - Status is written through a separate subresource and never changes
//!   `generation`.
//! - A [`Scheme`] must be built explicitly with [`install`] before decoding
//!   raw objects; there is no process-wide registry.

mod error;
mod execution;
mod installation;
mod meta;
mod scheme;
mod status;

pub use error::ApiError;
pub use execution::*;
pub use installation::*;
pub use meta::*;
pub use scheme::{install, Object, ObjectKind, Scheme};
pub use status::*;

/// API group of all landform resources.
pub const GROUP: &str = "landform.io";

/// API version of all landform resources.
pub const API_VERSION: &str = "landform.io/v1alpha1";

/// Finalizer the installation controller places on every installation.
pub const FINALIZER: &str = "finalizer.landform.io";

/// Annotation carrying a requested [`Operation`].
pub const OPERATION_ANNOTATION: &str = "landform.io/operation";

/// Label carrying the name of the parent installation of a sub-installation.
pub const ENCOMPASSED_BY_LABEL: &str = "landform.io/encompassed-by";
