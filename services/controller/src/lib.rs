//! landform installation controller.
//!
//! Reconciles Installation resources: adds the finalizer, resolves the
//! blueprint through the registries, materializes the Execution and the
//! sub-installations, and tears everything down in dependency order when
//! the installation is deleted.
//!
//! ## Modules
//!
//! - `installation`: the actuator, deletion orchestrator and progress logic
//! - `registry`: access-type keyed artifact registries and the content cache
//! - `store`: the resource store contract and its in-memory implementation
//! - `watch`: maps store change events to work-queue keys

pub mod config;
pub mod installation;
pub mod manifest;
pub mod registry;
pub mod store;
pub mod watch;

pub use installation::{Actuator, ActuatorConfig, ActuatorError, SharedOperation};
pub use registry::{Registries, RegistriesConfig, RegistryManager};
pub use store::{Client, MemoryStore};
