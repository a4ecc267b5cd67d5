//! # landform-id
//!
//! Identity types for objects held in the resource store.
//!
//! ## Design Principles
//!
//! - Names are user-controlled; UIDs are system-generated and never reused
//! - A namespaced key (`namespace/name`) is how the work queue and the store
//!   address an object
//! - Resource versions are opaque to callers and only ever compared for equality
//!
//! ## Formats
//!
//! - UID: `uid_{ulid}`, e.g. `uid_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - Object key: `{namespace}/{name}`, e.g. `landscape/ingress-stack`
//! - Resource version: decimal string, e.g. `"42"`

mod error;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
