//! Handles shared by every installation reconcile.

use std::sync::Arc;

use crate::registry::Registries;
use crate::store::Client;

/// The store client and registries, shared across workers.
pub struct SharedOperation<C: Client> {
    client: Arc<C>,
    registries: Arc<Registries>,
}

impl<C: Client> SharedOperation<C> {
    pub fn new(client: Arc<C>, registries: Arc<Registries>) -> Self {
        Self { client, registries }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }
}
