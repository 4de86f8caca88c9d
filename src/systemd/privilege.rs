//! Privilege resolution.
//!
//! A connection backed by a podman machine runs its quadlet services
//! rootful or rootless depending on how the machine was created, and that
//! flag can change between calls (`podman machine set --rootful`).  The
//! answer is therefore recomputed on every privileged call and never
//! cached.

use std::sync::Arc;

use crate::errors::QuadletResult;
use crate::model::ProviderConnection;
use crate::provider::MachineIntrospection;

pub struct PrivilegeResolver {
    machines: Arc<dyn MachineIntrospection>,
}

impl PrivilegeResolver {
    pub fn new(machines: Arc<dyn MachineIntrospection>) -> Self {
        Self { machines }
    }

    /// Whether calls on `connection` must run privileged.
    ///
    /// Connections without a VM type always run unprivileged; for the rest
    /// the machine's rootful flag decides.
    pub async fn resolve(&self, connection: &ProviderConnection) -> QuadletResult<bool> {
        if connection.vm_type.is_none() {
            return Ok(false);
        }
        self.machines.is_rootful(connection).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
