//! External collaborator seams.
//!
//! The crate never talks to podman or a provider registry directly; the host
//! application implements these traits and wires provider-change events into
//! the [`registry`](crate::remote::registry) through a channel.

use async_trait::async_trait;

use crate::errors::QuadletResult;
use crate::model::{ProviderConnection, RemoteConnection};

/// A change in the set of provider container connections.
///
/// The registry reacts identically to all three: it drops its snapshot and
/// rebuilds the full connection map from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    Registered,
    Unregistered,
    Updated,
}

/// Enumerates the remote connections known to the container engine, with
/// their transport parameters (`podman system connection list`).
#[async_trait]
pub trait RemoteConnectionSource: Send + Sync {
    async fn remote_connections(&self) -> QuadletResult<Vec<RemoteConnection>>;
}

/// Introspection of podman machines backing VM-type connections.
#[async_trait]
pub trait MachineIntrospection: Send + Sync {
    /// Whether the machine behind `connection` runs rootful.  Queried on
    /// every privileged call; rootful state is externally mutable, so the
    /// answer is never cached.
    async fn is_rootful(&self, connection: &ProviderConnection) -> QuadletResult<bool>;
}
