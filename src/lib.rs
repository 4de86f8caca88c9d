//! `quadlet-rs` — manage podman quadlet systemd units across local and
//! remote container connections.
//!
//! A *quadlet* is a systemd unit definition describing a container-engine
//! workload (`.container`, `.volume`, `.image`, `.network`, `.pod`,
//! `.kube`), translated into a native service by podman's quadlet
//! generator.  This crate covers the two hard parts of managing them:
//!
//! - **Parsing**: a generator dry-run reports generated units on stdout and
//!   the attempted source files on stderr; [`parser::DryRunParser`] rebuilds
//!   a typed inventory from that, tolerating per-file failures.
//! - **Remote execution**: every connection is reached over SSH.
//!   [`remote::SessionPool`] and [`remote::FilePool`] cache one
//!   authenticated session per connection and run the privileged
//!   `systemctl`/generator commands through it.
//!
//! [`systemd::SystemdLifecycle`] ties the two together: lifecycle mutations
//! run through the pools with the right privilege and always trigger an
//! asynchronous re-parse of the inventory.
//!
//! The host application supplies the [`provider`] seams (connection
//! enumeration, machine introspection) and forwards provider-change events
//! into the [`remote::RemoteConnectionRegistry`].

pub mod errors;
pub mod inventory;
pub mod logger;
pub mod model;
pub mod parser;
pub mod provider;
pub mod remote;
pub mod systemd;

#[cfg(test)]
mod testing;

pub use errors::{QuadletError, QuadletResult, RunError};
pub use inventory::QuadletInventory;
pub use logger::{BufferedLogger, Logger, LoggerRegistry};
pub use model::{
    ProviderConnection, Quadlet, QuadletState, QuadletType, QuadletVariant, RemoteConnection,
    RunResult,
};
pub use parser::DryRunParser;
pub use provider::{MachineIntrospection, ProviderEvent, RemoteConnectionSource};
pub use remote::{FilePool, RemoteConnectionRegistry, SessionPool};
pub use systemd::{PrivilegeResolver, SystemdLifecycle};
