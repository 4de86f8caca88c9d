//! systemd-side control: privilege resolution and unit lifecycle.

pub mod lifecycle;
pub mod privilege;

pub use lifecycle::SystemdLifecycle;
pub use privilege::PrivilegeResolver;
