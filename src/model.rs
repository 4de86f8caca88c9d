//! Core data model.
//!
//! A [`Quadlet`] is one systemd unit definition describing a container-engine
//! workload, as discovered by a generator dry-run on one connection.  The
//! model is deliberately dumb: everything here is rebuilt from scratch on
//! every refresh, nothing is persisted.

use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

// ---------------------------------------------------------------------------
// Quadlet type
// ---------------------------------------------------------------------------

/// The supported quadlet kinds, one per recognized file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuadletType {
    Container,
    Volume,
    Image,
    Network,
    Pod,
    Kube,
}

/// Extension table for the supported kinds.
const KNOWN_TYPES: &[(&str, QuadletType)] = &[
    ("container", QuadletType::Container),
    ("volume", QuadletType::Volume),
    ("image", QuadletType::Image),
    ("network", QuadletType::Network),
    ("pod", QuadletType::Pod),
    ("kube", QuadletType::Kube),
];

impl QuadletType {
    /// The canonical (lower-case) file extension for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            QuadletType::Container => "container",
            QuadletType::Volume => "volume",
            QuadletType::Image => "image",
            QuadletType::Network => "network",
            QuadletType::Pod => "pod",
            QuadletType::Kube => "kube",
        }
    }

    /// Match a file extension (without the dot) against the supported kinds,
    /// case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        KNOWN_TYPES
            .iter()
            .find(|(label, _)| extension.eq_ignore_ascii_case(label))
            .map(|&(_, kind)| kind)
    }
}

impl fmt::Display for QuadletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

// ---------------------------------------------------------------------------
// Quadlet state
// ---------------------------------------------------------------------------

/// Lifecycle state of a quadlet's generated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadletState {
    Active,
    Inactive,
    Deleting,
    /// The generator refused the source file; there is no service.
    Error,
    #[default]
    Unknown,
}

// ---------------------------------------------------------------------------
// Quadlet
// ---------------------------------------------------------------------------

/// Variant-specific data, keyed off the `@` marker in the source file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuadletVariant {
    /// A plain unit (`web.container`).
    Simple,
    /// A template unit (`web@.container`).
    Template {
        template: String,
        /// `DefaultInstance=` from the generated `[Install]` section, when
        /// one could be determined.
        default_instance: Option<String>,
    },
    /// An instantiated template (`web@1.container`).
    TemplateInstance { template: String, argument: String },
}

/// One discovered quadlet.
///
/// The `id` is generated per parse and is not stable across refreshes, let
/// alone process restarts.  `service` is present exactly when the generator
/// accepted the file (`state != Error`).
#[derive(Debug, Clone, PartialEq)]
pub struct Quadlet {
    pub id: Uuid,
    /// Absolute path of the source unit file on the connection.
    pub path: String,
    pub kind: QuadletType,
    pub state: QuadletState,
    /// Name of the generated systemd service; `None` only for error entries.
    pub service: Option<String>,
    /// Ids of sibling quadlets this one `Requires=`, in declaration order.
    /// Empty when dependencies could not be determined.
    pub requires: Vec<Uuid>,
    /// Generated unit text (empty for error entries).
    pub content: String,
    pub variant: QuadletVariant,
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Identifier of one provider container connection, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderConnection {
    pub provider_id: String,
    pub name: String,
    /// Set when the connection is backed by a podman machine; its rootful
    /// flag then decides privileged execution.
    pub vm_type: Option<String>,
}

impl ProviderConnection {
    /// Pool/cache key for this connection.
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider_id, self.name)
    }
}

impl fmt::Display for ProviderConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Transport parameters of one remote connection, as reported by
/// `podman system connection list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnection {
    pub name: String,
    /// Connection uri, e.g. `ssh://core@localhost:59622/run/user/1000/podman/podman.sock`.
    pub uri: String,
    /// Path of the identity (private key) file.  Connections without one are
    /// rejected at session creation, never silently defaulted.
    pub identity: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Command results
// ---------------------------------------------------------------------------

/// Buffered output of a successfully executed remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

impl From<crate::errors::RunError> for RunResult {
    fn from(err: crate::errors::RunError) -> Self {
        Self {
            command: err.command,
            stdout: err.stdout,
            stderr: err.stderr,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
