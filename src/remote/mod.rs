//! Remote execution substrate.
//!
//! Each remote podman connection is reached over SSH.  The [`Transport`] and
//! [`FileTransport`] traits are the seams between the pooling layer and the
//! concrete `openssh`/`openssh-sftp-client` sessions, which also keeps the
//! pools testable without a live host.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::errors::QuadletResult;
use crate::logger::Logger;
use crate::model::{RemoteConnection, RunResult};

pub mod exec;
pub mod fs;
pub mod registry;
pub mod session;
pub mod uri;

pub use exec::SessionPool;
pub use fs::FilePool;
pub use registry::RemoteConnectionRegistry;
pub use session::SshSession;

// ---------------------------------------------------------------------------
// Exec options
// ---------------------------------------------------------------------------

/// Options for one remote command execution.
#[derive(Default)]
pub struct ExecOptions {
    pub args: Vec<String>,
    /// Extra environment for the remote process.  OpenSSH does not forward
    /// arbitrary variables, so these are applied through `env(1)`.
    pub env: Option<HashMap<String, String>>,
    /// Receives the output line-by-line while the command runs.
    pub logger: Option<Arc<dyn Logger>>,
    /// Cancelling this token terminates the remote process; the output
    /// buffered so far is returned as the result.
    pub token: Option<CancellationToken>,
}

// ---------------------------------------------------------------------------
// Transport seams
// ---------------------------------------------------------------------------

/// A live command-execution session on one connection.
///
/// One command at a time: concurrent calls on the same session are the
/// caller's responsibility to serialize.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exec(&self, program: &str, options: ExecOptions) -> QuadletResult<RunResult>;
}

/// Opens [`Transport`] sessions; the pool calls this exactly once per key
/// (modulo the unserialised first-use race).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, remote: &RemoteConnection) -> QuadletResult<Arc<dyn Transport>>;
}

/// A live file-transfer session on one connection.
#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn read(&self, path: &str) -> QuadletResult<Bytes>;
    async fn write(&self, path: &str, content: Bytes) -> QuadletResult<()>;
    async fn remove(&self, path: &str) -> QuadletResult<()>;
}

/// Opens [`FileTransport`] sessions.
#[async_trait]
pub trait FileConnector: Send + Sync {
    async fn connect(&self, remote: &RemoteConnection) -> QuadletResult<Arc<dyn FileTransport>>;
}
