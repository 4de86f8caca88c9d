//! File-transfer session pool.
//!
//! Same pooling discipline as the exec pool, but each entry is an SFTP
//! channel opened over its own authenticated SSH session.  File paths may
//! start with `~`, which resolves against the remote login user's home —
//! quadlet directories for rootless connections live under
//! `~/.config/containers/systemd`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use openssh_sftp_client::{Sftp, SftpOptions};

use super::registry::RemoteConnectionRegistry;
use super::session::SshSession;
use super::{FileConnector, FileTransport};
use crate::errors::{QuadletError, QuadletResult};
use crate::model::{ProviderConnection, RemoteConnection};

// ---------------------------------------------------------------------------
// SFTP transport
// ---------------------------------------------------------------------------

/// One SFTP channel, bound to the login user of its SSH session.
pub struct SftpTransport {
    sftp: Sftp,
    username: Option<String>,
}

impl SftpTransport {
    /// Open an SSH session for `remote` and start the SFTP subsystem on it.
    pub async fn connect(remote: &RemoteConnection) -> QuadletResult<Self> {
        let session = SshSession::connect(remote).await?;
        let username = session.username().map(str::to_string);

        let sftp = Sftp::from_clonable_session(session.session(), SftpOptions::default())
            .await
            .map_err(|e| QuadletError::Sftp(e.to_string()))?;

        Ok(Self { sftp, username })
    }

    fn resolve(&self, path: &str) -> String {
        resolve_home(path, self.username.as_deref())
    }
}

#[async_trait]
impl FileTransport for SftpTransport {
    async fn read(&self, path: &str) -> QuadletResult<Bytes> {
        let resolved = self.resolve(path);
        let mut fs = self.sftp.fs();
        let data = fs
            .read(&resolved)
            .await
            .map_err(|e| QuadletError::Sftp(e.to_string()))?;
        Ok(data.freeze())
    }

    async fn write(&self, path: &str, content: Bytes) -> QuadletResult<()> {
        let resolved = self.resolve(path);
        let mut fs = self.sftp.fs();

        // Ensure the destination's parent directories exist.  SFTP mkdir is
        // not recursive, so walk the ancestors; an already existing
        // directory fails the mkdir and that is fine.
        if let Some(parent) = Path::new(&resolved).parent() {
            let mut prefix = std::path::PathBuf::new();
            for component in parent.components() {
                prefix.push(component);
                if prefix.parent().is_none() {
                    continue; // the root itself
                }
                let _ = fs.create_dir(&prefix).await;
            }
        }

        fs.write(&resolved, &content[..])
            .await
            .map_err(|e| QuadletError::Sftp(e.to_string()))
    }

    async fn remove(&self, path: &str) -> QuadletResult<()> {
        let resolved = self.resolve(path);
        let mut fs = self.sftp.fs();
        fs.remove_file(&resolved)
            .await
            .map_err(|e| QuadletError::Sftp(e.to_string()))
    }
}

/// Resolve a leading `~` against the remote user's home directory.  Paths
/// without the marker, or sessions without a login user, pass through
/// unchanged.
fn resolve_home(path: &str, username: Option<&str>) -> String {
    match (path.strip_prefix('~'), username) {
        (Some(rest), Some(username)) => format!("/home/{username}{rest}"),
        _ => path.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Default connector
// ---------------------------------------------------------------------------

/// Opens real [`SftpTransport`]s.
pub struct SftpConnector;

#[async_trait]
impl FileConnector for SftpConnector {
    async fn connect(&self, remote: &RemoteConnection) -> QuadletResult<Arc<dyn FileTransport>> {
        Ok(Arc::new(SftpTransport::connect(remote).await?))
    }
}

// ---------------------------------------------------------------------------
// FilePool
// ---------------------------------------------------------------------------

/// Pool of file-transfer sessions, one per connection key.
pub struct FilePool {
    registry: Arc<RemoteConnectionRegistry>,
    connector: Arc<dyn FileConnector>,
    pool: Mutex<HashMap<String, Arc<dyn FileTransport>>>,
}

impl FilePool {
    pub fn new(registry: Arc<RemoteConnectionRegistry>) -> Self {
        Self::with_connector(registry, Arc::new(SftpConnector))
    }

    pub fn with_connector(
        registry: Arc<RemoteConnectionRegistry>,
        connector: Arc<dyn FileConnector>,
    ) -> Self {
        Self {
            registry,
            connector,
            pool: Mutex::new(HashMap::new()),
        }
    }

    async fn get_transport(
        &self,
        connection: &ProviderConnection,
    ) -> QuadletResult<Arc<dyn FileTransport>> {
        let key = connection.key();

        if let Ok(pool) = self.pool.lock()
            && let Some(transport) = pool.get(&key)
        {
            debug!("reusing existing file transport: cache hit for {key}");
            return Ok(Arc::clone(transport));
        }

        debug!("creating sftp transport for key {key}");
        let remote = self.registry.get_remote_connection(connection)?;
        let transport = self.connector.connect(&remote).await?;

        if let Ok(mut pool) = self.pool.lock() {
            pool.insert(key, Arc::clone(&transport));
        }
        Ok(transport)
    }

    pub async fn read(&self, connection: &ProviderConnection, path: &str) -> QuadletResult<Bytes> {
        debug!("read for connection {connection} at path {path}");
        self.get_transport(connection).await?.read(path).await
    }

    pub async fn write(
        &self,
        connection: &ProviderConnection,
        destination: &str,
        content: Bytes,
    ) -> QuadletResult<()> {
        debug!("write for connection {connection} at path {destination}");
        self.get_transport(connection)
            .await?
            .write(destination, content)
            .await
    }

    pub async fn remove(&self, connection: &ProviderConnection, path: &str) -> QuadletResult<()> {
        debug!("remove for connection {connection} at path {path}");
        self.get_transport(connection).await?.remove(path).await
    }

    /// Drop every pooled transport.  Called at shutdown only.
    pub fn dispose(&self) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.clear();
        }
    }

    pub fn transport_count(&self) -> usize {
        self.pool.lock().map(|pool| pool.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
