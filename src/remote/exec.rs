//! Command-execution session pool.
//!
//! One cached authenticated session per `provider:connection` key, created
//! lazily on first use and kept for the process lifetime.  Entries are never
//! evicted, not even when a pooled session later fails — only a failed
//! *establishment* leaves no entry, so the next call can retry cleanly.
//!
//! Two concurrent first uses of one key may both connect; the second insert
//! overwrites the first.  Serializing per-key creation would change
//! observable behavior, so the race is left as documented.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::debug;

use super::registry::RemoteConnectionRegistry;
use super::session::SshSession;
use super::{Connector, ExecOptions, Transport};
use crate::errors::QuadletResult;
use crate::model::{ProviderConnection, RemoteConnection, RunResult};

// ---------------------------------------------------------------------------
// Default connector
// ---------------------------------------------------------------------------

/// Opens real [`SshSession`]s.
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, remote: &RemoteConnection) -> QuadletResult<Arc<dyn Transport>> {
        Ok(Arc::new(SshSession::connect(remote).await?))
    }
}

// ---------------------------------------------------------------------------
// SessionPool
// ---------------------------------------------------------------------------

/// Pool of command-execution sessions, one per connection key.
pub struct SessionPool {
    registry: Arc<RemoteConnectionRegistry>,
    connector: Arc<dyn Connector>,
    pool: Mutex<HashMap<String, Arc<dyn Transport>>>,
}

impl SessionPool {
    pub fn new(registry: Arc<RemoteConnectionRegistry>) -> Self {
        Self::with_connector(registry, Arc::new(SshConnector))
    }

    /// Pool with a custom session connector (tests use this seam).
    pub fn with_connector(
        registry: Arc<RemoteConnectionRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            registry,
            connector,
            pool: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached session for `connection`, connecting on first use.
    async fn get_session(
        &self,
        connection: &ProviderConnection,
    ) -> QuadletResult<Arc<dyn Transport>> {
        let key = connection.key();

        if let Ok(pool) = self.pool.lock()
            && let Some(session) = pool.get(&key)
        {
            debug!("reusing existing session: cache hit for {key}");
            return Ok(Arc::clone(session));
        }

        debug!("creating ssh session for key {key}");
        let remote = self.registry.get_remote_connection(connection)?;
        let session = self.connector.connect(&remote).await?;

        if let Ok(mut pool) = self.pool.lock() {
            pool.insert(key, Arc::clone(&session));
        }
        Ok(session)
    }

    /// Run `program` on `connection` through the pooled session.
    pub async fn exec(
        &self,
        connection: &ProviderConnection,
        program: &str,
        options: ExecOptions,
    ) -> QuadletResult<RunResult> {
        let session = self.get_session(connection).await?;
        session.exec(program, options).await
    }

    /// Run `systemctl` on `connection`.  Privilege handling (the `--user`
    /// flag) is the caller's business — it owns the admin decision.
    pub async fn systemctl_exec(
        &self,
        connection: &ProviderConnection,
        options: ExecOptions,
    ) -> QuadletResult<RunResult> {
        self.exec(connection, "systemctl", options).await
    }

    /// Run `journalctl` on `connection`.
    pub async fn journalctl_exec(
        &self,
        connection: &ProviderConnection,
        options: ExecOptions,
    ) -> QuadletResult<RunResult> {
        self.exec(connection, "journalctl", options).await
    }

    /// Drop every pooled session.  Called at shutdown only.
    pub fn dispose(&self) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.clear();
        }
    }

    /// Number of live pooled sessions.
    pub fn session_count(&self) -> usize {
        self.pool.lock().map(|pool| pool.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
