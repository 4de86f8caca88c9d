//! Remote connection registry.
//!
//! Tracks which provider connections are remote and their transport
//! parameters.  The snapshot is rebuilt in full on every provider-change
//! event — incremental patching of a map that another process owns is how
//! drift happens, and a full `podman system connection list` is cheap.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, error};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{QuadletError, QuadletResult};
use crate::model::{ProviderConnection, RemoteConnection};
use crate::provider::{ProviderEvent, RemoteConnectionSource};

pub struct RemoteConnectionRegistry {
    source: Arc<dyn RemoteConnectionSource>,
    /// `None` until the first snapshot completes; every lookup before that
    /// fails `NotFound`, it does not block.
    snapshot: RwLock<Option<HashMap<String, RemoteConnection>>>,
}

impl RemoteConnectionRegistry {
    pub fn new(source: Arc<dyn RemoteConnectionSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
        }
    }

    /// Fetch the current remote connections and replace the snapshot.
    pub async fn rebuild(&self) -> QuadletResult<()> {
        let connections = self.source.remote_connections().await?;
        debug!("collected {} remote connections", connections.len());

        let map: HashMap<String, RemoteConnection> = connections
            .into_iter()
            .map(|connection| (connection.name.clone(), connection))
            .collect();

        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = Some(map);
        }
        Ok(())
    }

    /// Whether `connection` is known to be remote in the latest snapshot.
    pub fn is_remote(&self, connection: &ProviderConnection) -> bool {
        self.snapshot
            .read()
            .ok()
            .and_then(|snapshot| {
                snapshot
                    .as_ref()
                    .map(|map| map.contains_key(&connection.name))
            })
            .unwrap_or(false)
    }

    /// Transport parameters for `connection`.
    ///
    /// Fails [`QuadletError::NotFound`] for any connection absent from the
    /// current snapshot, including during the window before the first
    /// snapshot completes.
    pub fn get_remote_connection(
        &self,
        connection: &ProviderConnection,
    ) -> QuadletResult<RemoteConnection> {
        self.snapshot
            .read()
            .ok()
            .and_then(|snapshot| snapshot.as_ref()?.get(&connection.name).cloned())
            .ok_or_else(|| QuadletError::NotFound(connection.name.clone()))
    }

    /// Spawn a task rebuilding the snapshot on every provider event.
    /// Rebuild failures are logged; the listener keeps running.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<ProviderEvent>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!("provider event {event:?}: rebuilding remote connection snapshot");
                if let Err(err) = registry.rebuild().await {
                    error!("failed to rebuild remote connections: {err}");
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
