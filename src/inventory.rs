//! Quadlet inventory.
//!
//! Holds the per-connection quadlet snapshots.  A refresh runs the quadlet
//! generator in dry-run mode through the session pool, re-parses its output
//! into a fresh typed list, resolves the live service states, and swaps the
//! snapshot — nothing is patched in place and nothing survives between
//! refreshes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::warn;
use uuid::Uuid;

use crate::errors::{QuadletError, QuadletResult};
use crate::model::{ProviderConnection, Quadlet, QuadletState, RunResult};
use crate::parser::DryRunParser;
use crate::remote::{ExecOptions, SessionPool};
use crate::systemd::PrivilegeResolver;

/// Path of the quadlet generator binary on the connection.
pub const QUADLET_GENERATOR: &str = "/usr/libexec/podman/quadlet";

pub struct QuadletInventory {
    exec: Arc<SessionPool>,
    privilege: Arc<PrivilegeResolver>,
    quadlets: RwLock<HashMap<String, Vec<Quadlet>>>,
}

impl QuadletInventory {
    pub fn new(exec: Arc<SessionPool>, privilege: Arc<PrivilegeResolver>) -> Self {
        Self {
            exec,
            privilege,
            quadlets: RwLock::new(HashMap::new()),
        }
    }

    /// All known quadlets across connections.
    pub fn all(&self) -> Vec<Quadlet> {
        self.quadlets
            .read()
            .map(|map| map.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up one quadlet by id.
    pub fn get(&self, id: Uuid) -> QuadletResult<Quadlet> {
        self.quadlets
            .read()
            .ok()
            .and_then(|map| {
                map.values()
                    .flatten()
                    .find(|quadlet| quadlet.id == id)
                    .cloned()
            })
            .ok_or_else(|| QuadletError::UnknownQuadlet(id.to_string()))
    }

    /// Flag a quadlet as going away while its removal is in flight.
    pub fn mark_deleting(&self, id: Uuid) {
        if let Ok(mut map) = self.quadlets.write() {
            for quadlet in map.values_mut().flatten() {
                if quadlet.id == id {
                    quadlet.state = QuadletState::Deleting;
                }
            }
        }
    }

    /// Rebuild the snapshot for `connection` from a generator dry-run.
    pub async fn refresh(&self, connection: &ProviderConnection) -> QuadletResult<()> {
        let admin = self.privilege.resolve(connection).await?;

        let mut args = vec!["-dryrun".to_string()];
        if !admin {
            args.push("-user".to_string());
        }

        let output = match self
            .exec
            .exec(
                connection,
                QUADLET_GENERATOR,
                ExecOptions {
                    args,
                    ..Default::default()
                },
            )
            .await
        {
            Ok(result) => result,
            // The generator exits non-zero whenever any source unit fails to
            // convert; its output is still exactly the dry-run payload.
            Err(QuadletError::Command(run)) => RunResult::from(run),
            Err(err) => return Err(err),
        };

        let mut quadlets = DryRunParser::new(output).parse()?;
        self.refresh_states(connection, admin, &mut quadlets).await;

        if let Ok(mut map) = self.quadlets.write() {
            map.insert(connection.key(), quadlets);
        }
        Ok(())
    }

    /// Resolve the live state of every generated service via
    /// `systemctl is-active`.  Failures here degrade to `Unknown` states,
    /// they never fail the refresh.
    async fn refresh_states(
        &self,
        connection: &ProviderConnection,
        admin: bool,
        quadlets: &mut [Quadlet],
    ) {
        let services: Vec<String> = quadlets
            .iter()
            .filter_map(|quadlet| quadlet.service.clone())
            .collect();
        if services.is_empty() {
            return;
        }

        let mut args = Vec::new();
        if !admin {
            args.push("--user".to_string());
        }
        args.push("is-active".to_string());
        args.extend(services);

        // `is-active` exits non-zero when any unit is not active; the
        // per-unit states on stdout are what we want either way.
        let output = match self
            .exec
            .systemctl_exec(
                connection,
                ExecOptions {
                    args,
                    ..Default::default()
                },
            )
            .await
        {
            Ok(result) => result,
            Err(QuadletError::Command(run)) => RunResult::from(run),
            Err(err) => {
                warn!("could not resolve service states for {connection}: {err}");
                return;
            }
        };

        // One state per queried service, in argument order.
        let mut states = output.stdout.lines();
        for quadlet in quadlets.iter_mut().filter(|q| q.service.is_some()) {
            quadlet.state = match states.next().map(str::trim) {
                Some("active") => QuadletState::Active,
                Some("inactive") | Some("failed") => QuadletState::Inactive,
                _ => QuadletState::Unknown,
            };
        }
    }

    #[cfg(test)]
    pub(crate) fn install_snapshot(&self, connection: &ProviderConnection, quadlets: Vec<Quadlet>) {
        if let Ok(mut map) = self.quadlets.write() {
            map.insert(connection.key(), quadlets);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
