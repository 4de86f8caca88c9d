//! Quadlet lifecycle control.
//!
//! Every mutation follows the same shape: resolve the quadlet, resolve the
//! privilege context, run the systemd command over the pooled session, and
//! finally trigger an asynchronous full refresh of the inventory —
//! regardless of whether the command itself succeeded.  Refresh failures
//! are logged and never surfaced to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, warn};
use uuid::Uuid;

use crate::errors::{QuadletError, QuadletResult};
use crate::inventory::QuadletInventory;
use crate::logger::{Logger, LoggerRegistry};
use crate::model::{ProviderConnection, RunResult};
use crate::remote::{ExecOptions, FilePool, SessionPool};
use crate::systemd::PrivilegeResolver;

/// Quadlet directory for rootful connections.
pub const ROOTFUL_SYSTEMD_DIR: &str = "/etc/containers/systemd";
/// Quadlet directory for rootless connections.
pub const ROOTLESS_SYSTEMD_DIR: &str = "~/.config/containers/systemd";

pub struct SystemdLifecycle {
    exec: Arc<SessionPool>,
    files: Arc<FilePool>,
    privilege: Arc<PrivilegeResolver>,
    inventory: Arc<QuadletInventory>,
    loggers: Arc<LoggerRegistry>,
}

impl SystemdLifecycle {
    pub fn new(
        exec: Arc<SessionPool>,
        files: Arc<FilePool>,
        privilege: Arc<PrivilegeResolver>,
        inventory: Arc<QuadletInventory>,
        loggers: Arc<LoggerRegistry>,
    ) -> Self {
        Self {
            exec,
            files,
            privilege,
            inventory,
            loggers,
        }
    }

    // -----------------------------------------------------------------------
    // start / stop
    // -----------------------------------------------------------------------

    /// Start the quadlet's service.  `Ok(true)` when systemd accepted the
    /// start, `Ok(false)` when the command itself exited non-zero.
    pub async fn start(&self, connection: &ProviderConnection, id: Uuid) -> QuadletResult<bool> {
        self.unit_action(connection, id, "start").await
    }

    /// Stop the quadlet's service.
    pub async fn stop(&self, connection: &ProviderConnection, id: Uuid) -> QuadletResult<bool> {
        self.unit_action(connection, id, "stop").await
    }

    async fn unit_action(
        &self,
        connection: &ProviderConnection,
        id: Uuid,
        verb: &str,
    ) -> QuadletResult<bool> {
        // Preconditions come first: a quadlet without a service name fails
        // here, before any transport work happens.
        let quadlet = self.inventory.get(id)?;
        let Some(service) = quadlet.service else {
            return Err(QuadletError::MissingService(id.to_string()));
        };

        let admin = self.privilege.resolve(connection).await?;

        let mut args = Vec::new();
        if !admin {
            args.push("--user".to_string());
        }
        args.push(verb.to_string());
        args.push(service);

        let result = self
            .exec
            .systemctl_exec(
                connection,
                ExecOptions {
                    args,
                    ..Default::default()
                },
            )
            .await;

        // The mutation was attempted; re-derive the inventory either way.
        self.spawn_refresh(connection);

        match result {
            Ok(_) => Ok(true),
            Err(QuadletError::Command(run)) => {
                warn!("systemctl {verb} failed: {run}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    // -----------------------------------------------------------------------
    // remove
    // -----------------------------------------------------------------------

    /// Delete the source files of the given quadlets and reload systemd.
    pub async fn remove(
        &self,
        connection: &ProviderConnection,
        ids: &[Uuid],
    ) -> QuadletResult<()> {
        let admin = self.privilege.resolve(connection).await?;
        let result = self.remove_files(connection, admin, ids).await;
        self.spawn_refresh(connection);
        result
    }

    async fn remove_files(
        &self,
        connection: &ProviderConnection,
        admin: bool,
        ids: &[Uuid],
    ) -> QuadletResult<()> {
        for id in ids {
            let quadlet = self.inventory.get(*id)?;
            self.inventory.mark_deleting(*id);
            self.files.remove(connection, &quadlet.path).await?;
        }
        self.daemon_reload(connection, admin).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // read / write
    // -----------------------------------------------------------------------

    /// Contents of the quadlet's source file.
    pub async fn read(&self, connection: &ProviderConnection, id: Uuid) -> QuadletResult<String> {
        let quadlet = self.inventory.get(id)?;
        let content = self.files.read(connection, &quadlet.path).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Write a new quadlet file `name` into the connection's systemd
    /// directory, then reload and refresh.
    pub async fn save_into_machine(
        &self,
        connection: &ProviderConnection,
        name: &str,
        content: &str,
    ) -> QuadletResult<()> {
        let admin = self.privilege.resolve(connection).await?;
        let dir = if admin {
            ROOTFUL_SYSTEMD_DIR
        } else {
            ROOTLESS_SYSTEMD_DIR
        };
        let destination = format!("{dir}/{name}");
        self.write_and_reload(connection, admin, &destination, content)
            .await
    }

    /// Overwrite an existing quadlet file in place, then reload and refresh.
    pub async fn update_into_machine(
        &self,
        connection: &ProviderConnection,
        path: &str,
        content: &str,
    ) -> QuadletResult<()> {
        let admin = self.privilege.resolve(connection).await?;
        self.write_and_reload(connection, admin, path, content)
            .await
    }

    async fn write_and_reload(
        &self,
        connection: &ProviderConnection,
        admin: bool,
        destination: &str,
        content: &str,
    ) -> QuadletResult<()> {
        let result = async {
            self.files
                .write(connection, destination, Bytes::from(content.to_owned()))
                .await?;
            self.daemon_reload(connection, admin).await?;
            Ok(())
        }
        .await;
        self.spawn_refresh(connection);
        result
    }

    async fn daemon_reload(
        &self,
        connection: &ProviderConnection,
        admin: bool,
    ) -> QuadletResult<RunResult> {
        let mut args = Vec::new();
        if !admin {
            args.push("--user".to_string());
        }
        args.push("daemon-reload".to_string());
        self.exec
            .systemctl_exec(
                connection,
                ExecOptions {
                    args,
                    ..Default::default()
                },
            )
            .await
    }

    // -----------------------------------------------------------------------
    // journal follow
    // -----------------------------------------------------------------------

    /// Follow the quadlet's journal into a new registry logger.
    ///
    /// The `journalctl --follow` never resolves on its own; it is spawned
    /// detached with the logger's cancellation token, so disposing the
    /// logger terminates the remote process.  Returns the logger id.
    pub async fn follow_logs(
        &self,
        connection: &ProviderConnection,
        id: Uuid,
    ) -> QuadletResult<Uuid> {
        let quadlet = self.inventory.get(id)?;
        let Some(service) = quadlet.service else {
            return Err(QuadletError::MissingService(id.to_string()));
        };

        let admin = self.privilege.resolve(connection).await?;
        let logger = self.loggers.create_logger();

        let mut args = vec![
            "--follow".to_string(),
            format!("--unit={service}"),
            "--output=cat".to_string(),
        ];
        if !admin {
            args.push("--user".to_string());
        }

        let env = HashMap::from([
            ("SYSTEMD_COLORS".to_string(), "true".to_string()),
            (
                "DBUS_SESSION_BUS_ADDRESS".to_string(),
                "unix:path=/run/user/1000/bus".to_string(),
            ),
        ]);

        let options = ExecOptions {
            args,
            env: Some(env),
            logger: Some(Arc::clone(&logger) as Arc<dyn Logger>),
            token: Some(logger.token()),
        };

        let exec = Arc::clone(&self.exec);
        let connection = connection.clone();
        tokio::spawn(async move {
            if let Err(err) = exec.journalctl_exec(&connection, options).await {
                debug!("journal follow on {connection} ended: {err}");
            }
        });

        Ok(logger.id())
    }

    // -----------------------------------------------------------------------
    // refresh
    // -----------------------------------------------------------------------

    /// Fire-and-forget full inventory refresh.  Never awaited on the
    /// caller's return path; failures are logged and swallowed.
    fn spawn_refresh(&self, connection: &ProviderConnection) {
        let inventory = Arc::clone(&self.inventory);
        let connection = connection.clone();
        tokio::spawn(async move {
            if let Err(err) = inventory.refresh(&connection).await {
                error!("failed to refresh quadlets for {connection}: {err}");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::QUADLET_GENERATOR;
    use crate::model::{Quadlet, QuadletState, QuadletType, QuadletVariant};
    use crate::remote::RemoteConnectionRegistry;
    use crate::testing::{
        MemoryFileConnector, MockMachines, StaticConnectionSource, StaticTransportConnector,
        connection, remote, run_result,
    };

    struct Fixture {
        lifecycle: SystemdLifecycle,
        inventory: Arc<QuadletInventory>,
        connector: Arc<StaticTransportConnector>,
        files: Arc<MemoryFileConnector>,
        loggers: Arc<LoggerRegistry>,
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(RemoteConnectionRegistry::new(Arc::new(
            StaticConnectionSource::new(vec![remote("vm")]),
        )));
        registry.rebuild().await.unwrap();

        let connector = Arc::new(StaticTransportConnector::new());
        let exec = Arc::new(SessionPool::with_connector(
            Arc::clone(&registry),
            Arc::clone(&connector) as _,
        ));

        let files_connector = Arc::new(MemoryFileConnector::new());
        let files = Arc::new(FilePool::with_connector(
            registry,
            Arc::clone(&files_connector) as _,
        ));

        let privilege = Arc::new(PrivilegeResolver::new(Arc::new(MockMachines::rootful(
            false,
        ))));
        let inventory = Arc::new(QuadletInventory::new(
            Arc::clone(&exec),
            Arc::clone(&privilege),
        ));
        let loggers = Arc::new(LoggerRegistry::new());

        Fixture {
            lifecycle: SystemdLifecycle::new(
                exec,
                files,
                privilege,
                Arc::clone(&inventory),
                Arc::clone(&loggers),
            ),
            inventory,
            connector,
            files: files_connector,
            loggers,
        }
    }

    fn quadlet(service: Option<&str>) -> Quadlet {
        Quadlet {
            id: Uuid::new_v4(),
            path: "/home/core/.config/containers/systemd/nginx.container".into(),
            kind: QuadletType::Container,
            state: if service.is_some() {
                QuadletState::Inactive
            } else {
                QuadletState::Error
            },
            service: service.map(str::to_string),
            requires: Vec::new(),
            content: String::new(),
            variant: QuadletVariant::Simple,
        }
    }

    // -- start / stop ---------------------------------------------------------

    #[tokio::test]
    async fn start_runs_systemctl_and_refreshes_once() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(Some("nginx.service"));
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        assert!(fx.lifecycle.start(&vm, q.id).await.unwrap());

        // the systemctl call plus exactly one (async) inventory refresh
        fx.connector.wait_for_calls(2).await;
        let calls = fx.connector.calls();
        assert_eq!(calls[0], "systemctl --user start nginx.service");
        assert_eq!(calls[1], format!("{QUADLET_GENERATOR} -dryrun -user"));
        assert_eq!(
            calls
                .iter()
                .filter(|call| call.starts_with(QUADLET_GENERATOR))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_start_returns_false_and_still_refreshes() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(Some("nginx.service"));
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        fx.connector
            .push_response(Err(QuadletError::Command(crate::errors::RunError {
                command: "systemctl --user start nginx.service".into(),
                exit_code: 1,
                stdout: String::new(),
                stderr: "Failed to start nginx.service".into(),
            })));

        assert!(!fx.lifecycle.start(&vm, q.id).await.unwrap());

        fx.connector.wait_for_calls(2).await;
        let calls = fx.connector.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|call| call.starts_with(QUADLET_GENERATOR))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn start_without_service_fails_before_any_transport_call() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(None);
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        let err = fx.lifecycle.start(&vm, q.id).await.unwrap_err();
        assert!(matches!(err, QuadletError::MissingService(_)));

        // no systemctl, no refresh
        tokio::task::yield_now().await;
        assert!(fx.connector.calls().is_empty());
        assert_eq!(fx.connector.connects(), 0);
    }

    #[tokio::test]
    async fn start_unknown_quadlet_fails() {
        let fx = fixture().await;
        let err = fx
            .lifecycle
            .start(&connection("vm"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, QuadletError::UnknownQuadlet(_)));
    }

    #[tokio::test]
    async fn stop_uses_the_stop_verb() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(Some("nginx.service"));
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        assert!(fx.lifecycle.stop(&vm, q.id).await.unwrap());

        fx.connector.wait_for_calls(2).await;
        assert_eq!(fx.connector.calls()[0], "systemctl --user stop nginx.service");
    }

    // -- remove ----------------------------------------------------------------

    #[tokio::test]
    async fn remove_deletes_files_reloads_and_refreshes() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(Some("nginx.service"));
        fx.files
            .transport()
            .install(&q.path, Bytes::from("[Container]"));
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        fx.lifecycle.remove(&vm, &[q.id]).await.unwrap();

        assert!(!fx.files.transport().contains(&q.path));
        fx.connector.wait_for_calls(2).await;
        let calls = fx.connector.calls();
        assert_eq!(calls[0], "systemctl --user daemon-reload");
        assert_eq!(calls[1], format!("{QUADLET_GENERATOR} -dryrun -user"));
    }

    // -- read / write -----------------------------------------------------------

    #[tokio::test]
    async fn read_returns_the_source_file() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(Some("nginx.service"));
        fx.files
            .transport()
            .install(&q.path, Bytes::from("[Container]\nImage=nginx\n"));
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        let content = fx.lifecycle.read(&vm, q.id).await.unwrap();
        assert_eq!(content, "[Container]\nImage=nginx\n");
    }

    #[tokio::test]
    async fn save_into_machine_targets_the_rootless_directory() {
        let fx = fixture().await;
        let vm = connection("vm");

        fx.lifecycle
            .save_into_machine(&vm, "web.container", "[Container]\nImage=nginx\n")
            .await
            .unwrap();

        assert!(
            fx.files
                .transport()
                .contains("~/.config/containers/systemd/web.container")
        );
        fx.connector.wait_for_calls(2).await;
        assert_eq!(fx.connector.calls()[0], "systemctl --user daemon-reload");
    }

    // -- journal follow -----------------------------------------------------------

    #[tokio::test]
    async fn follow_logs_spawns_journalctl_with_the_logger_token() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(Some("nginx.service"));
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        let logger_id = fx.lifecycle.follow_logs(&vm, q.id).await.unwrap();
        assert!(fx.loggers.get_logger(logger_id).is_ok());

        fx.connector.wait_for_calls(1).await;
        let calls = fx.connector.calls();
        assert_eq!(
            calls[0],
            "journalctl --follow --unit=nginx.service --output=cat --user"
        );
    }

    #[tokio::test]
    async fn follow_logs_requires_a_service() {
        let fx = fixture().await;
        let vm = connection("vm");
        let q = quadlet(None);
        fx.inventory.install_snapshot(&vm, vec![q.clone()]);

        assert!(matches!(
            fx.lifecycle.follow_logs(&vm, q.id).await,
            Err(QuadletError::MissingService(_))
        ));
    }
}
