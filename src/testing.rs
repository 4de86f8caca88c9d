//! Shared test doubles for the transport and provider seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{QuadletError, QuadletResult};
use crate::model::{ProviderConnection, RemoteConnection, RunResult};
use crate::provider::{MachineIntrospection, RemoteConnectionSource};
use crate::remote::{Connector, ExecOptions, FileConnector, FileTransport, Transport};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn connection(name: &str) -> ProviderConnection {
    ProviderConnection {
        provider_id: "podman".into(),
        name: name.into(),
        vm_type: None,
    }
}

pub(crate) fn remote(name: &str) -> RemoteConnection {
    RemoteConnection {
        name: name.into(),
        uri: format!("ssh://core@{name}:22/run/user/1000/podman/podman.sock"),
        identity: Some("/home/user/.ssh/id_ed25519".into()),
    }
}

pub(crate) fn run_result(stdout: &str, stderr: &str) -> RunResult {
    RunResult {
        command: String::new(),
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

// ---------------------------------------------------------------------------
// Connection source
// ---------------------------------------------------------------------------

pub(crate) struct StaticConnectionSource {
    connections: Mutex<Vec<RemoteConnection>>,
}

impl StaticConnectionSource {
    pub(crate) fn new(connections: Vec<RemoteConnection>) -> Self {
        Self {
            connections: Mutex::new(connections),
        }
    }

    pub(crate) fn replace(&self, connections: Vec<RemoteConnection>) {
        *self.connections.lock().unwrap() = connections;
    }
}

#[async_trait]
impl RemoteConnectionSource for StaticConnectionSource {
    async fn remote_connections(&self) -> QuadletResult<Vec<RemoteConnection>> {
        Ok(self.connections.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Exec transport doubles
// ---------------------------------------------------------------------------

/// Records every executed command line and replays queued responses.
/// With the queue empty, every command succeeds with empty output.
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<QuadletResult<RunResult>>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push_response(&self, response: QuadletResult<RunResult>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn exec(&self, program: &str, options: ExecOptions) -> QuadletResult<RunResult> {
        let command_line = std::iter::once(program)
            .chain(options.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(command_line.clone());

        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(RunResult {
                command: command_line,
                ..Default::default()
            }),
        }
    }
}

/// Connector handing out one shared [`RecordingTransport`] and counting the
/// connection attempts.
pub(crate) struct StaticTransportConnector {
    transport: Arc<RecordingTransport>,
    connects: AtomicUsize,
}

impl StaticTransportConnector {
    pub(crate) fn new() -> Self {
        Self {
            transport: Arc::new(RecordingTransport::new()),
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn push_response(&self, response: QuadletResult<RunResult>) {
        self.transport.push_response(response);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.transport.calls()
    }

    /// Wait until at least `count` commands were executed; background
    /// refreshes are fire-and-forget, so tests poll for them.
    pub(crate) async fn wait_for_calls(&self, count: usize) {
        for _ in 0..400 {
            if self.calls().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "timed out waiting for {count} transport calls, saw {:?}",
            self.calls()
        );
    }
}

#[async_trait]
impl Connector for StaticTransportConnector {
    async fn connect(&self, _remote: &RemoteConnection) -> QuadletResult<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.transport) as _)
    }
}

/// Connector failing its first attempt, succeeding afterwards.
pub(crate) struct FailingConnector {
    failed: AtomicBool,
    connects: AtomicUsize,
    transport: Arc<RecordingTransport>,
}

impl FailingConnector {
    pub(crate) fn once() -> Self {
        Self {
            failed: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            transport: Arc::new(RecordingTransport::new()),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&self, remote: &RemoteConnection) -> QuadletResult<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(QuadletError::ConnectionFailed {
                host: remote.name.clone(),
                reason: "simulated connect failure".into(),
            });
        }
        Ok(Arc::clone(&self.transport) as _)
    }
}

// ---------------------------------------------------------------------------
// File transport doubles
// ---------------------------------------------------------------------------

/// In-memory file store standing in for the SFTP channel.
pub(crate) struct MemoryFileTransport {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryFileTransport {
    pub(crate) fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn install(&self, path: &str, content: Bytes) {
        self.files.lock().unwrap().insert(path.to_string(), content);
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}

#[async_trait]
impl FileTransport for MemoryFileTransport {
    async fn read(&self, path: &str) -> QuadletResult<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| QuadletError::Sftp(format!("no such file: {path}")))
    }

    async fn write(&self, path: &str, content: Bytes) -> QuadletResult<()> {
        self.files.lock().unwrap().insert(path.to_string(), content);
        Ok(())
    }

    async fn remove(&self, path: &str) -> QuadletResult<()> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| QuadletError::Sftp(format!("no such file: {path}")))
    }
}

pub(crate) struct MemoryFileConnector {
    transport: Arc<MemoryFileTransport>,
    connects: AtomicUsize,
}

impl MemoryFileConnector {
    pub(crate) fn new() -> Self {
        Self {
            transport: Arc::new(MemoryFileTransport::new()),
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn transport(&self) -> &MemoryFileTransport {
        &self.transport
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileConnector for MemoryFileConnector {
    async fn connect(&self, _remote: &RemoteConnection) -> QuadletResult<Arc<dyn FileTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.transport) as _)
    }
}

// ---------------------------------------------------------------------------
// Machine introspection double
// ---------------------------------------------------------------------------

pub(crate) struct MockMachines {
    rootful: AtomicBool,
    queries: AtomicUsize,
}

impl MockMachines {
    pub(crate) fn rootful(rootful: bool) -> Self {
        Self {
            rootful: AtomicBool::new(rootful),
            queries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_rootful(&self, rootful: bool) {
        self.rootful.store(rootful, Ordering::SeqCst);
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MachineIntrospection for MockMachines {
    async fn is_rootful(&self, _connection: &ProviderConnection) -> QuadletResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.rootful.load(Ordering::SeqCst))
    }
}
