//! SSH session.
//!
//! Uses the [`openssh`] crate (which shells out to the system's OpenSSH
//! binary) for session management.  This gives us `ControlMaster`
//! multiplexing, so the commands issued over one pooled session reuse a
//! single authenticated connection.
//!
//! `exec` streams output line-by-line into an optional logger while
//! buffering the full result, so journal follows and one-shot commands go
//! through the same path.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::debug;
use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use super::uri::parse_ssh_uri;
use super::{ExecOptions, Transport};
use crate::errors::{QuadletError, QuadletResult};
use crate::logger::Logger;
use crate::model::{RemoteConnection, RunResult};

// ---------------------------------------------------------------------------
// SshSession
// ---------------------------------------------------------------------------

/// A live SSH session to one remote connection.
///
/// The inner [`Session`] is wrapped in `Arc` so a file-transfer channel can
/// be opened from the same authenticated connection.
pub struct SshSession {
    session: Arc<Session>,
    host: String,
    username: Option<String>,
}

impl SshSession {
    /// Open an authenticated session for `remote`.
    ///
    /// The connection must carry an identity; a missing identity is a
    /// precondition failure, never silently defaulted.  A failed connect
    /// propagates as an error and leaves nothing behind, so the caller may
    /// retry cleanly.
    pub async fn connect(remote: &RemoteConnection) -> QuadletResult<Self> {
        let target = parse_ssh_uri(&remote.uri)?;

        let identity = remote
            .identity
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| QuadletError::MissingIdentity(remote.name.clone()))?;

        // OpenSSH reads the key itself; loading it up front surfaces an
        // unreadable identity before any connect attempt.
        tokio::fs::read(identity).await?;

        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Accept);
        builder.keyfile(identity);

        if let Some(ref username) = target.username {
            builder.user(username.clone());
        }
        if let Some(port) = target.port {
            builder.port(port);
        }

        let session = builder.connect(&target.host).await.map_err(|e| {
            QuadletError::ConnectionFailed {
                host: target.host.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!("ssh session ready for {}", target.host);

        Ok(Self {
            session: Arc::new(session),
            host: target.host,
            username: target.username,
        })
    }

    /// Remote login user, when the connection uri names one.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Shared handle on the underlying [`Session`], for opening subsystem
    /// channels (SFTP) over the same connection.
    pub(crate) fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }
}

#[async_trait]
impl Transport for SshSession {
    async fn exec(&self, program: &str, options: ExecOptions) -> QuadletResult<RunResult> {
        // OpenSSH does not forward arbitrary environment variables, so an
        // explicit environment is applied through env(1).
        let (program, args) = match &options.env {
            Some(env) => {
                let mut entries: Vec<(&String, &String)> = env.iter().collect();
                entries.sort();
                let mut args: Vec<String> = entries
                    .into_iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                args.push(program.to_string());
                args.extend(options.args.iter().cloned());
                ("env".to_string(), args)
            }
            None => (program.to_string(), options.args.clone()),
        };

        let command_line = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("executing `{command_line}` on host {}", self.host);

        let mut command = self.session.command(&program);
        for arg in &args {
            command.arg(arg);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .await
            .map_err(|e| QuadletError::from_ssh(&self.host, e))?;

        let stdout = child.stdout().take();
        let stderr = child.stderr().take();

        let stdout_buf = Mutex::new(String::new());
        let stderr_buf = Mutex::new(String::new());
        let logger = options.logger.as_deref();

        let streams = async {
            tokio::join!(
                pump_lines(stdout, &stdout_buf, logger, StreamKind::Stdout),
                pump_lines(stderr, &stderr_buf, logger, StreamKind::Stderr),
            )
        };

        tokio::select! {
            _ = streams => {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| QuadletError::from_ssh(&self.host, e))?;

                let stdout = take_buffer(&stdout_buf);
                let stderr = take_buffer(&stderr_buf);

                match status.code() {
                    Some(0) => Ok(RunResult {
                        command: command_line,
                        stdout,
                        stderr,
                    }),
                    code => Err(QuadletError::Command(crate::errors::RunError {
                        command: command_line,
                        exit_code: code.unwrap_or(-1),
                        stdout,
                        stderr,
                    })),
                }
            }
            _ = wait_cancelled(options.token.as_ref()) => {
                debug!("execution of `{command_line}` cancelled, disconnecting remote child");
                let _ = child.disconnect().await;
                Ok(RunResult {
                    command: command_line,
                    stdout: take_buffer(&stdout_buf),
                    stderr: take_buffer(&stderr_buf),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Read `reader` to the end, forwarding each line to the logger and
/// appending it to `buffer`.
async fn pump_lines<R: AsyncRead + Unpin>(
    reader: Option<R>,
    buffer: &Mutex<String>,
    logger: Option<&dyn Logger>,
    kind: StreamKind,
) {
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(logger) = logger {
            match kind {
                StreamKind::Stdout => logger.log(&line),
                StreamKind::Stderr => logger.error(&line),
            }
        }
        if let Ok(mut buffer) = buffer.lock() {
            buffer.push_str(&line);
            buffer.push('\n');
        }
    }
}

fn take_buffer(buffer: &Mutex<String>) -> String {
    buffer
        .lock()
        .map(|mut buffer| std::mem::take(&mut *buffer))
        .unwrap_or_default()
}

/// Resolves when the token is cancelled; pends forever without a token.
async fn wait_cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
