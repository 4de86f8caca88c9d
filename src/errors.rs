use thiserror::Error;

/// Captured output of a remote command that exited with a non-zero code.
///
/// This is a *value*, not a diagnostic string: callers inspect the exit code
/// and the buffered streams to decide what the failure means (e.g. the
/// quadlet generator exits non-zero whenever any source unit fails to
/// convert, yet its output is still the payload we want).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// The full command line that was executed.
    pub command: String,
    /// Exit code reported by the remote process (`-1` if killed by signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "command `{}` exited with code {}",
            self.command, self.exit_code
        )
    }
}

#[derive(Debug, Error)]
pub enum QuadletError {
    #[error("cannot determine quadlet type from path: {0}")]
    UnrecognizedExtension(String),

    #[error(
        "generator stderr line {0:?} does not contain an absolute quadlet file path"
    )]
    MalformedLoadLine(String),

    #[error("dry-run output has already been parsed")]
    AlreadyParsed,

    #[error("could not get remote connection for connection {0}")]
    NotFound(String),

    #[error("remote connection {0} without identity specified is not supported")]
    MissingIdentity(String),

    #[error("cannot parse connection uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("ssh: could not connect to {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("{0}")]
    Command(RunError),

    #[error("quadlet with id {0} does not exist")]
    UnknownQuadlet(String),

    #[error("quadlet with id {0} does not have an associated systemd service")]
    MissingService(String),

    #[error("unknown logger with id {0}")]
    UnknownLogger(String),

    #[error("sftp: {0}")]
    Sftp(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote: {0}")]
    Remote(String),
}

impl QuadletError {
    /// Classify an SSH-layer error into a more specific variant when possible.
    pub fn from_ssh(host: &str, err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains("Connection refused")
            || msg.contains("Connection timed out")
            || msg.contains("Could not resolve")
        {
            QuadletError::ConnectionFailed {
                host: host.to_string(),
                reason: msg,
            }
        } else {
            QuadletError::Remote(msg)
        }
    }
}

pub type QuadletResult<T> = Result<T, QuadletError>;
