//! Connection-uri parser.
//!
//! `podman system connection list` reports uris of the form:
//!
//! ```text
//! ssh://<user>@<host>:<port></path/to/podman.sock>
//! ```
//!
//! Only the ssh authority matters here — the socket path belongs to podman,
//! not to the transport.

use crate::errors::{QuadletError, QuadletResult};

/// The ssh endpoint extracted from a connection uri.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub username: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

/// Parse a `ssh://` connection uri into its [`SshTarget`].
pub fn parse_ssh_uri(uri: &str) -> QuadletResult<SshTarget> {
    let invalid = |reason: &str| QuadletError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let Some(rest) = uri.strip_prefix("ssh://") else {
        return Err(invalid("expected ssh:// scheme"));
    };

    // The authority ends at the first '/' (the remote socket path).
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        return Err(invalid("missing host"));
    }

    // authority is like "user@host:port", "host:port", "user@host" or "host"
    let (username, host_port) = match authority.split_once('@') {
        Some(("", host_port)) => (None, host_port),
        Some((user, host_port)) => (Some(user.to_string()), host_port),
        None => (None, authority),
    };

    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| invalid(&format!("invalid port '{port_str}'")))?;
            (host, Some(port))
        }
        None => (host_port, None),
    };

    // Bracketed IPv6 literals keep their ':' inside the brackets.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    Ok(SshTarget {
        username,
        host: host.to_string(),
        port,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
