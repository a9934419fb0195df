//! Core types: connection state, session identity, credentials, and errors.

use std::fmt;
use std::time::Duration;

use kg_protocol::{SessionId, ValidationError};

/// Lifecycle of the client's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity established by a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// `None` when the engine runs without a login step.
    pub session_id: Option<SessionId>,
    /// Knowledge graph the session is bound to.  Follows server-driven switches.
    pub bound_namespace: String,
    pub role: String,
}

/// Login credentials sent in the handshake.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Failures of the underlying connection.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Open(String),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("connection closed before authenticated")]
    ClosedBeforeAuthenticated,
    #[error("no handshake reply before the deadline")]
    HandshakeTimeout,
}

/// Top-level client error.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The engine rejected the handshake.  Never retried.
    #[error("auth: {0}")]
    Auth(String),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The engine reported a query or validation failure.
    #[error("query failed: {message}")]
    Protocol {
        message: String,
        validation_errors: Vec<ValidationError>,
    },

    #[error("request timed out after {:.3}s", .elapsed.as_secs_f64())]
    Timeout { elapsed: Duration },

    #[error("not connected")]
    NotConnected,

    #[error("connect already in progress")]
    ConnectInProgress,

    #[error("config: {0}")]
    Config(String),

    /// The dispatcher task is gone.
    #[error("client shut down")]
    Shutdown,
}

impl ClientError {
    /// Whether this is a transport-level failure (as opposed to a query or auth failure).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("ada", "hunter2");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("ada"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn timeout_reports_elapsed_seconds() {
        let err = ClientError::Timeout {
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "request timed out after 1.500s");
    }

    #[test]
    fn transport_error_converts() {
        let err: ClientError = TransportError::ClosedBeforeAuthenticated.into();
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "transport: connection closed before authenticated"
        );
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
