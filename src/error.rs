//! Error types

use std::io;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Driver error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration, detected before any network I/O
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connect phase (transport connect through authentication) exceeded its budget
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No traffic within the socket timeout once the session was ready
    #[error("socket timed out after {0:?}")]
    SocketTimeout(Duration),

    /// Peer closed the connection, or the session has been closed
    #[error("connection closed")]
    ConnectionClosed,

    /// TLS negotiation or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Malformed or unexpected frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication rejected or impossible to complete
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Error packet reported by the server
    #[error("server error {code} ({sql_state}): {message}")]
    Server {
        /// MySQL error code
        code: u16,
        /// Five character SQLSTATE
        sql_state: String,
        /// Human readable message
        message: String,
    },

    /// Value could not be decoded from a row
    #[error("decode error: {0}")]
    Decode(String),

    /// Credential source failed to produce a secret
    #[error("credential source failed: {0}")]
    Credential(String),

    /// Invalid state machine transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// API misuse (frozen batch, busy session, unusable session)
    #[error("state error: {0}")]
    State(String),
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid parameter combination; never reaches the negotiator
    Configuration,
    /// Timeouts, resets, TLS failures; always fatal to the session
    Transport,
    /// Malformed frames and server-reported errors; fatal to the session
    Protocol,
    /// API misuse; the session is left as it was
    State,
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::Io(_)
            | Error::ConnectTimeout(_)
            | Error::SocketTimeout(_)
            | Error::ConnectionClosed
            | Error::Tls(_) => ErrorKind::Transport,
            Error::Protocol(_)
            | Error::Authentication(_)
            | Error::Server { .. }
            | Error::Decode(_)
            | Error::Credential(_) => ErrorKind::Protocol,
            Error::InvalidState { .. } | Error::State(_) => ErrorKind::State,
        }
    }

    /// Whether this error leaves the session unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
    }

    /// Server error code, when the server reported one
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Short label used for metrics
    pub(crate) fn metric_label(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::ConnectTimeout(_) => "connect_timeout",
            Error::SocketTimeout(_) => "socket_timeout",
            Error::ConnectionClosed => "connection_closed",
            Error::Tls(_) => "tls",
            Error::Protocol(_) => "protocol",
            Error::Authentication(_) => "authentication",
            Error::Server { .. } => "server_error",
            Error::Decode(_) => "decode",
            Error::Credential(_) => "credential",
            Error::InvalidState { .. } | Error::State(_) => "state",
        }
    }
}
