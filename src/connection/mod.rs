//! Connection management
//!
//! This module handles:
//! * Session configuration and its validation
//! * Transport abstraction (TCP vs Unix socket)
//! * SSL policy and the in-place TLS upgrade
//! * Session negotiation and statement execution
//! * State machine enforcement

mod config;
pub(crate) mod conn;
mod state;
mod tls;
mod transport;

pub use config::{
    SessionConfiguration, SessionConfigurationBuilder, Target, DEFAULT_CACHE_SIZE, DEFAULT_PORT,
};
pub use conn::{Connection, ServerInfo, MAX_AUTH_SWITCHES};
pub use state::ConnectionState;
pub use tls::{
    server_name, HostnameVerifier, SslConfiguration, SslMode, SslPolicy, TlsCustomizer, TlsVersion,
};
pub use transport::{TcpOptions, TcpVariant, Transport, TransportKind};
