//! High-level client API
//!
//! [`MySqlClient`] owns one negotiated session and exposes the batch and
//! single-statement surfaces of the underlying [`Connection`](crate::connection::Connection).

mod connection_string;
mod mysql_client;

pub use connection_string::ConnectionInfo;
pub use mysql_client::MySqlClient;
