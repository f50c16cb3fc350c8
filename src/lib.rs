//! mysql-wire: a non-blocking MySQL wire protocol driver
//!
//! The crate covers the parts of a driver that need connection-level control:
//!
//! * Session negotiation: greeting, optional in-place TLS upgrade, authentication
//!   with an asynchronous credential source and bounded auth-switch handling
//! * Statement caches scoped to one session: a query cache keyed by SQL text and a
//!   prepared-statement cache keyed by statement fingerprint, both strict LRU
//! * Ordered batch execution: one outstanding request per session, one
//!   [`ResultStream`](stream::ResultStream) per statement, abort on first error
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> mysql_wire::Result<()> {
//! use mysql_wire::batch::Batch;
//! use mysql_wire::connection::{Connection, SessionConfiguration};
//!
//! let config = SessionConfiguration::builder()
//!     .host("localhost")
//!     .user("app")
//!     .password("secret")
//!     .database("shop")
//!     .build()?;
//!
//! let mut conn = Connection::connect(&config).await?;
//!
//! let mut batch = conn.batch();
//! batch.add("INSERT INTO audit (msg) VALUES ('start')")?;
//! batch.add("SELECT id, name FROM users")?;
//!
//! let mut execution = batch.execute()?;
//! while let Some(result) = execution.next_result().await {
//!     let mut stream = result?;
//!     while let Some(row) = stream.next_row().await? {
//!         println!("{:?}", row.get(0));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod batch;
pub mod cache;
pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod extension;
pub mod metrics;
pub mod protocol;
pub mod row;
pub mod statement;
pub mod stream;

pub use client::MySqlClient;
pub use error::{Error, ErrorKind, Result};
