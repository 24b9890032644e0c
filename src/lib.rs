//! PostgreSQL wire-protocol client driver.
//!
//! pglink speaks protocol 3.0 over TCP, unix sockets, or TLS. It provides:
//! - a connection state machine covering startup, authentication, simple
//!   and extended queries, listen/notify, and transactions
//! - a typed value codec with negotiated binary/text formats and
//!   caller-extensible encoders and scanners
//! - streaming result cursors that keep the protocol channel balanced
//! - a bounded connection pool with statement priming
//!
//! Architecture:
//! - `protocol`: wire framing and message encode/decode
//! - `types`: value codec and format negotiation
//! - `connection`: the protocol state machine
//! - `rows`: streaming cursor and scan targets
//! - `pool`: bounded multiplexing over connections
//!
//! ```no_run
//! use pglink::{Connection, ConnectionConfig, PgValue, ScanTarget};
//!
//! # async fn demo() -> pglink::Result<()> {
//! let config = ConnectionConfig::from_url("postgres://app@localhost/app")?;
//! let mut conn = Connection::connect(config).await?;
//!
//! conn.prepare("top", "select id, name from widgets where id = $1").await?;
//! let (mut id, mut name) = (0i32, String::new());
//! conn.query_row(
//!     "top",
//!     &[PgValue::Int4(7)],
//!     &mut [ScanTarget::Int4(&mut id), ScanTarget::Text(&mut name)],
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
mod error;
pub mod pool;
pub mod protocol;
pub mod rows;
pub mod sanitize;
pub mod types;


pub use config::{ConnectionConfig, TlsConfig};
pub use connection::{Connection, IsolationLevel, PreparedStatement, TransactionBody};
pub use error::{Error, Result};
pub use pool::{Pool, PooledConnection};
pub use protocol::{CommandTag, FieldDescription, Format, Notification, TransactionStatus};
pub use rows::{ConnectionHandle, Rows, ScanTarget, Scanner};
pub use types::{BinaryEncoder, Oid, PgValue, TextEncoder};
