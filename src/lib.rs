//! Log relay for database interception hooks.
//!
//! An [`EventRelay`] registers with an [`InterceptionRegistry`] and turns
//! command, connection and transaction lifecycle events into fixed-format
//! log lines on a [`LogSink`]. The [`host`] module provides the connection,
//! command and transaction types that raise those events.
//!
//! ```rust,ignore
//! let registry = InterceptionRegistry::new();
//! let ctx = DbContext::new("orders");
//! let _relay = dbrelay::register(&registry, None, Some(&ctx), RelayConfig::default());
//!
//! let conn = DbConnection::new("Data Source=mem", Arc::new(MemoryDriver::new()), registry);
//! conn.attach_context(&ctx);
//! conn.open()?;
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod interception;
pub mod logging;
pub mod relay;
pub mod sink;

pub use config::{Categories, RelayConfig};
pub use error::{DbError, RelayError};
pub use interception::{InterceptionRegistry, Interceptor};
pub use relay::{register, EventKind, EventRelay, RelayHandle};
pub use sink::{LogSink, MemorySink, TracingSink};
