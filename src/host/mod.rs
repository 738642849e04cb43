pub mod command;
pub mod connection;
pub mod context;
pub mod driver;
pub mod transaction;

pub use command::{DataReader, DbCommand, DbParameter, DbType, DbValue, ParameterDirection};
pub use connection::{ConnectionState, DbConnection};
pub use context::{DbContext, DisposeSubscription};
pub use driver::{Driver, DriverOp, MemoryDriver, QueryOutput, Scripted};
pub use transaction::{DbTransaction, IsolationLevel};
