use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::connection::DbConnection;
use super::context::DbContext;
use crate::error::DbError;
use crate::interception::{InterceptionRegistry, Interceptor, TransactionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A transaction started on a connection.
///
/// The connection association is cleared once the transaction commits or
/// rolls back, so a completed transaction has no connection.
pub struct DbTransaction {
    isolation_level: IsolationLevel,
    connection: RwLock<Option<Arc<DbConnection>>>,
    contexts: Vec<Weak<DbContext>>,
    registry: InterceptionRegistry,
    disposed: AtomicBool,
}

impl DbTransaction {
    pub(crate) fn new(connection: Arc<DbConnection>, isolation_level: IsolationLevel) -> Arc<Self> {
        Arc::new(Self {
            isolation_level,
            contexts: connection.owning_contexts().iter().map(Arc::downgrade).collect(),
            registry: connection.registry().clone(),
            connection: RwLock::new(Some(connection)),
            disposed: AtomicBool::new(false),
        })
    }

    /// Associated connection without raising interception events
    pub(crate) fn current_connection(&self) -> Option<Arc<DbConnection>> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_connection(&self) -> Option<Arc<DbConnection>> {
        self.connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn owning_contexts(&self) -> Vec<Arc<DbContext>> {
        self.contexts.iter().filter_map(Weak::upgrade).collect()
    }

    fn intercept<T, B, A, F>(&self, before: B, after: A, op: F) -> Result<T, DbError>
    where
        B: Fn(&dyn Interceptor, &TransactionEvent<'_>),
        A: Fn(&dyn Interceptor, &TransactionEvent<'_>),
        F: FnOnce() -> Result<T, DbError>,
    {
        let mut event = TransactionEvent::new(self, self.owning_contexts(), self.current_connection());
        self.registry.dispatch(|i| before(i, &event));
        let outcome = op();
        event.complete(&outcome);
        self.registry.dispatch(|i| after(i, &event));
        outcome
    }

    fn completed() -> DbError {
        DbError::InvalidOperation("transaction has already completed".to_string())
    }

    pub fn commit(&self) -> Result<(), DbError> {
        self.intercept(
            |i, e| i.committing(e),
            |i, e| i.committed(e),
            || {
                let connection = self.current_connection().ok_or_else(Self::completed)?;
                connection.driver().commit()?;
                self.take_connection();
                Ok(())
            },
        )
    }

    pub fn rollback(&self) -> Result<(), DbError> {
        self.intercept(
            |i, e| i.rolling_back(e),
            |i, e| i.rolled_back(e),
            || {
                let connection = self.current_connection().ok_or_else(Self::completed)?;
                connection.driver().rollback()?;
                self.take_connection();
                Ok(())
            },
        )
    }

    /// Roll back if still pending and release the transaction. Repeated calls are no-ops.
    pub fn dispose(&self) -> Result<(), DbError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.intercept(
            |i, e| i.transaction_disposing(e),
            |i, e| i.transaction_disposed(e),
            || {
                if self.disposed.swap(true, Ordering::AcqRel) {
                    return Ok(());
                }
                match self.take_connection() {
                    Some(connection) => connection.driver().rollback(),
                    None => Ok(()),
                }
            },
        )
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.intercept(
            |i, e| i.isolation_level_getting(e),
            |i, e| i.isolation_level_got(e),
            || Ok::<_, DbError>(self.isolation_level),
        )
        .unwrap_or(self.isolation_level)
    }

    /// The associated connection; `None` once completed
    pub fn connection(&self) -> Option<Arc<DbConnection>> {
        self.intercept(
            |i, e| i.transaction_connection_getting(e),
            |i, e| i.transaction_connection_got(e),
            || Ok::<_, DbError>(self.current_connection()),
        )
        .unwrap_or_default()
    }
}

impl fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("isolation_level", &self.isolation_level)
            .field("completed", &self.current_connection().is_none())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::driver::{DriverOp, MemoryDriver, Scripted};

    fn open_connection(driver: MemoryDriver) -> Arc<DbConnection> {
        let conn = DbConnection::new("Data Source=mem", Arc::new(driver), InterceptionRegistry::new());
        conn.open().unwrap();
        conn
    }

    #[test]
    fn test_commit_clears_connection() {
        let conn = open_connection(MemoryDriver::new());
        let tx = conn.begin_transaction(IsolationLevel::Serializable).unwrap();
        assert_eq!(tx.isolation_level(), IsolationLevel::Serializable);
        assert!(tx.connection().is_some());

        tx.commit().unwrap();
        assert!(tx.connection().is_none());
        assert!(tx.commit().is_err());
        assert!(tx.rollback().is_err());
    }

    #[test]
    fn test_failed_commit_keeps_connection() {
        let conn = open_connection(
            MemoryDriver::new().with_failure(DriverOp::Commit, Scripted::Fail("deadlock".to_string())),
        );
        let tx = conn.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(tx.commit(), Err(DbError::driver("deadlock")));
        assert!(tx.connection().is_some());
        tx.rollback().unwrap();
    }

    #[test]
    fn test_begin_requires_open_connection() {
        let conn = DbConnection::new("", Arc::new(MemoryDriver::new()), InterceptionRegistry::new());
        assert!(conn.begin_transaction(IsolationLevel::Unspecified).is_err());
    }

    #[test]
    fn test_dispose_pending_transaction() {
        let conn = open_connection(MemoryDriver::new());
        let tx = conn.begin_transaction(IsolationLevel::Unspecified).unwrap();
        tx.dispose().unwrap();
        tx.dispose().unwrap();
        assert!(tx.is_disposed());
        assert!(tx.connection().is_none());
    }
}
