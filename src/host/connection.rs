use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use super::context::DbContext;
use super::driver::Driver;
use super::transaction::{DbTransaction, IsolationLevel};
use crate::error::DbError;
use crate::interception::{ConnectionEvent, InterceptionRegistry, Interceptor};

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Open,
    Broken,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A connection whose lifecycle is routed through an [`InterceptionRegistry`]
pub struct DbConnection {
    connection_string: RwLock<String>,
    timeout: Duration,
    state: RwLock<ConnectionState>,
    disposed: AtomicBool,
    contexts: RwLock<Vec<Weak<DbContext>>>,
    driver: Arc<dyn Driver>,
    registry: InterceptionRegistry,
}

impl DbConnection {
    pub fn new(
        connection_string: impl Into<String>,
        driver: Arc<dyn Driver>,
        registry: InterceptionRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            connection_string: RwLock::new(connection_string.into()),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
            state: RwLock::new(ConnectionState::Closed),
            disposed: AtomicBool::new(false),
            contexts: RwLock::new(Vec::new()),
            driver,
            registry,
        })
    }

    /// Record `context` as an owner of operations on this connection.
    /// Held weakly; a dropped context simply stops appearing in events.
    pub fn attach_context(&self, context: &Arc<DbContext>) {
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        contexts.retain(|c| c.strong_count() > 0);
        if !contexts.iter().any(|c| Weak::as_ptr(c) == Arc::as_ptr(context)) {
            contexts.push(Arc::downgrade(context));
        }
    }

    pub fn owning_contexts(&self) -> Vec<Arc<DbContext>> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// State without raising interception events
    pub(crate) fn current_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn event(&self, is_async: bool) -> ConnectionEvent<'_> {
        ConnectionEvent::new(self, self.owning_contexts(), is_async, self.current_state())
    }

    /// Run `op` between a before and an after hook, recording its outcome
    fn intercept<T, B, A, F>(&self, before: B, after: A, op: F) -> Result<T, DbError>
    where
        B: Fn(&dyn Interceptor, &ConnectionEvent<'_>),
        A: Fn(&dyn Interceptor, &ConnectionEvent<'_>),
        F: FnOnce() -> Result<T, DbError>,
    {
        let mut event = self.event(false);
        self.registry.dispatch(|i| before(i, &event));
        let outcome = op();
        event.complete(&outcome);
        self.registry.dispatch(|i| after(i, &event));
        outcome
    }

    fn ensure_not_disposed(&self) -> Result<(), DbError> {
        if self.is_disposed() {
            return Err(DbError::Disposed("connection"));
        }
        Ok(())
    }

    fn ensure_can_open(&self) -> Result<(), DbError> {
        self.ensure_not_disposed()?;
        if self.current_state() == ConnectionState::Open {
            return Err(DbError::InvalidOperation("connection is already open".to_string()));
        }
        Ok(())
    }

    fn after_open(&self, outcome: &Result<(), DbError>) {
        match outcome {
            Ok(()) => self.set_state(ConnectionState::Open),
            Err(DbError::Canceled) | Err(DbError::InvalidOperation(_)) | Err(DbError::Disposed(_)) => {}
            Err(_) => self.set_state(ConnectionState::Broken),
        }
    }

    pub fn open(&self) -> Result<(), DbError> {
        self.intercept(
            |i, e| i.opening(e),
            |i, e| i.opened(e),
            || {
                self.ensure_can_open()?;
                let outcome = self.driver.open(&self.connection_string_raw());
                self.after_open(&outcome);
                outcome
            },
        )
    }

    pub async fn open_async(&self) -> Result<(), DbError> {
        let mut event = self.event(true);
        self.registry.dispatch(|i| i.opening(&event));

        let outcome = match self.ensure_can_open() {
            Ok(()) => {
                let connection_string = self.connection_string_raw();
                self.driver.open_async(&connection_string).await
            }
            Err(e) => Err(e),
        };
        self.after_open(&outcome);

        event.complete(&outcome);
        self.registry.dispatch(|i| i.opened(&event));
        outcome
    }

    pub fn close(&self) -> Result<(), DbError> {
        self.intercept(
            |i, e| i.closing(e),
            |i, e| i.closed(e),
            || {
                self.ensure_not_disposed()?;
                if self.current_state() == ConnectionState::Closed {
                    return Ok(());
                }
                let outcome = self.driver.close();
                self.set_state(ConnectionState::Closed);
                outcome
            },
        )
    }

    /// Close if open and release the connection. Repeated calls are no-ops.
    pub fn dispose(&self) -> Result<(), DbError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.intercept(
            |i, e| i.connection_disposing(e),
            |i, e| i.connection_disposed(e),
            || {
                if self.disposed.swap(true, Ordering::AcqRel) {
                    return Ok(());
                }
                let outcome = match self.current_state() {
                    ConnectionState::Closed => Ok(()),
                    _ => self.driver.close(),
                };
                self.set_state(ConnectionState::Closed);
                outcome
            },
        )
    }

    pub fn begin_transaction(
        self: &Arc<Self>,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<DbTransaction>, DbError> {
        self.intercept(
            |i, e| i.beginning_transaction(e),
            |i, e| i.began_transaction(e),
            || {
                self.ensure_not_disposed()?;
                if self.current_state() != ConnectionState::Open {
                    return Err(DbError::InvalidOperation(
                        "cannot begin a transaction on a closed connection".to_string(),
                    ));
                }
                self.driver.begin(isolation_level)?;
                Ok(DbTransaction::new(self.clone(), isolation_level))
            },
        )
    }

    /// Enlist in an ambient transaction identified by `name`
    pub fn enlist_transaction(&self, name: Option<&str>) -> Result<(), DbError> {
        self.intercept(
            |i, e| i.enlisting_transaction(e),
            |i, e| i.enlisted_transaction(e),
            || {
                self.ensure_not_disposed()?;
                tracing::debug!("Enlisting connection in transaction {:?}", name);
                Ok(())
            },
        )
    }

    fn connection_string_raw(&self) -> String {
        self.connection_string
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection_string(&self) -> String {
        self.intercept(
            |i, e| i.connection_string_getting(e),
            |i, e| i.connection_string_got(e),
            || Ok::<_, DbError>(self.connection_string_raw()),
        )
        .unwrap_or_default()
    }

    pub fn set_connection_string(&self, value: impl Into<String>) -> Result<(), DbError> {
        let value = value.into();
        self.intercept(
            |i, e| i.connection_string_setting(e),
            |i, e| i.connection_string_set(e),
            || {
                self.ensure_not_disposed()?;
                if self.current_state() == ConnectionState::Open {
                    return Err(DbError::InvalidOperation(
                        "cannot change the connection string of an open connection".to_string(),
                    ));
                }
                *self
                    .connection_string
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = value;
                Ok(())
            },
        )
    }

    pub fn connection_timeout(&self) -> Duration {
        self.intercept(
            |i, e| i.connection_timeout_getting(e),
            |i, e| i.connection_timeout_got(e),
            || Ok::<_, DbError>(self.timeout),
        )
        .unwrap_or(self.timeout)
    }

    /// `Database` / `Initial Catalog` key of the connection string
    pub fn database(&self) -> String {
        self.intercept(
            |i, e| i.database_getting(e),
            |i, e| i.database_got(e),
            || {
                Ok::<_, DbError>(
                    connection_string_value(
                        &self.connection_string_raw(),
                        &["database", "initial catalog"],
                    )
                    .unwrap_or_default(),
                )
            },
        )
        .unwrap_or_default()
    }

    /// `Data Source` / `Server` key of the connection string
    pub fn data_source(&self) -> String {
        self.intercept(
            |i, e| i.data_source_getting(e),
            |i, e| i.data_source_got(e),
            || {
                Ok::<_, DbError>(
                    connection_string_value(&self.connection_string_raw(), &["data source", "server"])
                        .unwrap_or_default(),
                )
            },
        )
        .unwrap_or_default()
    }

    pub fn server_version(&self) -> Result<String, DbError> {
        self.intercept(
            |i, e| i.server_version_getting(e),
            |i, e| i.server_version_got(e),
            || {
                self.ensure_not_disposed()?;
                if self.current_state() != ConnectionState::Open {
                    return Err(DbError::InvalidOperation(
                        "server version requires an open connection".to_string(),
                    ));
                }
                Ok(self.driver.server_version())
            },
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.intercept(
            |i, e| i.state_getting(e),
            |i, e| i.state_got(e),
            || Ok::<_, DbError>(self.current_state()),
        )
        .unwrap_or_default()
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("driver", &self.driver.name())
            .field("state", &self.current_state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Look up the first matching key (case-insensitive) in a `key=value;` string
fn connection_string_value(connection_string: &str, keys: &[&str]) -> Option<String> {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| keys.iter().any(|k| key.trim().eq_ignore_ascii_case(k)))
        .map(|(_, value)| value.trim().to_string())
}
