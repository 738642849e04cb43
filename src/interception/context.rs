use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::DbError;
use crate::host::{ConnectionState, DbCommand, DbConnection, DbContext, DbTransaction, DbValue};

/// How an intercepted operation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    /// Not finished yet ("before" hooks see this)
    #[default]
    Running,
    RanToCompletion,
    Canceled,
    Faulted,
}

/// Data shared by every interception event
#[derive(Debug, Clone, Default)]
pub struct InterceptionContext {
    contexts: Vec<Arc<DbContext>>,
    is_async: bool,
    status: TaskStatus,
    failure: Option<DbError>,
}

impl InterceptionContext {
    pub fn new(contexts: Vec<Arc<DbContext>>, is_async: bool) -> Self {
        Self {
            contexts,
            is_async,
            ..Default::default()
        }
    }

    /// Owning contexts of the operation, in order
    pub fn owning_contexts(&self) -> &[Arc<DbContext>] {
        &self.contexts
    }

    /// True if `context` is one of the owners, compared by identity
    pub fn is_owned_by(&self, context: *const DbContext) -> bool {
        self.contexts.iter().any(|c| std::ptr::eq(Arc::as_ptr(c), context))
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_canceled(&self) -> bool {
        self.status == TaskStatus::Canceled
    }

    /// Failure captured from the operation, if any. Cancellation is not a failure.
    pub fn failure(&self) -> Option<&DbError> {
        self.failure.as_ref()
    }

    pub fn with_failure(mut self, failure: DbError) -> Self {
        self.status = TaskStatus::Faulted;
        self.failure = Some(failure);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn complete<T>(&mut self, outcome: &Result<T, DbError>) {
        match outcome {
            Ok(_) => {
                self.status = TaskStatus::RanToCompletion;
                self.failure = None;
            }
            Err(DbError::Canceled) => {
                self.status = TaskStatus::Canceled;
                self.failure = None;
            }
            Err(e) => {
                self.status = TaskStatus::Faulted;
                self.failure = Some(e.clone());
            }
        }
    }
}

#[derive(Debug, Default)]
struct StopwatchState {
    started: Option<Instant>,
    elapsed: Duration,
}

/// Elapsed-time timer owned by a single in-flight operation
#[derive(Debug, Default)]
pub struct Stopwatch {
    state: Mutex<StopwatchState>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset and start timing
    pub fn restart(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.started = Some(Instant::now());
        state.elapsed = Duration::ZERO;
    }

    /// Stop timing and return the elapsed time. Stopping twice keeps the first reading.
    pub fn stop(&self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(started) = state.started.take() {
            state.elapsed = started.elapsed();
        }
        state.elapsed
    }

    pub fn elapsed(&self) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.started {
            Some(started) => started.elapsed(),
            None => state.elapsed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
            .is_some()
    }
}

/// Result of a finished command
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    RowsAffected(i64),
    Scalar(DbValue),
    /// A live row cursor; only its type name is ever rendered
    Reader { type_name: &'static str },
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::RowsAffected(n) => write!(f, "{}", n),
            ResultValue::Scalar(v) => write!(f, "{}", v),
            ResultValue::Reader { type_name } => f.write_str(type_name),
        }
    }
}

/// Event raised around command execution
#[derive(Debug)]
pub struct CommandEvent<'a> {
    command: &'a DbCommand,
    info: InterceptionContext,
    result: Option<ResultValue>,
    stopwatch: Stopwatch,
}

impl<'a> CommandEvent<'a> {
    pub fn new(command: &'a DbCommand, contexts: Vec<Arc<DbContext>>, is_async: bool) -> Self {
        Self::with_info(command, InterceptionContext::new(contexts, is_async))
    }

    pub fn with_info(command: &'a DbCommand, info: InterceptionContext) -> Self {
        Self {
            command,
            info,
            result: None,
            stopwatch: Stopwatch::new(),
        }
    }

    pub fn with_result(mut self, result: ResultValue) -> Self {
        self.result = Some(result);
        self
    }

    pub fn command(&self) -> &'a DbCommand {
        self.command
    }

    pub fn info(&self) -> &InterceptionContext {
        &self.info
    }

    /// Result of a successful execution; `None` before completion or for a NULL scalar
    pub fn result(&self) -> Option<&ResultValue> {
        self.result.as_ref()
    }

    /// Timer for this command only
    pub fn stopwatch(&self) -> &Stopwatch {
        &self.stopwatch
    }

    pub(crate) fn complete<T>(
        &mut self,
        outcome: &Result<T, DbError>,
        result: impl FnOnce(&T) -> Option<ResultValue>,
    ) {
        self.info.complete(outcome);
        self.result = outcome.as_ref().ok().and_then(result);
    }
}

/// Event raised around connection operations and property access
#[derive(Debug)]
pub struct ConnectionEvent<'a> {
    connection: &'a DbConnection,
    info: InterceptionContext,
    original_state: ConnectionState,
}

impl<'a> ConnectionEvent<'a> {
    pub fn new(
        connection: &'a DbConnection,
        contexts: Vec<Arc<DbContext>>,
        is_async: bool,
        original_state: ConnectionState,
    ) -> Self {
        Self::with_info(connection, InterceptionContext::new(contexts, is_async), original_state)
    }

    pub fn with_info(
        connection: &'a DbConnection,
        info: InterceptionContext,
        original_state: ConnectionState,
    ) -> Self {
        Self {
            connection,
            info,
            original_state,
        }
    }

    pub fn connection(&self) -> &'a DbConnection {
        self.connection
    }

    pub fn info(&self) -> &InterceptionContext {
        &self.info
    }

    /// Connection state when the operation began
    pub fn original_state(&self) -> ConnectionState {
        self.original_state
    }

    pub(crate) fn complete<T>(&mut self, outcome: &Result<T, DbError>) {
        self.info.complete(outcome);
    }
}

/// Event raised around transaction operations
#[derive(Debug)]
pub struct TransactionEvent<'a> {
    transaction: &'a DbTransaction,
    info: InterceptionContext,
    connection: Option<Arc<DbConnection>>,
}

impl<'a> TransactionEvent<'a> {
    pub fn new(
        transaction: &'a DbTransaction,
        contexts: Vec<Arc<DbContext>>,
        connection: Option<Arc<DbConnection>>,
    ) -> Self {
        Self::with_info(transaction, InterceptionContext::new(contexts, false), connection)
    }

    pub fn with_info(
        transaction: &'a DbTransaction,
        info: InterceptionContext,
        connection: Option<Arc<DbConnection>>,
    ) -> Self {
        Self {
            transaction,
            info,
            connection,
        }
    }

    pub fn transaction(&self) -> &'a DbTransaction {
        self.transaction
    }

    pub fn info(&self) -> &InterceptionContext {
        &self.info
    }

    /// Connection associated with the transaction when the operation began
    pub fn connection(&self) -> Option<&Arc<DbConnection>> {
        self.connection.as_ref()
    }

    pub(crate) fn complete<T>(&mut self, outcome: &Result<T, DbError>) {
        self.info.complete(outcome);
    }
}
