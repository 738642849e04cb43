use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::command::{DbCommand, DbValue};
use super::transaction::IsolationLevel;
use crate::error::DbError;

/// Raw output of a driver execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows_affected: i64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DbValue>>,
}

impl QueryOutput {
    pub fn affected(rows_affected: i64) -> Self {
        Self {
            rows_affected,
            ..Default::default()
        }
    }

    pub fn rows(columns: Vec<&str>, rows: Vec<Vec<DbValue>>) -> Self {
        Self {
            rows_affected: -1,
            columns: columns.into_iter().map(String::from).collect(),
            rows,
        }
    }
}

/// Storage back-end behind a connection
#[async_trait]
pub trait Driver: Send + Sync {
    fn open(&self, connection_string: &str) -> Result<(), DbError>;

    async fn open_async(&self, connection_string: &str) -> Result<(), DbError> {
        self.open(connection_string)
    }

    fn close(&self) -> Result<(), DbError>;

    fn execute(&self, command: &DbCommand) -> Result<QueryOutput, DbError>;

    async fn execute_async(&self, command: &DbCommand) -> Result<QueryOutput, DbError> {
        self.execute(command)
    }

    fn begin(&self, isolation_level: IsolationLevel) -> Result<(), DbError>;

    fn commit(&self) -> Result<(), DbError>;

    fn rollback(&self) -> Result<(), DbError>;

    fn server_version(&self) -> String;

    /// Return the driver name for logging purposes
    fn name(&self) -> &'static str;
}

/// Scripted reply for a command text
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Output(QueryOutput),
    Fail(String),
    Cancel,
}

/// Which non-query operation a scripted failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Open,
    Close,
    Begin,
    Commit,
    Rollback,
}

/// In-memory driver answering from a script keyed by command text.
/// Unknown commands succeed with zero rows affected.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    responses: Mutex<HashMap<String, Scripted>>,
    failures: Mutex<HashMap<DriverOp, Scripted>>,
    executed: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, text: impl Into<String>, reply: Scripted) -> Self {
        self.script(text, reply);
        self
    }

    /// Fail (or cancel) every subsequent `op` with the given reply
    pub fn with_failure(self, op: DriverOp, reply: Scripted) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, reply);
        self
    }

    /// Delay async executions, e.g. to simulate network round trips
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn script(&self, text: impl Into<String>, reply: Scripted) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text.into(), reply);
    }

    /// Command texts executed so far
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self, op: DriverOp) -> Result<(), DbError> {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get(&op) {
            None | Some(Scripted::Output(_)) => Ok(()),
            Some(Scripted::Fail(msg)) => Err(DbError::driver(msg.clone())),
            Some(Scripted::Cancel) => Err(DbError::Canceled),
        }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn open(&self, _connection_string: &str) -> Result<(), DbError> {
        self.check(DriverOp::Open)
    }

    async fn open_async(&self, connection_string: &str) -> Result<(), DbError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.open(connection_string)
    }

    fn close(&self) -> Result<(), DbError> {
        self.check(DriverOp::Close)
    }

    fn execute(&self, command: &DbCommand) -> Result<QueryOutput, DbError> {
        let text = command.text().unwrap_or_default().to_string();
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.clone());

        let responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        match responses.get(&text) {
            None => Ok(QueryOutput::affected(0)),
            Some(Scripted::Output(output)) => Ok(output.clone()),
            Some(Scripted::Fail(msg)) => Err(DbError::driver(msg.clone())),
            Some(Scripted::Cancel) => Err(DbError::Canceled),
        }
    }

    async fn execute_async(&self, command: &DbCommand) -> Result<QueryOutput, DbError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.execute(command)
    }

    fn begin(&self, _isolation_level: IsolationLevel) -> Result<(), DbError> {
        self.check(DriverOp::Begin)
    }

    fn commit(&self) -> Result<(), DbError> {
        self.check(DriverOp::Commit)
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.check(DriverOp::Rollback)
    }

    fn server_version(&self) -> String {
        concat!("memory-", env!("CARGO_PKG_VERSION")).to_string()
    }

    fn name(&self) -> &'static str {
        "MemoryDriver"
    }
}
