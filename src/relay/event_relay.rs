use std::collections::HashMap;
use std::fmt::{self, Write};
use std::sync::{Arc, Weak};

use super::format::{self, NULL_TEXT};
use super::handlers::{Category, EventKind, EventRef, Handler};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::host::{ConnectionState, DbContext};
use crate::interception::{
    CommandEvent, ConnectionEvent, InterceptionContext, Interceptor, TransactionEvent,
};
use crate::sink::LogSink;

/// Interceptor that turns database lifecycle events into log lines.
///
/// Unscoped relays log every event. A relay scoped to a context only logs
/// events whose owning contexts include that exact context; the context is
/// held weakly and never kept alive by the relay.
///
/// Command timing uses the stopwatch carried by each [`CommandEvent`], so one
/// relay can observe overlapping commands without mixing up their durations.
pub struct EventRelay {
    sink: Arc<dyn LogSink>,
    context: Option<Weak<DbContext>>,
    config: RelayConfig,
    handlers: HashMap<EventKind, Handler>,
}

impl EventRelay {
    /// Relay that logs events from any context
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            context: None,
            config: RelayConfig::default(),
            handlers: HashMap::new(),
        }
    }

    /// Relay that only logs events owned by `context`.
    ///
    /// Fails with [`RelayError::InvalidArgument`] when no context is given.
    pub fn for_context(
        sink: Arc<dyn LogSink>,
        context: Option<&Arc<DbContext>>,
    ) -> Result<Self, RelayError> {
        let context = context.ok_or_else(|| {
            RelayError::InvalidArgument("context", "a scoped relay requires a context".to_string())
        })?;
        Ok(Self::scoped(sink, context))
    }

    pub fn scoped(sink: Arc<dyn LogSink>, context: &Arc<DbContext>) -> Self {
        Self {
            context: Some(Arc::downgrade(context)),
            ..Self::new(sink)
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in behavior for one event kind
    pub fn with_handler<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&EventRelay, EventKind, EventRef<'_>) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn sink(&self) -> &dyn LogSink {
        self.sink.as_ref()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn is_scoped(&self) -> bool {
        self.context.is_some()
    }

    /// The bound context, if scoped and still alive
    pub fn context(&self) -> Option<Arc<DbContext>> {
        self.context.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_context_alive(&self) -> bool {
        self.context.as_ref().is_some_and(|c| c.strong_count() > 0)
    }

    /// Whether an event belongs to this relay
    pub fn should_log(&self, info: &InterceptionContext) -> bool {
        match &self.context {
            None => true,
            Some(context) => info.is_owned_by(Weak::as_ptr(context)),
        }
    }

    fn category_enabled(&self, category: Category) -> bool {
        let categories = &self.config.categories;
        match category {
            Category::Command => categories.command,
            Category::Connection => categories.connection,
            Category::Transaction => categories.transaction,
        }
    }

    fn handle(&self, kind: EventKind, event: EventRef<'_>) {
        if !self.category_enabled(kind.category()) || !self.should_log(event.info()) {
            return;
        }
        match self.handlers.get(&kind) {
            Some(handler) => (**handler)(self, kind, event),
            None => self.run_default(kind, event),
        }
    }

    /// Built-in behavior for `kind`. Hooks not listed here produce no output.
    pub fn run_default(&self, kind: EventKind, event: EventRef<'_>) {
        use EventKind::*;
        match (kind, event) {
            (NonQueryExecuting | ReaderExecuting | ScalarExecuting, EventRef::Command(e)) => {
                self.log_command(e);
                e.stopwatch().restart();
            }
            (NonQueryExecuted | ReaderExecuted | ScalarExecuted, EventRef::Command(e)) => {
                e.stopwatch().stop();
                self.log_result(e);
            }
            (Opened, EventRef::Connection(e)) => self.log_opened(e),
            (Closed, EventRef::Connection(e)) => self.log_outcome(
                e.info(),
                format::CONNECTION_CLOSED,
                format::CONNECTION_CLOSE_FAILED,
            ),
            (ConnectionDisposed, EventRef::Connection(e)) => {
                if e.original_state() == ConnectionState::Open {
                    self.log_outcome(
                        e.info(),
                        format::CONNECTION_DISPOSED,
                        format::CONNECTION_DISPOSE_FAILED,
                    );
                }
            }
            (BeganTransaction, EventRef::Connection(e)) => self.log_outcome(
                e.info(),
                format::TRANSACTION_STARTED,
                format::TRANSACTION_START_FAILED,
            ),
            (Committed, EventRef::Transaction(e)) => self.log_outcome(
                e.info(),
                format::TRANSACTION_COMMITTED,
                format::TRANSACTION_COMMIT_FAILED,
            ),
            (RolledBack, EventRef::Transaction(e)) => self.log_outcome(
                e.info(),
                format::TRANSACTION_ROLLED_BACK,
                format::TRANSACTION_ROLLBACK_FAILED,
            ),
            (TransactionDisposed, EventRef::Transaction(e)) => self.log_transaction_disposed(e),
            _ => {}
        }
    }

    /// Current time in the configured format
    pub fn timestamp(&self) -> String {
        let now = chrono::Local::now();
        let mut out = String::new();
        if write!(out, "{}", now.format(&self.config.timestamp_format)).is_err() {
            tracing::warn!(
                "Invalid timestamp format {:?}, falling back to RFC 3339",
                self.config.timestamp_format
            );
            return now.to_rfc3339();
        }
        out
    }

    /// Command text, one line per parameter, then the execution line
    pub fn log_command(&self, event: &CommandEvent<'_>) {
        let command = event.command();
        let text = command.text().unwrap_or(NULL_TEXT);
        self.sink.information(format::COMMAND_TEXT, &[&text]);

        for parameter in command.parameters() {
            let line = format::format_parameter(parameter, self.config.log_parameter_values);
            self.sink.information(format::PARAMETER, &[&line]);
        }

        let timestamp = self.timestamp();
        let template = if event.info().is_async() {
            format::EXECUTING_ASYNC
        } else {
            format::EXECUTING
        };
        self.sink.information(template, &[&timestamp]);
    }

    /// Exactly one of failed / canceled / completed
    pub fn log_result(&self, event: &CommandEvent<'_>) {
        let info = event.info();
        let elapsed_ms = event.stopwatch().elapsed().as_millis();

        if let Some(failure) = info.failure() {
            self.sink
                .error(failure, format::COMMAND_FAILED, &[&elapsed_ms, failure]);
        } else if info.is_canceled() {
            self.sink.information(format::COMMAND_CANCELED, &[&elapsed_ms]);
        } else {
            let result = format::render_result(event.result());
            self.sink
                .information(format::COMMAND_COMPLETED, &[&elapsed_ms, &result]);
        }
    }

    fn log_opened(&self, event: &ConnectionEvent<'_>) {
        let info = event.info();
        let (success, failure) = if info.is_async() {
            (format::CONNECTION_OPENED_ASYNC, format::CONNECTION_OPEN_FAILED_ASYNC)
        } else {
            (format::CONNECTION_OPENED, format::CONNECTION_OPEN_FAILED)
        };

        if info.failure().is_none() && info.is_canceled() {
            let timestamp = self.timestamp();
            self.sink
                .information(format::CONNECTION_OPEN_CANCELED, &[&timestamp]);
            return;
        }
        self.log_outcome(info, success, failure);
    }

    fn log_transaction_disposed(&self, event: &TransactionEvent<'_>) {
        if event.connection().is_none() {
            return;
        }
        self.log_outcome(
            event.info(),
            format::TRANSACTION_DISPOSED,
            format::TRANSACTION_DISPOSE_FAILED,
        );
    }

    /// Error line if a failure was captured, info line otherwise
    fn log_outcome(&self, info: &InterceptionContext, success: &str, failure_template: &str) {
        let timestamp = self.timestamp();
        match info.failure() {
            Some(failure) => self
                .sink
                .error(failure, failure_template, &[&timestamp, failure]),
            None => self.sink.information(success, &[&timestamp]),
        }
    }
}

impl fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRelay")
            .field("scoped", &self.is_scoped())
            .field("context_alive", &self.is_context_alive())
            .field("config", &self.config)
            .field("overrides", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

macro_rules! relay_hooks {
    ($($method:ident => $kind:ident($variant:ident, $event:ty);)*) => {
        impl Interceptor for EventRelay {
            $(
                fn $method(&self, event: &$event) {
                    self.handle(EventKind::$kind, EventRef::$variant(event));
                }
            )*

            fn name(&self) -> &'static str {
                "EventRelay"
            }
        }
    };
}

relay_hooks! {
    non_query_executing => NonQueryExecuting(Command, CommandEvent<'_>);
    non_query_executed => NonQueryExecuted(Command, CommandEvent<'_>);
    reader_executing => ReaderExecuting(Command, CommandEvent<'_>);
    reader_executed => ReaderExecuted(Command, CommandEvent<'_>);
    scalar_executing => ScalarExecuting(Command, CommandEvent<'_>);
    scalar_executed => ScalarExecuted(Command, CommandEvent<'_>);

    opening => Opening(Connection, ConnectionEvent<'_>);
    opened => Opened(Connection, ConnectionEvent<'_>);
    closing => Closing(Connection, ConnectionEvent<'_>);
    closed => Closed(Connection, ConnectionEvent<'_>);
    connection_disposing => ConnectionDisposing(Connection, ConnectionEvent<'_>);
    connection_disposed => ConnectionDisposed(Connection, ConnectionEvent<'_>);
    connection_string_getting => ConnectionStringGetting(Connection, ConnectionEvent<'_>);
    connection_string_got => ConnectionStringGot(Connection, ConnectionEvent<'_>);
    connection_string_setting => ConnectionStringSetting(Connection, ConnectionEvent<'_>);
    connection_string_set => ConnectionStringSet(Connection, ConnectionEvent<'_>);
    connection_timeout_getting => ConnectionTimeoutGetting(Connection, ConnectionEvent<'_>);
    connection_timeout_got => ConnectionTimeoutGot(Connection, ConnectionEvent<'_>);
    database_getting => DatabaseGetting(Connection, ConnectionEvent<'_>);
    database_got => DatabaseGot(Connection, ConnectionEvent<'_>);
    data_source_getting => DataSourceGetting(Connection, ConnectionEvent<'_>);
    data_source_got => DataSourceGot(Connection, ConnectionEvent<'_>);
    server_version_getting => ServerVersionGetting(Connection, ConnectionEvent<'_>);
    server_version_got => ServerVersionGot(Connection, ConnectionEvent<'_>);
    state_getting => StateGetting(Connection, ConnectionEvent<'_>);
    state_got => StateGot(Connection, ConnectionEvent<'_>);
    enlisting_transaction => EnlistingTransaction(Connection, ConnectionEvent<'_>);
    enlisted_transaction => EnlistedTransaction(Connection, ConnectionEvent<'_>);
    beginning_transaction => BeginningTransaction(Connection, ConnectionEvent<'_>);
    began_transaction => BeganTransaction(Connection, ConnectionEvent<'_>);

    committing => Committing(Transaction, TransactionEvent<'_>);
    committed => Committed(Transaction, TransactionEvent<'_>);
    rolling_back => RollingBack(Transaction, TransactionEvent<'_>);
    rolled_back => RolledBack(Transaction, TransactionEvent<'_>);
    transaction_disposing => TransactionDisposing(Transaction, TransactionEvent<'_>);
    transaction_disposed => TransactionDisposed(Transaction, TransactionEvent<'_>);
    isolation_level_getting => IsolationLevelGetting(Transaction, TransactionEvent<'_>);
    isolation_level_got => IsolationLevelGot(Transaction, TransactionEvent<'_>);
    transaction_connection_getting => TransactionConnectionGetting(Transaction, TransactionEvent<'_>);
    transaction_connection_got => TransactionConnectionGot(Transaction, TransactionEvent<'_>);
}
