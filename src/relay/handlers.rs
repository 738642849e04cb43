use std::sync::Arc;

use super::event_relay::EventRelay;
use crate::interception::{CommandEvent, ConnectionEvent, InterceptionContext, TransactionEvent};

/// Group of hooks that can be switched on or off together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Command,
    Connection,
    Transaction,
}

/// One interception hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NonQueryExecuting,
    NonQueryExecuted,
    ReaderExecuting,
    ReaderExecuted,
    ScalarExecuting,
    ScalarExecuted,

    Opening,
    Opened,
    Closing,
    Closed,
    ConnectionDisposing,
    ConnectionDisposed,
    ConnectionStringGetting,
    ConnectionStringGot,
    ConnectionStringSetting,
    ConnectionStringSet,
    ConnectionTimeoutGetting,
    ConnectionTimeoutGot,
    DatabaseGetting,
    DatabaseGot,
    DataSourceGetting,
    DataSourceGot,
    ServerVersionGetting,
    ServerVersionGot,
    StateGetting,
    StateGot,
    EnlistingTransaction,
    EnlistedTransaction,

    BeginningTransaction,
    BeganTransaction,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    TransactionDisposing,
    TransactionDisposed,
    IsolationLevelGetting,
    IsolationLevelGot,
    TransactionConnectionGetting,
    TransactionConnectionGot,
}

impl EventKind {
    pub fn category(self) -> Category {
        use EventKind::*;
        match self {
            NonQueryExecuting | NonQueryExecuted | ReaderExecuting | ReaderExecuted
            | ScalarExecuting | ScalarExecuted => Category::Command,

            BeginningTransaction | BeganTransaction | Committing | Committed | RollingBack
            | RolledBack | TransactionDisposing | TransactionDisposed | IsolationLevelGetting
            | IsolationLevelGot | TransactionConnectionGetting | TransactionConnectionGot => {
                Category::Transaction
            }

            _ => Category::Connection,
        }
    }
}

/// Borrowed view of whichever event a hook received
#[derive(Debug, Clone, Copy)]
pub enum EventRef<'e> {
    Command(&'e CommandEvent<'e>),
    Connection(&'e ConnectionEvent<'e>),
    Transaction(&'e TransactionEvent<'e>),
}

impl<'e> EventRef<'e> {
    pub fn info(&self) -> &'e InterceptionContext {
        match *self {
            EventRef::Command(e) => e.info(),
            EventRef::Connection(e) => e.info(),
            EventRef::Transaction(e) => e.info(),
        }
    }
}

/// Replacement for the built-in behavior of one [`EventKind`].
///
/// Receives the relay so it can reuse the sink, the config or
/// [`EventRelay::run_default`].
pub type Handler = Arc<dyn Fn(&EventRelay, EventKind, EventRef<'_>) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(EventKind::ScalarExecuted.category(), Category::Command);
        assert_eq!(EventKind::Opened.category(), Category::Connection);
        assert_eq!(EventKind::EnlistedTransaction.category(), Category::Connection);
        assert_eq!(EventKind::BeganTransaction.category(), Category::Transaction);
        assert_eq!(EventKind::TransactionDisposed.category(), Category::Transaction);
    }
}
