use super::context::{CommandEvent, ConnectionEvent, TransactionEvent};

/// Callbacks invoked by the host around command, connection and transaction
/// operations (read-only).
///
/// Every hook defaults to a no-op so implementors only override what they
/// observe. Hooks run synchronously on the thread performing the operation.
#[allow(unused_variables)]
pub trait Interceptor: Send + Sync {
    // Commands

    /// Called before a non-query command is sent to the driver
    fn non_query_executing(&self, event: &CommandEvent<'_>) {}

    /// Called after a non-query command completes (success, failure or cancel)
    fn non_query_executed(&self, event: &CommandEvent<'_>) {}

    fn reader_executing(&self, event: &CommandEvent<'_>) {}

    fn reader_executed(&self, event: &CommandEvent<'_>) {}

    fn scalar_executing(&self, event: &CommandEvent<'_>) {}

    fn scalar_executed(&self, event: &CommandEvent<'_>) {}

    // Connections

    fn opening(&self, event: &ConnectionEvent<'_>) {}

    fn opened(&self, event: &ConnectionEvent<'_>) {}

    fn closing(&self, event: &ConnectionEvent<'_>) {}

    fn closed(&self, event: &ConnectionEvent<'_>) {}

    fn connection_disposing(&self, event: &ConnectionEvent<'_>) {}

    /// `event.original_state()` is the state the connection was in when
    /// disposal began
    fn connection_disposed(&self, event: &ConnectionEvent<'_>) {}

    fn connection_string_getting(&self, event: &ConnectionEvent<'_>) {}

    fn connection_string_got(&self, event: &ConnectionEvent<'_>) {}

    fn connection_string_setting(&self, event: &ConnectionEvent<'_>) {}

    fn connection_string_set(&self, event: &ConnectionEvent<'_>) {}

    fn connection_timeout_getting(&self, event: &ConnectionEvent<'_>) {}

    fn connection_timeout_got(&self, event: &ConnectionEvent<'_>) {}

    fn database_getting(&self, event: &ConnectionEvent<'_>) {}

    fn database_got(&self, event: &ConnectionEvent<'_>) {}

    fn data_source_getting(&self, event: &ConnectionEvent<'_>) {}

    fn data_source_got(&self, event: &ConnectionEvent<'_>) {}

    fn server_version_getting(&self, event: &ConnectionEvent<'_>) {}

    fn server_version_got(&self, event: &ConnectionEvent<'_>) {}

    fn state_getting(&self, event: &ConnectionEvent<'_>) {}

    fn state_got(&self, event: &ConnectionEvent<'_>) {}

    fn enlisting_transaction(&self, event: &ConnectionEvent<'_>) {}

    fn enlisted_transaction(&self, event: &ConnectionEvent<'_>) {}

    fn beginning_transaction(&self, event: &ConnectionEvent<'_>) {}

    fn began_transaction(&self, event: &ConnectionEvent<'_>) {}

    // Transactions

    fn committing(&self, event: &TransactionEvent<'_>) {}

    fn committed(&self, event: &TransactionEvent<'_>) {}

    fn rolling_back(&self, event: &TransactionEvent<'_>) {}

    fn rolled_back(&self, event: &TransactionEvent<'_>) {}

    fn transaction_disposing(&self, event: &TransactionEvent<'_>) {}

    /// `event.connection()` is the connection still associated when disposal
    /// began, `None` for a transaction that already completed
    fn transaction_disposed(&self, event: &TransactionEvent<'_>) {}

    fn isolation_level_getting(&self, event: &TransactionEvent<'_>) {}

    fn isolation_level_got(&self, event: &TransactionEvent<'_>) {}

    fn transaction_connection_getting(&self, event: &TransactionEvent<'_>) {}

    fn transaction_connection_got(&self, event: &TransactionEvent<'_>) {}

    /// Return the interceptor name for logging purposes
    fn name(&self) -> &'static str;
}
