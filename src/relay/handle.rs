use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::event_relay::EventRelay;
use crate::config::RelayConfig;
use crate::host::{DbContext, DisposeSubscription};
use crate::interception::{InterceptionRegistry, InterceptorId};
use crate::sink::{LogSink, TracingSink};

/// Registration of an [`EventRelay`]; disposing (or dropping) it unregisters the relay
pub struct RelayHandle {
    registry: InterceptionRegistry,
    id: InterceptorId,
    relay: Arc<EventRelay>,
    context_subscription: Option<(Weak<DbContext>, DisposeSubscription)>,
    disposed: AtomicBool,
}

impl RelayHandle {
    pub fn id(&self) -> InterceptorId {
        self.id
    }

    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }

    /// False once disposed or once the scoped context went away
    pub fn is_registered(&self) -> bool {
        self.registry.contains(self.id)
    }

    /// Unregister the relay and its context dispose listener. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.unregister(self.id);
        if let Some((context, subscription)) = &self.context_subscription {
            if let Some(context) = context.upgrade() {
                context.remove_dispose_listener(*subscription);
            }
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayHandle")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl EventRelay {
    /// Register with `registry`.
    ///
    /// A scoped relay also unregisters itself when its context is disposed.
    pub fn attach(self, registry: &InterceptionRegistry) -> RelayHandle {
        let relay = Arc::new(self);
        let id = registry.register(relay.clone());

        let context_subscription = relay.context().map(|context| {
            let registry = registry.clone();
            let subscription = context.on_dispose(move |ctx| {
                if registry.unregister(id) {
                    tracing::debug!("Context {} disposed, relay {} unregistered", ctx.name(), id);
                }
            });
            (Arc::downgrade(&context), subscription)
        });

        RelayHandle {
            registry: registry.clone(),
            id,
            relay,
            context_subscription,
            disposed: AtomicBool::new(false),
        }
    }
}

/// Register a logging relay.
///
/// Without a sink events go to [`TracingSink`]; without a context the relay
/// logs events from every context.
pub fn register(
    registry: &InterceptionRegistry,
    sink: Option<Arc<dyn LogSink>>,
    context: Option<&Arc<DbContext>>,
    config: RelayConfig,
) -> RelayHandle {
    let sink = sink.unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn LogSink>);
    let relay = match context {
        Some(context) => EventRelay::scoped(sink, context),
        None => EventRelay::new(sink),
    };
    relay.with_config(config).attach(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::host::{
        DbCommand, DbConnection, DbParameter, DbValue, DriverOp, IsolationLevel, MemoryDriver,
        QueryOutput, Scripted,
    };
    use crate::sink::{MemorySink, RecordLevel};
    use std::time::Duration;

    struct Fixture {
        registry: InterceptionRegistry,
        driver: Arc<MemoryDriver>,
        sink: Arc<MemorySink>,
    }

    impl Fixture {
        fn new(driver: MemoryDriver) -> Self {
            Self {
                registry: InterceptionRegistry::new(),
                driver: Arc::new(driver),
                sink: Arc::new(MemorySink::new()),
            }
        }

        fn connection(&self) -> Arc<DbConnection> {
            DbConnection::new("Data Source=mem;Database=shop", self.driver.clone(), self.registry.clone())
        }

        fn register(&self, context: Option<&Arc<DbContext>>) -> RelayHandle {
            register(
                &self.registry,
                Some(self.sink.clone()),
                context,
                RelayConfig::default(),
            )
        }
    }

    #[test]
    fn test_scoped_failing_non_query() {
        let fx = Fixture::new(
            MemoryDriver::new().with_response("DELETE FROM orders", Scripted::Fail("FK violation".to_string())),
        );
        let ctx = DbContext::new("A");
        let _handle = fx.register(Some(&ctx));

        let conn = fx.connection();
        conn.attach_context(&ctx);
        conn.open().unwrap();
        fx.sink.clear();

        let command = DbCommand::new(&conn, "DELETE FROM orders")
            .with_parameter(DbParameter::new("id", 7));
        assert_eq!(command.execute_non_query(), Err(DbError::driver("FK violation")));

        let records = fx.sink.records();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].message, "DELETE FROM orders");
        assert_eq!(records[1].message, "-- id: '7' (Type = Int32)\n");
        assert!(records[2].message.starts_with("Executing at "));
        assert_eq!(records[3].level, RecordLevel::Error);
        assert!(records[3].message.starts_with("Failed in "));
        assert!(records[3].message.contains("FK violation"));
    }

    #[test]
    fn test_unscoped_sync_open() {
        let fx = Fixture::new(MemoryDriver::new());
        let _handle = fx.register(None);

        fx.connection().open().unwrap();

        let records = fx.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, RecordLevel::Information);
        let timestamp = records[0]
            .message
            .strip_prefix("Opened connection at ")
            .expect("open line");
        assert!(!timestamp.is_empty());
    }

    #[test]
    fn test_scoped_ignores_other_contexts() {
        let fx = Fixture::new(MemoryDriver::new());
        let mine = DbContext::new("orders");
        let other = DbContext::new("orders");
        let _handle = fx.register(Some(&mine));

        let conn = fx.connection();
        conn.attach_context(&other);
        conn.open().unwrap();
        DbCommand::new(&conn, "SELECT 1").execute_scalar().unwrap();
        assert!(fx.sink.is_empty());

        DbCommand::new(&conn, "SELECT 2")
            .with_context(&mine)
            .execute_scalar()
            .unwrap();
        assert_eq!(fx.sink.len(), 3);
    }

    #[test]
    fn test_command_results() {
        let fx = Fixture::new(
            MemoryDriver::new()
                .with_response(
                    "SELECT COUNT(*) FROM orders",
                    Scripted::Output(QueryOutput::rows(vec!["count"], vec![vec![DbValue::Int64(42)]])),
                )
                .with_response(
                    "SELECT id FROM orders",
                    Scripted::Output(QueryOutput::rows(vec!["id"], vec![vec![DbValue::Int32(1)]])),
                )
                .with_response("UPDATE orders SET paid = 1", Scripted::Output(QueryOutput::affected(5))),
        );
        let _handle = fx.register(None);
        let conn = fx.connection();
        conn.open().unwrap();
        fx.sink.clear();

        assert_eq!(
            DbCommand::new(&conn, "SELECT COUNT(*) FROM orders").execute_scalar(),
            Ok(DbValue::Int64(42))
        );
        let mut reader = DbCommand::new(&conn, "SELECT id FROM orders").execute_reader().unwrap();
        assert_eq!(reader.read(), Some(vec![DbValue::Int32(1)]));
        assert_eq!(
            DbCommand::new(&conn, "UPDATE orders SET paid = 1").execute_non_query(),
            Ok(5)
        );

        let completed: Vec<String> = fx
            .sink
            .messages()
            .into_iter()
            .filter(|m| m.starts_with("Completed in "))
            .collect();
        assert_eq!(completed.len(), 3);
        assert!(completed[0].ends_with("with result: 42"));
        assert!(completed[1].ends_with("with result: DataReader"));
        assert!(completed[2].ends_with("with result: 5"));
    }

    #[test]
    fn test_command_on_closed_connection_fails() {
        let fx = Fixture::new(MemoryDriver::new());
        let _handle = fx.register(None);
        let conn = fx.connection();

        assert!(DbCommand::new(&conn, "SELECT 1").execute_scalar().is_err());
        let records = fx.sink.records();
        assert_eq!(records.last().map(|r| r.level), Some(RecordLevel::Error));
        assert!(fx.driver.executed().is_empty());
    }

    #[test]
    fn test_connection_dispose_lines() {
        let fx = Fixture::new(MemoryDriver::new());
        let _handle = fx.register(None);

        let closed = fx.connection();
        closed.dispose().unwrap();
        assert!(fx.sink.is_empty());

        let open = fx.connection();
        open.open().unwrap();
        fx.sink.clear();
        open.dispose().unwrap();
        open.dispose().unwrap();

        let messages = fx.sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Disposed connection at "));
    }

    #[test]
    fn test_transaction_lifecycle_lines() {
        let fx = Fixture::new(
            MemoryDriver::new().with_failure(DriverOp::Rollback, Scripted::Fail("connection lost".to_string())),
        );
        let _handle = fx.register(None);
        let conn = fx.connection();
        conn.open().unwrap();
        fx.sink.clear();

        let committed = conn.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        committed.commit().unwrap();
        committed.dispose().unwrap();

        let failed = conn.begin_transaction(IsolationLevel::Serializable).unwrap();
        assert!(failed.rollback().is_err());

        let records = fx.sink.records();
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages.len(), 4);
        assert!(messages[0].starts_with("Started transaction at "));
        assert!(messages[1].starts_with("Committed transaction at "));
        assert!(messages[2].starts_with("Started transaction at "));
        assert!(messages[3].starts_with("Failed to rollback transaction at "));
        assert!(messages[3].ends_with("with error: connection lost"));
        assert_eq!(records[3].level, RecordLevel::Error);
    }

    #[test]
    fn test_dispose_pending_transaction_logs() {
        let fx = Fixture::new(MemoryDriver::new());
        let _handle = fx.register(None);
        let conn = fx.connection();
        conn.open().unwrap();
        let tx = conn.begin_transaction(IsolationLevel::Unspecified).unwrap();
        fx.sink.clear();

        tx.dispose().unwrap();
        let messages = fx.sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Disposed transaction at "));
    }

    #[test]
    fn test_handle_dispose_is_idempotent() {
        let fx = Fixture::new(MemoryDriver::new());
        let handle = fx.register(None);
        assert!(handle.is_registered());
        assert_eq!(fx.registry.interceptor_count(), 1);

        handle.dispose();
        handle.dispose();
        assert!(!handle.is_registered());
        assert_eq!(fx.registry.interceptor_count(), 0);

        fx.connection().open().unwrap();
        assert!(fx.sink.is_empty());
    }

    #[test]
    fn test_drop_unregisters() {
        let fx = Fixture::new(MemoryDriver::new());
        drop(fx.register(None));
        assert_eq!(fx.registry.interceptor_count(), 0);
    }

    #[test]
    fn test_repeated_registration_releases_dispose_listeners() {
        let fx = Fixture::new(MemoryDriver::new());
        let ctx = DbContext::new("orders");

        for _ in 0..100 {
            fx.register(Some(&ctx)).dispose();
        }
        for _ in 0..100 {
            drop(fx.register(Some(&ctx)));
        }
        assert_eq!(fx.registry.interceptor_count(), 0);
        assert_eq!(ctx.dispose_listener_count(), 0);

        let handle = fx.register(Some(&ctx));
        assert_eq!(ctx.dispose_listener_count(), 1);
        ctx.dispose();
        assert!(!handle.is_registered());
        assert_eq!(ctx.dispose_listener_count(), 0);
    }

    #[test]
    fn test_context_dispose_unregisters_relay() {
        let fx = Fixture::new(MemoryDriver::new());
        let ctx = DbContext::new("orders");
        let handle = fx.register(Some(&ctx));
        assert!(handle.relay().is_scoped());
        assert!(handle.is_registered());

        ctx.dispose();
        assert!(!handle.is_registered());
        assert_eq!(fx.registry.interceptor_count(), 0);

        handle.dispose();
        drop(ctx);
        assert!(!handle.relay().is_context_alive());
    }

    #[test]
    fn test_context_drop_unregisters_relay() {
        let fx = Fixture::new(MemoryDriver::new());
        let ctx = DbContext::new("orders");
        let handle = fx.register(Some(&ctx));

        drop(ctx);
        assert!(!handle.is_registered());
    }

    #[tokio::test]
    async fn test_async_execution_lines() {
        let fx = Fixture::new(
            MemoryDriver::new()
                .with_latency(Duration::from_millis(5))
                .with_response("WAITFOR DELAY", Scripted::Cancel),
        );
        let _handle = fx.register(None);
        let conn = fx.connection();
        conn.open_async().await.unwrap();

        let affected = DbCommand::new(&conn, "INSERT INTO log VALUES (1)")
            .execute_non_query_async()
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert_eq!(
            DbCommand::new(&conn, "WAITFOR DELAY").execute_non_query_async().await,
            Err(DbError::Canceled)
        );

        let messages = fx.sink.messages();
        assert!(messages[0].starts_with("Opened connection asynchronously at "));
        assert_eq!(messages[1], "INSERT INTO log VALUES (1)");
        assert!(messages[2].starts_with("Executing asynchronously at "));
        assert!(messages[3].starts_with("Completed in "));
        assert_eq!(messages[4], "WAITFOR DELAY");
        assert!(messages[5].starts_with("Executing asynchronously at "));
        assert!(messages[6].starts_with("Canceled in "));
        assert_eq!(messages.len(), 7);
    }

    #[tokio::test]
    async fn test_overlapping_commands_time_independently() {
        let fx = Fixture::new(MemoryDriver::new().with_latency(Duration::from_millis(20)));
        let _handle = fx.register(None);
        let conn = fx.connection();
        conn.open().unwrap();
        fx.sink.clear();

        let first = DbCommand::new(&conn, "SELECT 1");
        let second = DbCommand::new(&conn, "SELECT 2");
        let (a, b) = tokio::join!(first.execute_scalar_async(), second.execute_scalar_async());
        assert!(a.is_ok() && b.is_ok());

        for message in fx.sink.messages().iter().filter(|m| m.starts_with("Completed in ")) {
            let ms: u128 = message["Completed in ".len()..]
                .split(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .expect("elapsed milliseconds");
            assert!(ms >= 15, "elapsed {} ms in {:?}", ms, message);
        }
    }
}
