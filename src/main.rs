use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dbrelay::host::{
    DbCommand, DbConnection, DbContext, DbParameter, DbType, DbValue, IsolationLevel, MemoryDriver,
    ParameterDirection, QueryOutput, Scripted,
};
use dbrelay::{logging, register, InterceptionRegistry, RelayConfig};

/// Runs a scripted session against the in-memory driver with a scoped relay attached.
///
/// Usage: `dbrelay-demo [config.toml]`
#[tokio::main]
async fn main() -> Result<()> {
    let log_dir = logging::default_log_dir();
    let _guard = logging::init(Some(log_dir.as_path()))?;

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => RelayConfig::load(&path)?,
        None => RelayConfig::default(),
    };

    let driver = MemoryDriver::new()
        .with_latency(Duration::from_millis(3))
        .with_response(
            "SELECT COUNT(*) FROM orders",
            Scripted::Output(QueryOutput::rows(vec!["count"], vec![vec![DbValue::Int64(2)]])),
        )
        .with_response(
            "SELECT id, total FROM orders",
            Scripted::Output(QueryOutput::rows(
                vec!["id", "total"],
                vec![
                    vec![DbValue::Int32(1), DbValue::Double(19.5)],
                    vec![DbValue::Int32(2), DbValue::Double(7.25)],
                ],
            )),
        )
        .with_response(
            "INSERT INTO orders (id, total) VALUES (@id, @total)",
            Scripted::Output(QueryOutput::affected(1)),
        )
        .with_response(
            "DELETE FROM customers",
            Scripted::Fail("DELETE statement conflicted with a foreign key constraint".to_string()),
        );

    let registry = InterceptionRegistry::new();
    let ctx = DbContext::new("orders");
    let handle = register(&registry, None, Some(&ctx), config);
    tracing::info!("Relay registered ({})", handle.id());

    let conn = DbConnection::new("Data Source=memory;Database=shop", Arc::new(driver), registry.clone());
    conn.attach_context(&ctx);
    conn.open_async().await?;

    let tx = conn.begin_transaction(IsolationLevel::ReadCommitted)?;
    DbCommand::new(&conn, "INSERT INTO orders (id, total) VALUES (@id, @total)")
        .with_parameter(DbParameter::new("id", 3).with_nullable(false))
        .with_parameter(
            DbParameter::new("total", 12.0)
                .with_type(DbType::Decimal)
                .with_precision(10, 2),
        )
        .with_parameter(
            DbParameter::new("rowversion", DbValue::Null)
                .with_type(DbType::Binary)
                .with_direction(ParameterDirection::Output)
                .with_size(8),
        )
        .execute_non_query()?;
    tx.commit()?;
    tx.dispose()?;

    let count = DbCommand::new(&conn, "SELECT COUNT(*) FROM orders")
        .execute_scalar_async()
        .await?;
    tracing::info!("Order count: {}", count);

    let mut reader = DbCommand::new(&conn, "SELECT id, total FROM orders").execute_reader()?;
    while let Some(row) = reader.read() {
        tracing::debug!("Row: {:?}", row);
    }

    if let Err(e) = DbCommand::new(&conn, "DELETE FROM customers").execute_non_query() {
        tracing::warn!("Expected failure: {}", e);
    }

    conn.dispose()?;
    ctx.dispose();
    tracing::info!("Relay registered after context disposal: {}", handle.is_registered());

    Ok(())
}
