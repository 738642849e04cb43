use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use super::connection::{ConnectionState, DbConnection};
use super::context::DbContext;
use super::driver::QueryOutput;
use crate::error::DbError;
use crate::interception::{CommandEvent, Interceptor, ResultValue};

/// Provider-neutral parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    AnsiString,
    Binary,
    Boolean,
    Byte,
    Currency,
    Date,
    DateTime,
    DateTimeOffset,
    Decimal,
    Double,
    Guid,
    Int16,
    Int32,
    Int64,
    Object,
    Single,
    String,
    Time,
    Xml,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A value bound to a parameter or produced by a query
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DbValue {
    #[default]
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Guid(Uuid),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// The parameter type a value maps to when none is given
    pub fn inferred_type(&self) -> DbType {
        match self {
            DbValue::Null => DbType::Object,
            DbValue::Boolean(_) => DbType::Boolean,
            DbValue::Int16(_) => DbType::Int16,
            DbValue::Int32(_) => DbType::Int32,
            DbValue::Int64(_) => DbType::Int64,
            DbValue::Double(_) => DbType::Double,
            DbValue::String(_) => DbType::String,
            DbValue::Binary(_) => DbType::Binary,
            DbValue::Guid(_) => DbType::Guid,
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => f.write_str("null"),
            DbValue::Boolean(v) => write!(f, "{}", v),
            DbValue::Int16(v) => write!(f, "{}", v),
            DbValue::Int32(v) => write!(f, "{}", v),
            DbValue::Int64(v) => write!(f, "{}", v),
            DbValue::Double(v) => write!(f, "{}", v),
            DbValue::String(v) => f.write_str(v),
            DbValue::Binary(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            DbValue::Guid(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}

impl From<i16> for DbValue {
    fn from(v: i16) -> Self {
        DbValue::Int16(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int32(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int64(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Double(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::String(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::String(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Binary(v)
    }
}

impl From<Uuid> for DbValue {
    fn from(v: Uuid) -> Self {
        DbValue::Guid(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// A command parameter. Defaults: input direction, nullable, zero size/precision/scale.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    pub name: String,
    pub value: DbValue,
    pub db_type: DbType,
    pub direction: ParameterDirection,
    pub is_nullable: bool,
    pub size: i32,
    pub precision: u8,
    pub scale: u8,
}

impl DbParameter {
    pub fn new(name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            db_type: value.inferred_type(),
            value,
            direction: ParameterDirection::Input,
            is_nullable: true,
            size: 0,
            precision: 0,
            scale: 0,
        }
    }

    pub fn with_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }
}

/// Forward-only cursor over a query's rows
#[derive(Debug, Clone, Default)]
pub struct DataReader {
    columns: Vec<String>,
    rows: VecDeque<Vec<DbValue>>,
}

impl DataReader {
    pub const TYPE_NAME: &'static str = "DataReader";

    pub fn new(columns: Vec<String>, rows: Vec<Vec<DbValue>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Advance to the next row
    pub fn read(&mut self) -> Option<Vec<DbValue>> {
        self.rows.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecuteKind {
    NonQuery,
    Scalar,
    Reader,
}

impl ExecuteKind {
    fn before(self, interceptor: &dyn Interceptor, event: &CommandEvent<'_>) {
        match self {
            ExecuteKind::NonQuery => interceptor.non_query_executing(event),
            ExecuteKind::Scalar => interceptor.scalar_executing(event),
            ExecuteKind::Reader => interceptor.reader_executing(event),
        }
    }

    fn after(self, interceptor: &dyn Interceptor, event: &CommandEvent<'_>) {
        match self {
            ExecuteKind::NonQuery => interceptor.non_query_executed(event),
            ExecuteKind::Scalar => interceptor.scalar_executed(event),
            ExecuteKind::Reader => interceptor.reader_executed(event),
        }
    }
}

/// A command bound to a connection
pub struct DbCommand {
    text: Option<String>,
    parameters: Vec<DbParameter>,
    connection: Arc<DbConnection>,
    contexts: Vec<Weak<DbContext>>,
}

impl DbCommand {
    /// Create a command; it inherits the connection's owning contexts
    pub fn new(connection: &Arc<DbConnection>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::without_text(connection)
        }
    }

    pub fn without_text(connection: &Arc<DbConnection>) -> Self {
        Self {
            text: None,
            parameters: Vec::new(),
            connection: connection.clone(),
            contexts: connection.owning_contexts().iter().map(Arc::downgrade).collect(),
        }
    }

    pub fn with_parameter(mut self, parameter: DbParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_context(mut self, context: &Arc<DbContext>) -> Self {
        if !self.contexts.iter().any(|c| Weak::as_ptr(c) == Arc::as_ptr(context)) {
            self.contexts.push(Arc::downgrade(context));
        }
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }

    pub fn connection(&self) -> &Arc<DbConnection> {
        &self.connection
    }

    /// Live owning contexts, in the order they were attached
    pub fn owning_contexts(&self) -> Vec<Arc<DbContext>> {
        self.contexts.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn execute_non_query(&self) -> Result<i64, DbError> {
        let output = self.execute(ExecuteKind::NonQuery)?;
        Ok(output.rows_affected)
    }

    pub async fn execute_non_query_async(&self) -> Result<i64, DbError> {
        let output = self.execute_async(ExecuteKind::NonQuery).await?;
        Ok(output.rows_affected)
    }

    /// First column of the first row, or `Null`
    pub fn execute_scalar(&self) -> Result<DbValue, DbError> {
        let output = self.execute(ExecuteKind::Scalar)?;
        Ok(first_cell(output))
    }

    pub async fn execute_scalar_async(&self) -> Result<DbValue, DbError> {
        let output = self.execute_async(ExecuteKind::Scalar).await?;
        Ok(first_cell(output))
    }

    pub fn execute_reader(&self) -> Result<DataReader, DbError> {
        let output = self.execute(ExecuteKind::Reader)?;
        Ok(DataReader::new(output.columns, output.rows))
    }

    pub async fn execute_reader_async(&self) -> Result<DataReader, DbError> {
        let output = self.execute_async(ExecuteKind::Reader).await?;
        Ok(DataReader::new(output.columns, output.rows))
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        match self.connection.current_state() {
            ConnectionState::Open => Ok(()),
            state => Err(DbError::InvalidOperation(format!(
                "command requires an open connection (state: {})",
                state
            ))),
        }
    }

    fn execute(&self, kind: ExecuteKind) -> Result<QueryOutput, DbError> {
        let registry = self.connection.registry();
        let mut event = CommandEvent::new(self, self.owning_contexts(), false);
        registry.dispatch(|i| kind.before(i, &event));

        let outcome = self
            .ensure_open()
            .and_then(|_| self.connection.driver().execute(self));

        event.complete(&outcome, |output| result_value(kind, output));
        registry.dispatch(|i| kind.after(i, &event));
        outcome
    }

    async fn execute_async(&self, kind: ExecuteKind) -> Result<QueryOutput, DbError> {
        let registry = self.connection.registry();
        let mut event = CommandEvent::new(self, self.owning_contexts(), true);
        registry.dispatch(|i| kind.before(i, &event));

        let outcome = match self.ensure_open() {
            Ok(()) => self.connection.driver().execute_async(self).await,
            Err(e) => Err(e),
        };

        event.complete(&outcome, |output| result_value(kind, output));
        registry.dispatch(|i| kind.after(i, &event));
        outcome
    }
}

impl fmt::Debug for DbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCommand")
            .field("text", &self.text)
            .field("parameters", &self.parameters)
            .finish()
    }
}

fn first_cell(output: QueryOutput) -> DbValue {
    output
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .unwrap_or_default()
}

fn result_value(kind: ExecuteKind, output: &QueryOutput) -> Option<ResultValue> {
    match kind {
        ExecuteKind::NonQuery => Some(ResultValue::RowsAffected(output.rows_affected)),
        ExecuteKind::Scalar => output
            .rows
            .first()
            .and_then(|row| row.first())
            .filter(|v| !v.is_null())
            .cloned()
            .map(ResultValue::Scalar),
        ExecuteKind::Reader => Some(ResultValue::Reader {
            type_name: DataReader::TYPE_NAME,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_defaults() {
        let p = DbParameter::new("p0", 5);
        assert_eq!(p.db_type, DbType::Int32);
        assert_eq!(p.direction, ParameterDirection::Input);
        assert!(p.is_nullable);
        assert_eq!((p.size, p.precision, p.scale), (0, 0, 0));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(DbValue::Null.to_string(), "null");
        assert_eq!(DbValue::from("abc").to_string(), "abc");
        assert_eq!(DbValue::from(vec![0x0a, 0xff]).to_string(), "0x0AFF");
        assert_eq!(DbValue::from(None::<i32>), DbValue::Null);
    }

    #[test]
    fn test_reader_is_forward_only() {
        let mut reader = DataReader::new(
            vec!["id".to_string()],
            vec![vec![DbValue::Int32(1)], vec![DbValue::Int32(2)]],
        );
        assert!(reader.has_rows());
        assert_eq!(reader.read(), Some(vec![DbValue::Int32(1)]));
        assert_eq!(reader.read(), Some(vec![DbValue::Int32(2)]));
        assert_eq!(reader.read(), None);
    }

    #[test]
    fn test_scalar_result_value() {
        let output = QueryOutput::rows(vec!["n"], vec![vec![DbValue::Int64(3)]]);
        assert_eq!(
            result_value(ExecuteKind::Scalar, &output),
            Some(ResultValue::Scalar(DbValue::Int64(3)))
        );

        let empty = QueryOutput::default();
        assert_eq!(result_value(ExecuteKind::Scalar, &empty), None);
        assert_eq!(
            result_value(ExecuteKind::Reader, &empty),
            Some(ResultValue::Reader { type_name: "DataReader" })
        );
    }
}
