//! Message templates and the pieces of command output that are built
//! before reaching the sink.

use std::fmt::Write;

use crate::host::{DbParameter, ParameterDirection};
use crate::interception::ResultValue;

/// Rendered in place of absent command text or results
pub const NULL_TEXT: &str = "<null>";

pub const COMMAND_TEXT: &str = "{CommandText}";
pub const PARAMETER: &str = "{Parameter}";
pub const EXECUTING: &str = "Executing at {Timestamp}";
pub const EXECUTING_ASYNC: &str = "Executing asynchronously at {Timestamp}";

pub const COMMAND_FAILED: &str = "Failed in {ElapsedMilliseconds} ms with error: {Message}";
pub const COMMAND_CANCELED: &str = "Canceled in {ElapsedMilliseconds} ms";
pub const COMMAND_COMPLETED: &str = "Completed in {ElapsedMilliseconds} ms with result: {Result}";

pub const CONNECTION_OPENED: &str = "Opened connection at {Timestamp}";
pub const CONNECTION_OPENED_ASYNC: &str = "Opened connection asynchronously at {Timestamp}";
pub const CONNECTION_OPEN_FAILED: &str = "Failed to open connection at {Timestamp} with error: {Message}";
pub const CONNECTION_OPEN_FAILED_ASYNC: &str =
    "Failed to open connection asynchronously at {Timestamp} with error: {Message}";
pub const CONNECTION_OPEN_CANCELED: &str = "Canceled open connection at {Timestamp}";
pub const CONNECTION_CLOSED: &str = "Closed connection at {Timestamp}";
pub const CONNECTION_CLOSE_FAILED: &str = "Failed to close connection at {Timestamp} with error: {Message}";
pub const CONNECTION_DISPOSED: &str = "Disposed connection at {Timestamp}";
pub const CONNECTION_DISPOSE_FAILED: &str =
    "Failed to dispose connection at {Timestamp} with error: {Message}";

pub const TRANSACTION_STARTED: &str = "Started transaction at {Timestamp}";
pub const TRANSACTION_START_FAILED: &str = "Failed to start transaction at {Timestamp} with error: {Message}";
pub const TRANSACTION_COMMITTED: &str = "Committed transaction at {Timestamp}";
pub const TRANSACTION_COMMIT_FAILED: &str = "Failed to commit transaction at {Timestamp} with error: {Message}";
pub const TRANSACTION_ROLLED_BACK: &str = "Rolled back transaction at {Timestamp}";
pub const TRANSACTION_ROLLBACK_FAILED: &str =
    "Failed to rollback transaction at {Timestamp} with error: {Message}";
pub const TRANSACTION_DISPOSED: &str = "Disposed transaction at {Timestamp}";
pub const TRANSACTION_DISPOSE_FAILED: &str =
    "Failed to dispose transaction at {Timestamp} with error: {Message}";

/// Render one parameter line, terminator included:
///
/// `-- p0: '5' (Type = Int32, Direction = Output, IsNullable = false)`
///
/// Optional fields only appear when they differ from the defaults.
pub fn format_parameter(parameter: &DbParameter, log_values: bool) -> String {
    let value = if !log_values {
        "?".to_string()
    } else {
        parameter.value.to_string()
    };

    let mut line = format!(
        "-- {}: '{}' (Type = {}",
        parameter.name, value, parameter.db_type
    );

    // Writing to a String cannot fail
    if parameter.direction != ParameterDirection::Input {
        let _ = write!(line, ", Direction = {}", parameter.direction);
    }
    if !parameter.is_nullable {
        line.push_str(", IsNullable = false");
    }
    if parameter.size != 0 {
        let _ = write!(line, ", Size = {}", parameter.size);
    }
    if parameter.precision != 0 {
        let _ = write!(line, ", Precision = {}", parameter.precision);
    }
    if parameter.scale != 0 {
        let _ = write!(line, ", Scale = {}", parameter.scale);
    }

    line.push_str(")\n");
    line
}

/// `<null>` when absent, the type name for a reader, otherwise the value
pub fn render_result(result: Option<&ResultValue>) -> String {
    match result {
        None => NULL_TEXT.to_string(),
        Some(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DbType, DbValue};

    #[test]
    fn test_default_parameter_shows_type_only() {
        let p = DbParameter::new("p0", 5);
        assert_eq!(format_parameter(&p, true), "-- p0: '5' (Type = Int32)\n");
    }

    #[test]
    fn test_direction_and_nullability() {
        let p = DbParameter::new("p0", 5)
            .with_direction(ParameterDirection::Output)
            .with_nullable(false);
        assert_eq!(
            format_parameter(&p, true),
            "-- p0: '5' (Type = Int32, Direction = Output, IsNullable = false)\n"
        );
    }

    #[test]
    fn test_all_optional_fields_in_order() {
        let p = DbParameter::new("amount", DbValue::String("12.50".to_string()))
            .with_type(DbType::Decimal)
            .with_direction(ParameterDirection::InputOutput)
            .with_nullable(false)
            .with_size(16)
            .with_precision(10, 2);
        assert_eq!(
            format_parameter(&p, true),
            "-- amount: '12.50' (Type = Decimal, Direction = InputOutput, IsNullable = false, Size = 16, Precision = 10, Scale = 2)\n"
        );
    }

    #[test]
    fn test_null_and_hidden_values() {
        let p = DbParameter::new("name", DbValue::Null).with_type(DbType::String);
        assert_eq!(format_parameter(&p, true), "-- name: 'null' (Type = String)\n");

        let secret = DbParameter::new("password", "hunter2");
        assert_eq!(format_parameter(&secret, false), "-- password: '?' (Type = String)\n");
    }

    #[test]
    fn test_render_result() {
        assert_eq!(render_result(None), "<null>");
        assert_eq!(render_result(Some(&ResultValue::RowsAffected(1))), "1");
        assert_eq!(
            render_result(Some(&ResultValue::Reader { type_name: "DataReader" })),
            "DataReader"
        );
    }
}
