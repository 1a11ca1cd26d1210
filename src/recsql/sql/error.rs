/*!
# SQL Error Handling

Error types for statement parsing and query execution. All operations return
structured errors with enough context to locate the failure: token position for
parse errors, column/row indices and the failing record's display form for
execution errors, expected/actual type names for type errors.

## Error Categories

- **Parse Errors**: syntax errors in statement text, out-of-range column
  references, invalid GROUP ORDER BY keys, mismatched EXPAND usage
- **Execution Errors**: runtime expression evaluation failures, grouping
  failures, deferred comparator errors re-raised after a sort
- **Type Errors**: value conversion and comparison failures

There is no partial-success mode: a per-row or per-group evaluation failure
aborts the owning stage and propagates as an execution error with the original
failure attached as its source.
*/

use thiserror::Error;

/// Errors raised while parsing or executing a query.
#[derive(Debug, Clone, Error)]
pub enum SqlError {
    /// Statement could not be parsed, or a clause failed init-time validation.
    #[error("SQL parse error{}: {message}", .position.map(|p| format!(" at position {}", p)).unwrap_or_default())]
    ParseError {
        /// Human-readable error message
        message: String,
        /// Character position in the statement text, when known
        position: Option<usize>,
    },

    /// A parsed query failed during execution.
    #[error("Query execution error: {message}")]
    ExecutionError {
        /// Description of the failure, including positional context
        message: String,
        /// The original failure, when this error wraps one
        #[source]
        cause: Option<Box<SqlError>>,
    },

    /// A value had the wrong type for the operation applied to it.
    #[error("Type error: expected {expected}, got {actual}{}", .value.as_ref().map(|v| format!(" for value '{}'", v)).unwrap_or_default())]
    TypeError {
        /// Expected type or type family
        expected: String,
        /// Actual type encountered
        actual: String,
        /// Display form of the offending value, when available
        value: Option<String>,
    },
}

impl SqlError {
    /// Create a parse error with an optional statement position.
    pub fn parse_error(message: impl Into<String>, position: Option<usize>) -> Self {
        SqlError::ParseError {
            message: message.into(),
            position,
        }
    }

    /// Create an execution error with no underlying cause.
    pub fn execution_error(message: impl Into<String>) -> Self {
        SqlError::ExecutionError {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an execution error wrapping the failure that triggered it.
    pub fn execution_error_with_cause(message: impl Into<String>, cause: SqlError) -> Self {
        SqlError::ExecutionError {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Create a type error.
    pub fn type_error(
        expected: impl Into<String>,
        actual: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        SqlError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
            value,
        }
    }
}

/// Result type for SQL operations
pub type SqlResult<T> = Result<T, SqlError>;
