//! # recsql
//!
//! An embeddable SQL-like query engine for in-memory collections of records.
//! Any homogeneous collection of field-mapped values can be treated as a
//! queryable "table" without a database: parse a statement once, then execute
//! it against one or more record lists.
//!
//! ## Features
//!
//! - **Full statement surface**: SELECT (with DISTINCT, aliases, expressions),
//!   WHERE, GROUP BY, HAVING, ORDER BY, GROUP ORDER BY, LIMIT, GROUP LIMIT and
//!   EXECUTE ON aggregate scoping
//! - **Aggregates as plain expressions**: `EXECUTE ON GROUP_BY_RESULTS
//!   sum(time) AS total` computes once per scope and makes `@total` available
//!   to HAVING, SELECT and ORDER BY
//! - **Bind variables**: named (`:name`), anonymous (`?`) and the special
//!   `:_currobj` / `:_allobjs` / `:_grpby` / `:_parent` execution-scope
//!   variables
//! - **Serde ingestion**: any `Serialize` type becomes a queryable record
//!
//! ## Quick Start
//!
//! ```rust
//! use recsql::{FieldValue, Query, Record};
//! use std::collections::HashMap;
//!
//! fn record(worker: &str, time: i64) -> Record {
//!     let mut fields = HashMap::new();
//!     fields.insert("worker".to_string(), FieldValue::String(worker.to_string()));
//!     fields.insert("time".to_string(), FieldValue::Integer(time));
//!     Record::new(fields)
//! }
//!
//! fn main() -> Result<(), recsql::SqlError> {
//!     let query = Query::parse_str(
//!         "SELECT worker, @total FROM work \
//!          GROUP BY worker \
//!          EXECUTE ON GROUP_BY_RESULTS sum(time) AS total",
//!     )?;
//!
//!     let results = query.execute(vec![record("jay", 8), record("sam", 5), record("jay", 2)])?;
//!     assert_eq!(results.rows().len(), 2);
//!     Ok(())
//! }
//! ```

pub mod recsql;

// Re-export main API
pub use recsql::sql::ast::OrderDirection;
pub use recsql::sql::error::{SqlError, SqlResult};
pub use recsql::sql::execution::results::{QueryResults, ResultSet};
pub use recsql::sql::execution::types::{FieldValue, Record};
pub use recsql::sql::query::Query;
