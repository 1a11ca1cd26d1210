//! Query execution layer: data types, evaluation context, result sink,
//! expression evaluation and the stage processors.

pub mod context;
pub mod expression;
pub mod processors;
pub mod results;
pub mod types;
pub mod utils;

pub use context::{CurrentItem, ExecutionContext};
pub use expression::ExpressionEvaluator;
pub use results::{GroupKey, QueryResults, ResultSet, SaveValues};
pub use types::{FieldValue, Record};
