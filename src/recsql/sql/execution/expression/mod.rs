//! Expression evaluation.
//!
//! One evaluation function per AST variant, implementing the contract every
//! pipeline stage depends on: `init` (validate shape at parse time), `value`
//! (evaluate against the context's current record), `is_true` (truth test)
//! and `has_fixed_result` (whether the result can vary per record).

pub mod evaluator;
pub mod functions;

pub use evaluator::ExpressionEvaluator;
pub use functions::BuiltinFunctions;
