//! LIMIT stage.

use crate::recsql::sql::ast::LimitClause;
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::results::ResultSet;

/// Processor for LIMIT and GROUP LIMIT stages
pub struct LimitProcessor;

impl LimitProcessor {
    /// Return the `[offset, offset + count)` sub-sequence of the working set,
    /// clipped to its bounds. Offset and count are evaluated at stage time so
    /// bind variables can drive pagination; both must yield non-negative
    /// integers.
    pub fn process(
        limit: &LimitClause,
        results: ResultSet,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<ResultSet> {
        let offset = Self::eval_bound(&limit.offset, "offset", ctx)?;
        let count = Self::eval_bound(&limit.count, "count", ctx)?;
        Ok(results.sub_list(offset, count))
    }

    fn eval_bound(
        expr: &crate::recsql::sql::ast::Expr,
        what: &str,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<usize> {
        let value = ExpressionEvaluator::value(expr, ctx)?;
        value.as_index().ok_or_else(|| {
            SqlError::type_error(
                format!("non-negative INTEGER limit {}", what),
                value.type_name(),
                Some(value.to_string()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recsql::sql::ast::{BindVarRef, Expr, LiteralValue};
    use crate::recsql::sql::execution::types::FieldValue;
    use std::collections::HashMap;

    fn values(items: &[i64]) -> ResultSet {
        ResultSet::Values(items.iter().map(|i| FieldValue::Integer(*i)).collect())
    }

    fn literal_limit(offset: i64, count: i64) -> LimitClause {
        LimitClause {
            offset: Expr::Literal(LiteralValue::Integer(offset)),
            count: Expr::Literal(LiteralValue::Integer(count)),
        }
    }

    #[test]
    fn test_limit_skips_offset_rows() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let out = LimitProcessor::process(&literal_limit(1, 2), values(&[10, 20, 30]), &mut ctx)
            .unwrap();
        assert_eq!(
            out,
            ResultSet::Values(vec![FieldValue::Integer(20), FieldValue::Integer(30)])
        );
    }

    #[test]
    fn test_limit_clips_to_bounds() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let out = LimitProcessor::process(&literal_limit(2, 10), values(&[10, 20, 30]), &mut ctx)
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_limit_from_bind_variable() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.set_variable("page", FieldValue::Integer(1));
        let limit = LimitClause {
            offset: Expr::BindVariable {
                var: BindVarRef::Named("page".to_string()),
                path: Vec::new(),
            },
            count: Expr::Literal(LiteralValue::Integer(1)),
        };
        let out = LimitProcessor::process(&limit, values(&[10, 20, 30]), &mut ctx).unwrap();
        assert_eq!(out, ResultSet::Values(vec![FieldValue::Integer(20)]));
    }

    #[test]
    fn test_negative_limit_is_type_error() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let result = LimitProcessor::process(&literal_limit(-1, 2), values(&[10]), &mut ctx);
        assert!(matches!(result, Err(SqlError::TypeError { .. })));
    }
}
