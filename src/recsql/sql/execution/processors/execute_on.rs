//! EXECUTE ON aggregate-scope stage.
//!
//! Runs the aliased expressions registered for one scope label against a
//! record set: each expression is evaluated once with no current record and
//! the in-scope list bound to the given set, then stored under its alias in
//! the saved values. This is the whole aggregate story: no dedicated
//! aggregate-function machinery, just expressions evaluated once per scope
//! and remembered by name.

use crate::recsql::sql::ast::{AliasedExpression, ExecuteOnScope};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::results::QueryResults;
use crate::recsql::sql::execution::types::Record;
use crate::recsql::sql::execution::utils::StageTimer;
use std::collections::HashMap;
use std::rc::Rc;

/// Expressions registered per scope label
pub type ExecuteOnMap = HashMap<ExecuteOnScope, Vec<AliasedExpression>>;

/// Processor for EXECUTE ON stages
pub struct ExecuteOnProcessor;

impl ExecuteOnProcessor {
    /// Run the expressions registered for `scope` against `records`. No-op
    /// when nothing is registered for the label.
    pub fn process(
        execute_on: &ExecuteOnMap,
        scope: ExecuteOnScope,
        records: &[Rc<Record>],
        ctx: &mut ExecutionContext,
        results: &mut QueryResults,
    ) -> SqlResult<()> {
        let Some(expressions) = execute_on.get(&scope) else {
            return Ok(());
        };
        if expressions.is_empty() {
            return Ok(());
        }

        let timer = StageTimer::start(format!(
            "Total time to execute {} expression(s) on {} records",
            expressions.len(),
            scope.label()
        ));

        ctx.all_records = records.to_vec();
        ctx.clear_current();

        for aliased in expressions {
            let value = ExpressionEvaluator::value(&aliased.expr, ctx).map_err(|e| {
                SqlError::execution_error_with_cause(
                    format!("unable to execute expression on {} records", scope.label()),
                    e,
                )
            })?;
            if let Some(alias) = &aliased.alias {
                ctx.set_save_value(alias, value);
            }
        }

        timer.stop(results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recsql::sql::ast::Expr;
    use crate::recsql::sql::execution::types::FieldValue;

    fn record(time: i64) -> Rc<Record> {
        let mut fields = HashMap::new();
        fields.insert("time".to_string(), FieldValue::Integer(time));
        Rc::new(Record::new(fields))
    }

    fn sum_as(alias: &str) -> Vec<AliasedExpression> {
        vec![AliasedExpression {
            expr: Expr::Function {
                name: "sum".to_string(),
                args: vec![Expr::FieldAccess(vec!["time".to_string()])],
            },
            alias: Some(alias.to_string()),
        }]
    }

    #[test]
    fn test_aliased_result_lands_in_save_values() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let mut results = QueryResults::new();
        let mut map = ExecuteOnMap::new();
        map.insert(ExecuteOnScope::All, sum_as("total"));

        let records = vec![record(8), record(5), record(2)];
        ExecuteOnProcessor::process(&map, ExecuteOnScope::All, &records, &mut ctx, &mut results)
            .unwrap();

        assert_eq!(ctx.get_save_value("total"), Some(FieldValue::Integer(15)));
        // Alias lookup is case-insensitive.
        assert_eq!(ctx.get_save_value("TOTAL"), Some(FieldValue::Integer(15)));
    }

    #[test]
    fn test_unregistered_scope_is_a_no_op() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let mut results = QueryResults::new();
        let map = ExecuteOnMap::new();

        ExecuteOnProcessor::process(
            &map,
            ExecuteOnScope::Results,
            &[record(1)],
            &mut ctx,
            &mut results,
        )
        .unwrap();
        assert!(results.timings().is_empty());
    }
}
