//! WHERE filtering stage.

use crate::recsql::sql::ast::Expr;
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::results::{QueryResults, ResultSet};
use crate::recsql::sql::execution::utils::StageTimer;
use std::rc::Rc;

/// Processor for the WHERE stage
pub struct WhereProcessor;

impl WhereProcessor {
    /// Filter the in-scope records by the predicate, in original order. The
    /// surviving list becomes the sink's where-results and the new working
    /// set, and the context's in-scope list is narrowed to it. An absent
    /// predicate passes the list through unmodified. Any evaluation failure
    /// aborts the whole stage; there is no partial output.
    pub fn process(
        where_clause: Option<&Expr>,
        ctx: &mut ExecutionContext,
        results: &mut QueryResults,
    ) -> SqlResult<()> {
        let timer = StageTimer::start("Total time to execute Where clause on all records");

        let records = std::mem::take(&mut ctx.all_records);
        let retained = match where_clause {
            Some(predicate) => {
                let mut retained = Vec::with_capacity(records.len() / 2);
                for (index, record) in records.iter().enumerate() {
                    ctx.set_current_record(Rc::clone(record));
                    let keep = ExpressionEvaluator::is_true(predicate, ctx).map_err(|e| {
                        SqlError::execution_error_with_cause(
                            format!(
                                "unable to evaluate WHERE clause for record {} ({})",
                                index,
                                record.as_value()
                            ),
                            e,
                        )
                    })?;
                    if keep {
                        retained.push(Rc::clone(record));
                    }
                }
                retained
            }
            // No limiting where clause so what's passed in is what comes out.
            None => records,
        };

        log::debug!("where clause retained {} record(s)", retained.len());

        results.set_where_results(retained.clone());
        results.set_results(ResultSet::Records(retained.clone()));
        ctx.all_records = retained;

        timer.stop(results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recsql::sql::ast::{BinaryOperator, LiteralValue};
    use crate::recsql::sql::execution::types::{FieldValue, Record};
    use std::collections::HashMap;

    fn record(value: i64) -> Rc<Record> {
        let mut fields = HashMap::new();
        fields.insert("value".to_string(), FieldValue::Integer(value));
        Rc::new(Record::new(fields))
    }

    fn greater_than(limit: i64) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::FieldAccess(vec!["value".to_string()])),
            op: BinaryOperator::GreaterThan,
            right: Box::new(Expr::Literal(LiteralValue::Integer(limit))),
        }
    }

    #[test]
    fn test_filters_and_preserves_order() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = vec![record(1), record(5), record(3), record(7)];
        let mut results = QueryResults::new();

        WhereProcessor::process(Some(&greater_than(2)), &mut ctx, &mut results).unwrap();

        let values: Vec<i64> = results
            .where_results()
            .iter()
            .map(|r| match r.get("value") {
                Some(FieldValue::Integer(i)) => *i,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![5, 3, 7]);
        assert_eq!(ctx.all_records.len(), 3);
    }

    #[test]
    fn test_absent_predicate_passes_everything_through() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = vec![record(1), record(2)];
        let mut results = QueryResults::new();

        WhereProcessor::process(None, &mut ctx, &mut results).unwrap();
        assert_eq!(results.where_results().len(), 2);
    }

    #[test]
    fn test_evaluation_failure_aborts_stage() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = vec![record(1)];
        let mut results = QueryResults::new();

        // Comparing an integer field to a string forces a type error.
        let predicate = Expr::BinaryOp {
            left: Box::new(Expr::FieldAccess(vec!["value".to_string()])),
            op: BinaryOperator::GreaterThan,
            right: Box::new(Expr::Literal(LiteralValue::String("x".to_string()))),
        };
        let result = WhereProcessor::process(Some(&predicate), &mut ctx, &mut results);
        assert!(result.is_err());
    }
}
