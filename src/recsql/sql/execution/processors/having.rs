//! HAVING stage, grouped queries only.

use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::results::{QueryResults, ResultSet};
use crate::recsql::sql::execution::types::FieldValue;
use crate::recsql::sql::execution::utils::StageTimer;
use crate::recsql::sql::query::Query;

/// Processor for the HAVING stage
pub struct HavingProcessor;

impl HavingProcessor {
    /// Evaluate the predicate once per group-key tuple, never per member,
    /// with the tuple as the current item, so saved-value references resolve
    /// to that group's snapshot. Failing groups are removed from the grouping
    /// map and from the working key list; surviving groups keep every member.
    pub fn process(
        query: &Query,
        ctx: &mut ExecutionContext,
        results: &mut QueryResults,
    ) -> SqlResult<()> {
        let Some(having) = query.having() else {
            return Ok(());
        };

        let timer = StageTimer::start("Total time to execute Having clause");

        let Some(groups) = results.take_group_by_results() else {
            timer.stop(results);
            return Ok(());
        };

        let mut retained: Vec<(Vec<FieldValue>, ResultSet)> = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            ctx.set_current_group(key.clone());
            let keep = ExpressionEvaluator::is_true(having, ctx).map_err(|e| {
                SqlError::execution_error_with_cause(
                    format!(
                        "unable to evaluate HAVING clause for group ({})",
                        FieldValue::Array(key.clone())
                    ),
                    e,
                )
            })?;
            if keep {
                retained.push((key, members));
            }
        }
        ctx.current_group = None;
        ctx.clear_current();

        log::debug!("having clause retained {} group(s)", retained.len());

        let keys = retained.iter().map(|(k, _)| k.clone()).collect();
        results.set_group_by_results(retained);
        results.set_results(ResultSet::Rows(keys));

        timer.stop(results);
        Ok(())
    }
}
