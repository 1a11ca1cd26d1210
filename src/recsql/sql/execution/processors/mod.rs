//! Processors for query execution
//!
//! This module contains one specialized processor per pipeline stage:
//! - WHERE filtering
//! - EXECUTE ON aggregate scoping (ALL / RESULTS / GROUP_BY_RESULTS)
//! - GROUP BY partitioning and per-group post-processing
//! - HAVING group filtering
//! - ORDER BY sorting (with deferred-error comparators)
//! - LIMIT pagination
//! - SELECT projection

pub mod execute_on;
pub mod group;
pub mod having;
pub mod limit;
pub mod order;
pub mod select;
pub mod where_clause;

pub use execute_on::{ExecuteOnMap, ExecuteOnProcessor};
pub use group::{GroupByProcessor, Grouper};
pub use having::HavingProcessor;
pub use limit::LimitProcessor;
pub use order::{GroupKeyComparator, OrderProcessor, RecordComparator};
pub use select::{ColumnExtractor, SelectProcessor};
pub use where_clause::WhereProcessor;

use crate::recsql::sql::ast::ExecuteOnScope;
use crate::recsql::sql::error::SqlResult;
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::results::QueryResults;
use crate::recsql::sql::execution::types::Record;
use crate::recsql::sql::execution::utils::StageTimer;
use crate::recsql::sql::query::Query;
use std::rc::Rc;

/// Drives the ordered stage sequence over a shared context and sink.
pub struct QueryExecutor;

impl QueryExecutor {
    /// Run the pipeline appropriate to the query shape and return the filled
    /// sink.
    ///
    /// Stage order: EXECUTE ON ALL, WHERE, EXECUTE ON RESULTS, then either
    /// the grouped branch (GROUP BY, HAVING) or the ungrouped branch
    /// (ORDER BY, LIMIT, SELECT). Each stage reassigns the context's in-scope
    /// record list so later aggregates see the narrowed set.
    pub fn execute(
        query: &Query,
        records: Vec<Rc<Record>>,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<QueryResults> {
        let mut results = QueryResults::new();
        let timer = StageTimer::start("Query executed in");

        ctx.all_records = records.clone();

        ExecuteOnProcessor::process(
            query.execute_on(),
            ExecuteOnScope::All,
            &records,
            ctx,
            &mut results,
        )?;

        WhereProcessor::process(query.where_clause(), ctx, &mut results)?;

        let filtered = results.where_results().to_vec();
        ExecuteOnProcessor::process(
            query.execute_on(),
            ExecuteOnScope::Results,
            &filtered,
            ctx,
            &mut results,
        )?;

        if query.has_group_by() {
            GroupByProcessor::process(query, ctx, &mut results)?;
            HavingProcessor::process(query, ctx, &mut results)?;
        } else {
            let working = results.take_results();
            let ordered = OrderProcessor::process(working, query.order_comparator(), ctx)?;

            let limited = match query.limit() {
                Some(limit) => {
                    let limit_timer = StageTimer::start("Total time to limit results size");
                    let limited = LimitProcessor::process(limit, ordered, ctx)?;
                    limit_timer.stop(&mut results);
                    limited
                }
                None => ordered,
            };

            let select_timer = StageTimer::start("Collection of results took");
            let selected = SelectProcessor::process(query.select(), limited, ctx)?;
            select_timer.stop(&mut results);

            results.set_results(selected);
        }

        results.set_save_values(ctx.take_save_values());
        let group_save_values = ctx.take_group_save_values();
        if !group_save_values.is_empty() {
            results.set_group_by_save_values(group_save_values);
        }

        timer.stop(&mut results);
        Ok(results)
    }
}
