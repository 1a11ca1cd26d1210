//! GROUP BY stage: the grouping algorithm and per-group post-processing.

use crate::recsql::sql::ast::{Expr, ExecuteOnScope};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::processors::execute_on::ExecuteOnProcessor;
use crate::recsql::sql::execution::processors::limit::LimitProcessor;
use crate::recsql::sql::execution::processors::order::OrderProcessor;
use crate::recsql::sql::execution::processors::select::{ColumnExtractor, SelectProcessor};
use crate::recsql::sql::execution::results::{GroupKey, QueryResults, ResultSet};
use crate::recsql::sql::execution::types::{FieldValue, Record};
use crate::recsql::sql::execution::utils::StageTimer;
use crate::recsql::sql::query::Query;
use std::rc::Rc;

/// Partitions records into groups keyed by the tuple of GROUP BY expression
/// values, preserving first-seen group order.
pub struct Grouper;

impl Grouper {
    /// Group `records` by the key tuples produced by `exprs`.
    ///
    /// For each record every expression is evaluated in order; a NULL
    /// component is dropped from the candidate tuple, and a record whose
    /// components are all NULL joins no group at all. Candidate tuples are
    /// matched against the seen tuples by structural equality via linear
    /// scan; key components are arbitrary values with no hash contract, and
    /// group cardinality is expected to stay far below record count.
    pub fn group(
        exprs: &[Expr],
        records: &[Rc<Record>],
        ctx: &mut ExecutionContext,
    ) -> SqlResult<Vec<(GroupKey, Vec<Rc<Record>>)>> {
        let mut groups: Vec<(GroupKey, Vec<Rc<Record>>)> = Vec::new();

        for record in records {
            ctx.set_current_record(Rc::clone(record));

            let mut key = Vec::with_capacity(exprs.len());
            for expr in exprs {
                let value = ExpressionEvaluator::value(expr, ctx).map_err(|e| {
                    SqlError::execution_error_with_cause(
                        format!(
                            "unable to get group by value for record ({})",
                            record.as_value()
                        ),
                        e,
                    )
                })?;
                if value != FieldValue::Null {
                    key.push(value);
                }
            }

            // A fully-absent key means the record joins no group.
            if key.is_empty() {
                continue;
            }

            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(Rc::clone(record)),
                None => groups.push((key, vec![Rc::clone(record)])),
            }
        }

        Ok(groups)
    }
}

/// Processor for the full grouped branch of the pipeline
pub struct GroupByProcessor;

impl GroupByProcessor {
    /// Group the working records, then per group in first-seen order: run
    /// GROUP_BY_RESULTS expressions against the members, snapshot the saved
    /// values, sort members with the row comparator, and project them through
    /// the SELECT columns (or dedup whole records). Afterwards the group-key
    /// list is ordered by the GROUP ORDER BY comparator, restricted by the
    /// group limit, and each surviving group's members are restricted by the
    /// row limit.
    pub fn process(
        query: &Query,
        ctx: &mut ExecutionContext,
        results: &mut QueryResults,
    ) -> SqlResult<()> {
        let timer = StageTimer::start("Group column collection and sort took");

        let working = results.take_results();
        let ResultSet::Records(records) = working else {
            return Err(SqlError::execution_error(
                "group by stage expected a record sequence",
            ));
        };

        let groups = Grouper::group(query.group_exprs(), &records, ctx)?;
        log::debug!(
            "grouped {} record(s) into {} group(s)",
            records.len(),
            groups.len()
        );

        let orig_save_values = ctx.save_values_snapshot();
        let select = query.select();
        let mut grouped: Vec<(GroupKey, ResultSet)> = Vec::with_capacity(groups.len());

        for (key, mut members) in groups {
            ctx.all_records = members.clone();
            ctx.current_group = Some(key.clone());

            // Each group computes into a fresh store seeded with the
            // pre-grouping values, then the store is snapshotted for the
            // group.
            ctx.replace_save_values(orig_save_values.clone());
            ExecuteOnProcessor::process(
                query.execute_on(),
                ExecuteOnScope::GroupByResults,
                &members,
                ctx,
                results,
            )?;
            let snapshot = ctx.save_values_snapshot();
            ctx.push_group_save_values(key.clone(), snapshot);

            if let Some(comparator) = query.order_comparator() {
                OrderProcessor::sort_group_members(&mut members, comparator, ctx)?;
            }

            let member_set = if !select.wants_records() {
                ColumnExtractor::extract(select.columns(), &members, select.distinct, ctx)?
            } else if select.distinct {
                ResultSet::Records(SelectProcessor::unique_records(members))
            } else {
                ResultSet::Records(members)
            };

            grouped.push((key, member_set));
        }

        ctx.replace_save_values(orig_save_values.clone());
        ctx.current_group = None;
        ctx.clear_current();

        timer.stop(results);
        let timer = StageTimer::start("Group operation took");

        let mut keys: Vec<GroupKey> = grouped.iter().map(|(k, _)| k.clone()).collect();

        // Order the group keys, if requested.
        if let Some(comparator) = query.group_order_comparator() {
            keys.sort_by(|a, b| comparator.compare(a, b, ctx));
            ctx.clear_current();
            if let Some(error) = comparator.take_error() {
                return Err(SqlError::execution_error_with_cause(
                    "unable to order group bys; the current item here is the group-key tuple, \
                     not a record, use get(:_grpby, n) to access tuple values",
                    error,
                ));
            }
            grouped = Self::reorder_by_keys(grouped, &keys);
        }

        // Limit the number of groups, if requested.
        if let Some(group_limit) = query.group_limit() {
            let limit_timer = StageTimer::start("Total time to limit group by results size");
            let kept = LimitProcessor::process(
                group_limit,
                ResultSet::Rows(keys.clone()),
                ctx,
            )?;
            if let ResultSet::Rows(kept_keys) = kept {
                grouped.retain(|(k, _)| kept_keys.contains(k));
                keys = kept_keys;
            }
            limit_timer.stop(results);
        }

        // Finally limit each surviving group's members independently; done
        // last so the group limit sees the full group sizes.
        if let Some(limit) = query.limit() {
            for (key, member_set) in grouped.iter_mut() {
                ctx.current_group = Some(key.clone());
                let group_snapshot = ctx
                    .group_save_values_snapshot(key)
                    .unwrap_or_else(|| orig_save_values.clone());
                ctx.replace_save_values(group_snapshot);
                if let ResultSet::Records(members) = member_set {
                    ctx.all_records = members.clone();
                }
                let taken = std::mem::take(member_set);
                *member_set = LimitProcessor::process(limit, taken, ctx)?;
            }
            ctx.replace_save_values(orig_save_values);
            ctx.current_group = None;
        }

        results.set_group_by_results(grouped);
        results.set_results(ResultSet::Rows(keys));

        timer.stop(results);
        Ok(())
    }

    /// Rebuild the grouping map in the order of the sorted key list.
    fn reorder_by_keys(
        mut grouped: Vec<(GroupKey, ResultSet)>,
        keys: &[GroupKey],
    ) -> Vec<(GroupKey, ResultSet)> {
        let mut ordered = Vec::with_capacity(grouped.len());
        for key in keys {
            if let Some(pos) = grouped.iter().position(|(k, _)| k == key) {
                ordered.push(grouped.remove(pos));
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(worker: &str, time: i64) -> Rc<Record> {
        let mut fields = HashMap::new();
        fields.insert(
            "worker".to_string(),
            FieldValue::String(worker.to_string()),
        );
        fields.insert("time".to_string(), FieldValue::Integer(time));
        Rc::new(Record::new(fields))
    }

    fn record_without_worker(time: i64) -> Rc<Record> {
        let mut fields = HashMap::new();
        fields.insert("time".to_string(), FieldValue::Integer(time));
        Rc::new(Record::new(fields))
    }

    fn worker_expr() -> Vec<Expr> {
        vec![Expr::FieldAccess(vec!["worker".to_string()])]
    }

    #[test]
    fn test_groups_preserve_first_seen_order() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![record("jay", 8), record("sam", 5), record("jay", 2)];
        let groups = Grouper::group(&worker_expr(), &records, &mut ctx).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].0,
            vec![FieldValue::String("jay".to_string())]
        );
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(
            groups[1].0,
            vec![FieldValue::String("sam".to_string())]
        );
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn test_grouping_partitions_without_loss() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![
            record("a", 1),
            record("b", 2),
            record("a", 3),
            record("c", 4),
        ];
        let groups = Grouper::group(&worker_expr(), &records, &mut ctx).unwrap();
        let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn test_fully_absent_key_drops_record_silently() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![record("jay", 1), record_without_worker(2)];
        let groups = Grouper::group(&worker_expr(), &records, &mut ctx).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 1);
    }

    #[test]
    fn test_partially_absent_key_keeps_present_components() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let exprs = vec![
            Expr::FieldAccess(vec!["worker".to_string()]),
            Expr::FieldAccess(vec!["missing".to_string()]),
        ];
        let records = vec![record("jay", 1)];
        let groups = Grouper::group(&exprs, &records, &mut ctx).unwrap();
        assert_eq!(groups.len(), 1);
        // The NULL component is dropped, leaving a one-element tuple.
        assert_eq!(groups[0].0.len(), 1);
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![record("a", 1), record("b", 2), record("a", 3)];
        let first = Grouper::group(&worker_expr(), &records, &mut ctx).unwrap();
        let second = Grouper::group(&worker_expr(), &records, &mut ctx).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1.len(), b.1.len());
        }
    }
}
