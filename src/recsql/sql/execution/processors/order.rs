//! ORDER BY and GROUP ORDER BY comparators plus the ungrouped sorting stage.
//!
//! Both comparators carry a deferred-error slot: a sort callback cannot
//! propagate an evaluation failure, so the first error is recorded internally
//! and every later comparison returns `Ordering::Equal`. The owning stage
//! checks the slot immediately after the sort returns and re-raises the error
//! as its own fatal result. The slot is cleared unconditionally so a
//! comparator instance can be reused by a later sort.

use crate::recsql::sql::ast::{
    ColumnRef, Expr, OrderByExpr, OrderDirection, SelectClause,
};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::results::{GroupKey, ResultSet};
use crate::recsql::sql::execution::types::{FieldValue, Record};
use crate::recsql::sql::execution::utils::FieldValueComparator;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// One resolved sort key
#[derive(Debug, Clone)]
struct SortItem {
    expr: Expr,
    direction: OrderDirection,
}

/// Orders records by a prioritized list of expressions.
///
/// Built once at init time: positional keys resolve to the SELECT column's
/// expression, keys matching a SELECT alias resolve the same way, and keys
/// with a fixed result are dropped since they cannot influence the order.
#[derive(Debug, Clone, Default)]
pub struct RecordComparator {
    items: Vec<SortItem>,
    error: RefCell<Option<SqlError>>,
}

impl RecordComparator {
    /// Resolve ORDER BY keys against the SELECT clause. Returns `None` when
    /// there is nothing to sort by.
    pub fn build(
        order_by: Option<&[OrderByExpr]>,
        select: &SelectClause,
    ) -> SqlResult<Option<RecordComparator>> {
        let Some(order_by) = order_by else {
            return Ok(None);
        };

        let cols = select.columns();
        let mut items = Vec::with_capacity(order_by.len());

        for ob in order_by {
            let expr = match &ob.key {
                ColumnRef::Position(ci) => {
                    if *ci == 0 {
                        return Err(SqlError::parse_error(
                            "order by column indices should start at 1",
                            None,
                        ));
                    }
                    if select.wants_records() {
                        return Err(SqlError::parse_error(
                            "cannot sort on a select column index when the records are to be returned",
                            None,
                        ));
                    }
                    if *ci > cols.len() {
                        return Err(SqlError::parse_error(
                            format!(
                                "invalid order by column index: {}, only {} columns are selected",
                                ci,
                                cols.len()
                            ),
                            None,
                        ));
                    }
                    cols[*ci - 1].expr.clone()
                }
                ColumnRef::Expr(e) => {
                    // A bare name matching a SELECT alias orders by that column
                    let aliased = match e {
                        Expr::FieldAccess(path) if path.len() == 1 => cols
                            .iter()
                            .find(|c| c.alias.as_deref() == Some(path[0].as_str()))
                            .map(|c| c.expr.clone()),
                        _ => None,
                    };
                    let e = aliased.unwrap_or_else(|| e.clone());
                    ExpressionEvaluator::init(&e)?;
                    e
                }
            };

            // A fixed result cannot affect ordering
            if !ExpressionEvaluator::has_fixed_result(&expr) {
                items.push(SortItem {
                    expr,
                    direction: ob.direction,
                });
            }
        }

        Ok(Some(RecordComparator {
            items,
            error: RefCell::new(None),
        }))
    }

    /// Compare two records. Sets the context's current record to each side so
    /// sort-key expressions see the right record. Once an error has been
    /// recorded every comparison degrades to `Equal`.
    pub fn compare(
        &self,
        left: &Rc<Record>,
        right: &Rc<Record>,
        ctx: &mut ExecutionContext,
    ) -> Ordering {
        if self.error.borrow().is_some() {
            return Ordering::Equal;
        }

        for item in &self.items {
            let result = (|| -> SqlResult<Ordering> {
                ctx.set_current_record(Rc::clone(left));
                let lv = ExpressionEvaluator::value(&item.expr, ctx)?;
                ctx.set_current_record(Rc::clone(right));
                let rv = ExpressionEvaluator::value(&item.expr, ctx)?;
                FieldValueComparator::compare_values(&lv, &rv)
            })();

            match result {
                Ok(Ordering::Equal) => continue,
                Ok(ordering) => {
                    return match item.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    }
                }
                Err(e) => {
                    *self.error.borrow_mut() = Some(e);
                    return Ordering::Equal;
                }
            }
        }

        Ordering::Equal
    }

    /// Take the deferred error, leaving the slot cleared for the next sort.
    pub fn take_error(&self) -> Option<SqlError> {
        self.error.borrow_mut().take()
    }
}

/// One resolved GROUP ORDER BY key: a position into the group-key tuple, or
/// an expression evaluated with the tuple as the current item.
#[derive(Debug, Clone)]
enum GroupSortKey {
    Position(usize),
    Expr(Expr),
}

/// Orders group-key tuples for GROUP ORDER BY.
#[derive(Debug, Clone, Default)]
pub struct GroupKeyComparator {
    items: Vec<(GroupSortKey, OrderDirection)>,
    error: RefCell<Option<SqlError>>,
}

impl GroupKeyComparator {
    /// Resolve GROUP ORDER BY keys. A key must be a 1-based tuple position,
    /// an expression structurally equal to one of the GROUP BY expressions
    /// (resolved to its position), or a free function / bind-variable /
    /// saved-value expression; anything else is a parse-time error.
    pub fn build(
        group_order_by: Option<&[OrderByExpr]>,
        group_exprs: &[Expr],
    ) -> SqlResult<Option<GroupKeyComparator>> {
        let Some(group_order_by) = group_order_by else {
            return Ok(None);
        };

        let mut items = Vec::with_capacity(group_order_by.len());

        for ob in group_order_by {
            let key = match &ob.key {
                ColumnRef::Position(ci) => {
                    if *ci == 0 {
                        return Err(SqlError::parse_error(
                            "group order by column indices should start at 1",
                            None,
                        ));
                    }
                    if *ci > group_exprs.len() {
                        return Err(SqlError::parse_error(
                            format!(
                                "invalid group order by column index: {}, only {} group by columns are present",
                                ci,
                                group_exprs.len()
                            ),
                            None,
                        ));
                    }
                    GroupSortKey::Position(*ci - 1)
                }
                ColumnRef::Expr(e) => {
                    if let Some(pos) = group_exprs.iter().position(|g| g == e) {
                        GroupSortKey::Position(pos)
                    } else if matches!(
                        e,
                        Expr::Function { .. } | Expr::BindVariable { .. } | Expr::SavedValue { .. }
                    ) {
                        ExpressionEvaluator::init(e)?;
                        GroupSortKey::Expr(e.clone())
                    } else {
                        return Err(SqlError::parse_error(
                            "a group order by key must be a group by column, a function, a bind variable or a saved value",
                            None,
                        ));
                    }
                }
            };
            items.push((key, ob.direction));
        }

        Ok(Some(GroupKeyComparator {
            items,
            error: RefCell::new(None),
        }))
    }

    /// Compare two group-key tuples. Expression keys see the tuple as the
    /// current item, which is how saved-value references resolve to the
    /// per-group snapshots.
    pub fn compare(&self, left: &GroupKey, right: &GroupKey, ctx: &mut ExecutionContext) -> Ordering {
        if self.error.borrow().is_some() {
            return Ordering::Equal;
        }

        for (key, direction) in &self.items {
            let result = (|| -> SqlResult<Ordering> {
                let (lv, rv) = match key {
                    GroupSortKey::Position(i) => (
                        left.get(*i).cloned().unwrap_or(FieldValue::Null),
                        right.get(*i).cloned().unwrap_or(FieldValue::Null),
                    ),
                    GroupSortKey::Expr(expr) => {
                        ctx.set_current_group(left.clone());
                        let lv = ExpressionEvaluator::value(expr, ctx)?;
                        ctx.set_current_group(right.clone());
                        let rv = ExpressionEvaluator::value(expr, ctx)?;
                        (lv, rv)
                    }
                };
                FieldValueComparator::compare_values(&lv, &rv)
            })();

            match result {
                Ok(Ordering::Equal) => continue,
                Ok(ordering) => {
                    return match direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    }
                }
                Err(e) => {
                    *self.error.borrow_mut() = Some(e);
                    return Ordering::Equal;
                }
            }
        }

        Ordering::Equal
    }

    /// Take the deferred error, leaving the slot cleared for the next sort.
    pub fn take_error(&self) -> Option<SqlError> {
        self.error.borrow_mut().take()
    }
}

/// Processor for the ungrouped ORDER BY stage
pub struct OrderProcessor;

impl OrderProcessor {
    /// Stable-sort the working records when there is more than one and a
    /// comparator exists. Re-raises any deferred comparator error after the
    /// sort completes; the comparator's slot is cleared either way.
    pub fn process(
        results: ResultSet,
        comparator: Option<&RecordComparator>,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<ResultSet> {
        let Some(comparator) = comparator else {
            return Ok(results);
        };

        let results = match results {
            ResultSet::Records(mut records) => {
                if records.len() > 1 {
                    records.sort_by(|a, b| comparator.compare(a, b, ctx));
                }
                ResultSet::Records(records)
            }
            other => other,
        };

        if let Some(error) = comparator.take_error() {
            return Err(SqlError::execution_error_with_cause(
                "unable to order results",
                error,
            ));
        }

        Ok(results)
    }

    /// Sort one group's member records with the row-level comparator, with
    /// the same deferred-error discipline as the top-level stage.
    pub fn sort_group_members(
        members: &mut Vec<Rc<Record>>,
        comparator: &RecordComparator,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<()> {
        if members.len() > 1 {
            members.sort_by(|a, b| comparator.compare(a, b, ctx));
        }
        if let Some(error) = comparator.take_error() {
            return Err(SqlError::execution_error_with_cause(
                "unable to order group by results",
                error,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recsql::sql::ast::{LiteralValue, SelectItems};
    use std::collections::HashMap;

    fn record(name: &str, value: i64) -> Rc<Record> {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), FieldValue::String(name.to_string()));
        fields.insert("value".to_string(), FieldValue::Integer(value));
        Rc::new(Record::new(fields))
    }

    fn order_by(field: &str, direction: OrderDirection) -> Vec<OrderByExpr> {
        vec![OrderByExpr {
            key: ColumnRef::Expr(Expr::FieldAccess(vec![field.to_string()])),
            direction,
        }]
    }

    fn wildcard_select() -> SelectClause {
        SelectClause {
            distinct: false,
            items: SelectItems::Wildcard,
        }
    }

    fn sorted_values(results: &ResultSet) -> Vec<i64> {
        match results {
            ResultSet::Records(records) => records
                .iter()
                .map(|r| match r.get("value") {
                    Some(FieldValue::Integer(i)) => *i,
                    other => panic!("unexpected value {:?}", other),
                })
                .collect(),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_sort_ascending_and_descending() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![record("a", 8), record("b", 5), record("a", 2)];

        let cmp = RecordComparator::build(
            Some(&order_by("value", OrderDirection::Asc)),
            &wildcard_select(),
        )
        .unwrap()
        .unwrap();
        let sorted = OrderProcessor::process(
            ResultSet::Records(records.clone()),
            Some(&cmp),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(sorted_values(&sorted), vec![2, 5, 8]);

        let cmp = RecordComparator::build(
            Some(&order_by("value", OrderDirection::Desc)),
            &wildcard_select(),
        )
        .unwrap()
        .unwrap();
        let sorted =
            OrderProcessor::process(ResultSet::Records(records), Some(&cmp), &mut ctx).unwrap();
        assert_eq!(sorted_values(&sorted), vec![8, 5, 2]);
    }

    #[test]
    fn test_tie_falls_through_to_next_key() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![record("b", 1), record("a", 1), record("a", 0)];

        let order = vec![
            OrderByExpr {
                key: ColumnRef::Expr(Expr::FieldAccess(vec!["value".to_string()])),
                direction: OrderDirection::Asc,
            },
            OrderByExpr {
                key: ColumnRef::Expr(Expr::FieldAccess(vec!["name".to_string()])),
                direction: OrderDirection::Asc,
            },
        ];
        let cmp = RecordComparator::build(Some(&order), &wildcard_select())
            .unwrap()
            .unwrap();
        let sorted =
            OrderProcessor::process(ResultSet::Records(records), Some(&cmp), &mut ctx).unwrap();
        match sorted {
            ResultSet::Records(records) => {
                assert_eq!(
                    records[0].get("value"),
                    Some(&FieldValue::Integer(0))
                );
                assert_eq!(
                    records[1].get("name"),
                    Some(&FieldValue::String("a".to_string()))
                );
                assert_eq!(
                    records[2].get("name"),
                    Some(&FieldValue::String("b".to_string()))
                );
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_deferred_error_surfaces_after_sort_and_clears() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        // One record holds a string where the others hold integers, so the
        // comparator hits an incomparable pair mid-sort.
        let mut fields = HashMap::new();
        fields.insert("value".to_string(), FieldValue::String("boom".to_string()));
        let bad = Rc::new(Record::new(fields));
        let records = vec![record("a", 3), bad, record("b", 1)];

        let cmp = RecordComparator::build(
            Some(&order_by("value", OrderDirection::Asc)),
            &wildcard_select(),
        )
        .unwrap()
        .unwrap();

        let result =
            OrderProcessor::process(ResultSet::Records(records), Some(&cmp), &mut ctx);
        assert!(result.is_err());
        // The slot must be cleared for the next use.
        assert!(cmp.take_error().is_none());
    }

    #[test]
    fn test_fixed_result_keys_are_dropped() {
        let order = vec![OrderByExpr {
            key: ColumnRef::Expr(Expr::Literal(LiteralValue::Integer(1))),
            direction: OrderDirection::Asc,
        }];
        let cmp = RecordComparator::build(Some(&order), &wildcard_select())
            .unwrap()
            .unwrap();
        assert!(cmp.items.is_empty());
    }

    #[test]
    fn test_position_out_of_range_is_parse_error() {
        let select = SelectClause {
            distinct: false,
            items: SelectItems::Columns(vec![crate::recsql::sql::ast::SelectColumn {
                expr: Expr::FieldAccess(vec!["name".to_string()]),
                alias: None,
                expand: false,
            }]),
        };
        let order = vec![OrderByExpr {
            key: ColumnRef::Position(2),
            direction: OrderDirection::Asc,
        }];
        assert!(matches!(
            RecordComparator::build(Some(&order), &select),
            Err(SqlError::ParseError { .. })
        ));
    }

    #[test]
    fn test_group_key_comparator_by_position() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let cmp = GroupKeyComparator::build(
            Some(&[OrderByExpr {
                key: ColumnRef::Position(1),
                direction: OrderDirection::Desc,
            }]),
            &[Expr::FieldAccess(vec!["name".to_string()])],
        )
        .unwrap()
        .unwrap();

        let a = vec![FieldValue::String("a".to_string())];
        let b = vec![FieldValue::String("b".to_string())];
        assert_eq!(cmp.compare(&a, &b, &mut ctx), Ordering::Greater);
        assert!(cmp.take_error().is_none());
    }

    #[test]
    fn test_group_key_comparator_rejects_free_field_access() {
        let result = GroupKeyComparator::build(
            Some(&[OrderByExpr {
                key: ColumnRef::Expr(Expr::FieldAccess(vec!["other".to_string()])),
                direction: OrderDirection::Asc,
            }]),
            &[Expr::FieldAccess(vec!["name".to_string()])],
        );
        assert!(matches!(result, Err(SqlError::ParseError { .. })));
    }
}
