//! Built-in function library.
//!
//! Aggregates here have no dedicated aggregate-function type system: an
//! aggregate is an ordinary expression whose argument is evaluated once per
//! record of the aggregation scope: the context's in-scope record list, or an
//! explicit collection passed as the first argument. That is what lets
//! `EXECUTE ON GROUP_BY_RESULTS sum(time) AS total` run each group's members
//! through `time` and remember the result under a name.

use crate::recsql::sql::ast::Expr;
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::evaluator::ExpressionEvaluator;
use crate::recsql::sql::execution::types::{FieldValue, Record};
use crate::recsql::sql::execution::utils::FieldValueComparator;
use std::cmp::Ordering;
use std::rc::Rc;

/// Dispatch table for built-in functions
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    /// Init-time validation: unknown names and impossible arities fail before
    /// execution.
    pub fn validate(name: &str, arg_count: usize) -> SqlResult<()> {
        let (min, max) = match name.to_lowercase().as_str() {
            "count" => (0, 1),
            "sum" | "avg" | "min" | "max" => (1, 2),
            "unique" | "size" | "upper" | "lower" | "length" | "trim" | "abs" | "round"
            | "floor" | "ceil" => (1, 1),
            "get" | "nullif" => (2, 2),
            "substr" => (2, 3),
            "concat" => (1, usize::MAX),
            "coalesce" => (1, usize::MAX),
            _ => {
                return Err(SqlError::parse_error(
                    format!("unknown function: {}", name),
                    None,
                ))
            }
        };
        if arg_count < min || arg_count > max {
            return Err(SqlError::parse_error(
                format!(
                    "function {} takes {} argument(s), got {}",
                    name,
                    if min == max {
                        min.to_string()
                    } else if max == usize::MAX {
                        format!("at least {}", min)
                    } else {
                        format!("{} to {}", min, max)
                    },
                    arg_count
                ),
                None,
            ));
        }
        Ok(())
    }

    /// Evaluate a function call against the context.
    pub fn call(name: &str, args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        match name.to_lowercase().as_str() {
            "count" => Self::count(args, ctx),
            "sum" => Self::fold_numeric(args, ctx, Self::sum_values),
            "avg" => Self::fold_numeric(args, ctx, Self::avg_values),
            "min" => Self::fold_numeric(args, ctx, |values| Self::extreme(values, Ordering::Less)),
            "max" => Self::fold_numeric(args, ctx, |values| Self::extreme(values, Ordering::Greater)),
            "unique" => Self::unique(args, ctx),
            "size" => Self::size(args, ctx),
            "get" => Self::get(args, ctx),
            "upper" => Self::string_fn(args, ctx, |s| s.to_uppercase()),
            "lower" => Self::string_fn(args, ctx, |s| s.to_lowercase()),
            "trim" => Self::string_fn(args, ctx, |s| s.trim().to_string()),
            "length" => Self::length(args, ctx),
            "concat" => Self::concat(args, ctx),
            "substr" => Self::substr(args, ctx),
            "coalesce" => Self::coalesce(args, ctx),
            "nullif" => Self::nullif(args, ctx),
            "abs" => Self::numeric_fn(args, ctx, "abs"),
            "round" => Self::numeric_fn(args, ctx, "round"),
            "floor" => Self::numeric_fn(args, ctx, "floor"),
            "ceil" => Self::numeric_fn(args, ctx, "ceil"),
            other => Err(SqlError::execution_error(format!(
                "unknown function: {}",
                other
            ))),
        }
    }

    /// Collect the non-null values an aggregate runs over.
    ///
    /// One argument: evaluate it once per record of the in-scope list. Two
    /// arguments: the first must yield a collection, and the second is
    /// evaluated once per collection item with that item as the current
    /// record. The previous current record is restored either way.
    fn aggregate_values(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<Vec<FieldValue>> {
        let prev = ctx.current.clone();
        let result = Self::aggregate_values_inner(args, ctx);
        ctx.current = prev;
        result
    }

    fn aggregate_values_inner(
        args: &[Expr],
        ctx: &mut ExecutionContext,
    ) -> SqlResult<Vec<FieldValue>> {
        let (records, value_expr): (Vec<Rc<Record>>, &Expr) = if args.len() == 2 {
            let collection = ExpressionEvaluator::value(&args[0], ctx)?;
            let FieldValue::Array(items) = collection else {
                return Err(SqlError::type_error(
                    "ARRAY",
                    collection.type_name(),
                    Some(collection.to_string()),
                ));
            };
            let records = items
                .into_iter()
                .map(|item| match item {
                    FieldValue::Struct(fields) | FieldValue::Map(fields) => {
                        Ok(Rc::new(Record::new(fields)))
                    }
                    other => Err(SqlError::type_error(
                        "STRUCT",
                        other.type_name(),
                        Some(other.to_string()),
                    )),
                })
                .collect::<SqlResult<Vec<_>>>()?;
            (records, &args[1])
        } else {
            (ctx.all_records.clone(), &args[0])
        };

        let mut values = Vec::with_capacity(records.len());
        for record in records {
            ctx.set_current_record(record);
            let value = ExpressionEvaluator::value(value_expr, ctx)?;
            if value != FieldValue::Null {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn fold_numeric(
        args: &[Expr],
        ctx: &mut ExecutionContext,
        fold: fn(Vec<FieldValue>) -> SqlResult<FieldValue>,
    ) -> SqlResult<FieldValue> {
        let values = Self::aggregate_values(args, ctx)?;
        fold(values)
    }

    /// Sum preserving integer-ness: an all-integer input sums to an integer,
    /// anything else promotes through the usual coercions. No values sums to
    /// NULL.
    fn sum_values(values: Vec<FieldValue>) -> SqlResult<FieldValue> {
        if values.is_empty() {
            return Ok(FieldValue::Null);
        }
        let mut acc = FieldValue::Integer(0);
        for value in &values {
            acc = acc.add(value)?;
        }
        Ok(acc)
    }

    fn avg_values(values: Vec<FieldValue>) -> SqlResult<FieldValue> {
        if values.is_empty() {
            return Ok(FieldValue::Null);
        }
        let count = values.len() as f64;
        let sum = Self::sum_values(values)?;
        match sum.as_f64() {
            Some(total) => Ok(FieldValue::Float(total / count)),
            None => Err(SqlError::type_error("numeric", sum.type_name(), None)),
        }
    }

    fn extreme(values: Vec<FieldValue>, keep: Ordering) -> SqlResult<FieldValue> {
        let mut result = FieldValue::Null;
        for value in values {
            if result == FieldValue::Null
                || FieldValueComparator::compare_values(&value, &result)? == keep
            {
                result = value;
            }
        }
        Ok(result)
    }

    fn count(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        if args.is_empty() {
            return Ok(FieldValue::Integer(ctx.all_records.len() as i64));
        }
        let values = Self::aggregate_values(args, ctx)?;
        Ok(FieldValue::Integer(values.len() as i64))
    }

    /// First-seen-order deduplication by structural equality.
    fn unique(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        let value = ExpressionEvaluator::value(&args[0], ctx)?;
        let FieldValue::Array(items) = value else {
            return Err(SqlError::type_error(
                "ARRAY",
                value.type_name(),
                Some(value.to_string()),
            ));
        };
        let mut seen: Vec<FieldValue> = Vec::with_capacity(items.len());
        for item in items {
            if !seen.contains(&item) {
                seen.push(item);
            }
        }
        Ok(FieldValue::Array(seen))
    }

    fn size(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        let value = ExpressionEvaluator::value(&args[0], ctx)?;
        let len = match &value {
            FieldValue::Null => return Ok(FieldValue::Null),
            FieldValue::Array(items) => items.len(),
            FieldValue::Map(map) | FieldValue::Struct(map) => map.len(),
            FieldValue::String(s) => s.chars().count(),
            other => {
                return Err(SqlError::type_error(
                    "ARRAY, MAP or STRING",
                    other.type_name(),
                    Some(other.to_string()),
                ))
            }
        };
        Ok(FieldValue::Integer(len as i64))
    }

    /// 1-based list element access; the documented way to read a group-key
    /// tuple component from group-level clauses: `get(:_grpby, 1)`.
    fn get(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        let list = ExpressionEvaluator::value(&args[0], ctx)?;
        let index = ExpressionEvaluator::value(&args[1], ctx)?;
        let FieldValue::Array(items) = list else {
            return Err(SqlError::type_error(
                "ARRAY",
                list.type_name(),
                Some(list.to_string()),
            ));
        };
        let Some(i) = index.as_index().filter(|i| *i >= 1) else {
            return Err(SqlError::type_error(
                "positive INTEGER index",
                index.type_name(),
                Some(index.to_string()),
            ));
        };
        Ok(items.get(i - 1).cloned().unwrap_or(FieldValue::Null))
    }

    fn string_fn(
        args: &[Expr],
        ctx: &mut ExecutionContext,
        f: fn(&str) -> String,
    ) -> SqlResult<FieldValue> {
        match ExpressionEvaluator::value(&args[0], ctx)? {
            FieldValue::Null => Ok(FieldValue::Null),
            FieldValue::String(s) => Ok(FieldValue::String(f(&s))),
            other => Err(SqlError::type_error(
                "STRING",
                other.type_name(),
                Some(other.to_string()),
            )),
        }
    }

    fn length(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        match ExpressionEvaluator::value(&args[0], ctx)? {
            FieldValue::Null => Ok(FieldValue::Null),
            FieldValue::String(s) => Ok(FieldValue::Integer(s.chars().count() as i64)),
            other => Err(SqlError::type_error(
                "STRING",
                other.type_name(),
                Some(other.to_string()),
            )),
        }
    }

    /// Concatenate display forms; any NULL argument makes the result NULL.
    fn concat(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        let mut out = String::new();
        for arg in args {
            match ExpressionEvaluator::value(arg, ctx)? {
                FieldValue::Null => return Ok(FieldValue::Null),
                value => out.push_str(&value.to_string()),
            }
        }
        Ok(FieldValue::String(out))
    }

    /// `substr(s, from[, len])` with a 1-based `from`.
    fn substr(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        let s = match ExpressionEvaluator::value(&args[0], ctx)? {
            FieldValue::Null => return Ok(FieldValue::Null),
            FieldValue::String(s) => s,
            other => {
                return Err(SqlError::type_error(
                    "STRING",
                    other.type_name(),
                    Some(other.to_string()),
                ))
            }
        };
        let from = ExpressionEvaluator::value(&args[1], ctx)?;
        let Some(from) = from.as_index().filter(|i| *i >= 1) else {
            return Err(SqlError::type_error(
                "positive INTEGER",
                from.type_name(),
                Some(from.to_string()),
            ));
        };
        let chars: Vec<char> = s.chars().collect();
        let start = (from - 1).min(chars.len());
        let end = if args.len() == 3 {
            let len = ExpressionEvaluator::value(&args[2], ctx)?;
            let Some(len) = len.as_index() else {
                return Err(SqlError::type_error(
                    "non-negative INTEGER",
                    len.type_name(),
                    Some(len.to_string()),
                ));
            };
            start.saturating_add(len).min(chars.len())
        } else {
            chars.len()
        };
        Ok(FieldValue::String(chars[start..end].iter().collect()))
    }

    fn coalesce(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        for arg in args {
            let value = ExpressionEvaluator::value(arg, ctx)?;
            if value != FieldValue::Null {
                return Ok(value);
            }
        }
        Ok(FieldValue::Null)
    }

    fn nullif(args: &[Expr], ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        let a = ExpressionEvaluator::value(&args[0], ctx)?;
        let b = ExpressionEvaluator::value(&args[1], ctx)?;
        if FieldValueComparator::values_equal(&a, &b) {
            Ok(FieldValue::Null)
        } else {
            Ok(a)
        }
    }

    fn numeric_fn(args: &[Expr], ctx: &mut ExecutionContext, op: &str) -> SqlResult<FieldValue> {
        let value = ExpressionEvaluator::value(&args[0], ctx)?;
        match value {
            FieldValue::Null => Ok(FieldValue::Null),
            FieldValue::Integer(i) => Ok(FieldValue::Integer(if op == "abs" { i.abs() } else { i })),
            FieldValue::Float(f) => Ok(match op {
                "abs" => FieldValue::Float(f.abs()),
                "round" => FieldValue::Float(f.round()),
                "floor" => FieldValue::Float(f.floor()),
                _ => FieldValue::Float(f.ceil()),
            }),
            FieldValue::Decimal(d) => Ok(match op {
                "abs" => FieldValue::Decimal(d.abs()),
                "round" => FieldValue::Decimal(d.round()),
                "floor" => FieldValue::Decimal(d.floor()),
                _ => FieldValue::Decimal(d.ceil()),
            }),
            other => Err(SqlError::type_error(
                "numeric",
                other.type_name(),
                Some(other.to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn work_records(times: &[i64]) -> Vec<Rc<Record>> {
        times
            .iter()
            .map(|t| {
                let mut fields = HashMap::new();
                fields.insert("time".to_string(), FieldValue::Integer(*t));
                Rc::new(Record::new(fields))
            })
            .collect()
    }

    fn field(name: &str) -> Expr {
        Expr::FieldAccess(vec![name.to_string()])
    }

    #[test]
    fn test_sum_over_scope_preserves_integers() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = work_records(&[8, 5, 2]);
        let result = BuiltinFunctions::call("sum", &[field("time")], &mut ctx).unwrap();
        assert_eq!(result, FieldValue::Integer(15));
    }

    #[test]
    fn test_sum_of_no_values_is_null() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let result = BuiltinFunctions::call("sum", &[field("time")], &mut ctx).unwrap();
        assert_eq!(result, FieldValue::Null);
    }

    #[test]
    fn test_avg_is_float() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = work_records(&[8, 5, 2]);
        let result = BuiltinFunctions::call("avg", &[field("time")], &mut ctx).unwrap();
        assert_eq!(result, FieldValue::Float(5.0));
    }

    #[test]
    fn test_min_max() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = work_records(&[8, 5, 2]);
        assert_eq!(
            BuiltinFunctions::call("min", &[field("time")], &mut ctx).unwrap(),
            FieldValue::Integer(2)
        );
        assert_eq!(
            BuiltinFunctions::call("max", &[field("time")], &mut ctx).unwrap(),
            FieldValue::Integer(8)
        );
    }

    #[test]
    fn test_count_bare_counts_scope() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = work_records(&[1, 2, 3, 4]);
        assert_eq!(
            BuiltinFunctions::call("count", &[], &mut ctx).unwrap(),
            FieldValue::Integer(4)
        );
    }

    #[test]
    fn test_aggregate_restores_current_record() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.all_records = work_records(&[1, 2]);
        let marker = {
            let mut fields = HashMap::new();
            fields.insert("time".to_string(), FieldValue::Integer(99));
            Rc::new(Record::new(fields))
        };
        ctx.set_current_record(Rc::clone(&marker));
        BuiltinFunctions::call("sum", &[field("time")], &mut ctx).unwrap();
        assert_eq!(
            ctx.current_record().map(|r| r.as_value()),
            Some(marker.as_value())
        );
    }

    #[test]
    fn test_unique_preserves_first_occurrence() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let list = Expr::List(vec![
            Expr::Literal(crate::recsql::sql::ast::LiteralValue::Integer(1)),
            Expr::Literal(crate::recsql::sql::ast::LiteralValue::Integer(1)),
            Expr::Literal(crate::recsql::sql::ast::LiteralValue::Integer(2)),
            Expr::Literal(crate::recsql::sql::ast::LiteralValue::Integer(1)),
        ]);
        let result = BuiltinFunctions::call("unique", &[list], &mut ctx).unwrap();
        assert_eq!(
            result,
            FieldValue::Array(vec![FieldValue::Integer(1), FieldValue::Integer(2)])
        );
    }

    #[test]
    fn test_get_is_one_based() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        ctx.set_variable(
            "key",
            FieldValue::Array(vec![
                FieldValue::String("a".to_string()),
                FieldValue::String("b".to_string()),
            ]),
        );
        let args = [
            Expr::BindVariable {
                var: crate::recsql::sql::ast::BindVarRef::Named("key".to_string()),
                path: Vec::new(),
            },
            Expr::Literal(crate::recsql::sql::ast::LiteralValue::Integer(2)),
        ];
        assert_eq!(
            BuiltinFunctions::call("get", &args, &mut ctx).unwrap(),
            FieldValue::String("b".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_unknown_function() {
        assert!(BuiltinFunctions::validate("frobnicate", 1).is_err());
        assert!(BuiltinFunctions::validate("sum", 1).is_ok());
        assert!(BuiltinFunctions::validate("sum", 3).is_err());
    }
}
