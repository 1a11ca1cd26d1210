//! Expression evaluator.
//!
//! Implements the evaluation contract for every expression variant. Values are
//! always read through the execution context: stage code sets the current
//! record before each evaluation, and any caller invoking an expression that
//! can move the current record (sub-queries can) restores it immediately
//! afterwards; evaluation is otherwise context-order-dependent.

use crate::recsql::sql::ast::{BinaryOperator, BindVarRef, Expr, LiteralValue, UnaryOperator};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::functions::BuiltinFunctions;
use crate::recsql::sql::execution::types::FieldValue;
use crate::recsql::sql::execution::utils::FieldValueComparator;
use regex::Regex;
use std::cmp::Ordering;

/// Main expression evaluator handling all expression variants
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    /// Validate an expression at init time: function names and arities must
    /// be known, and sub-expressions must validate recursively. Runs once per
    /// parse, never per record.
    pub fn init(expr: &Expr) -> SqlResult<()> {
        match expr {
            Expr::Literal(_)
            | Expr::FieldAccess(_)
            | Expr::BindVariable { .. }
            | Expr::SavedValue { .. } => Ok(()),
            Expr::Function { name, args } => {
                BuiltinFunctions::validate(name, args.len())?;
                for arg in args {
                    Self::init(arg)?;
                }
                Ok(())
            }
            Expr::BinaryOp { left, right, .. } => {
                Self::init(left)?;
                Self::init(right)
            }
            Expr::UnaryOp { expr, .. } => Self::init(expr),
            Expr::Between {
                expr, low, high, ..
            } => {
                Self::init(expr)?;
                Self::init(low)?;
                Self::init(high)
            }
            Expr::List(items) => {
                for item in items {
                    Self::init(item)?;
                }
                Ok(())
            }
            Expr::StructLiteral(fields) => {
                for (_, value) in fields {
                    Self::init(value)?;
                }
                Ok(())
            }
            // Nested queries validate themselves when parsed.
            Expr::Subquery(_) => Ok(()),
        }
    }

    /// Whether the expression's result is the same for every record, used to
    /// skip constant sort keys when building comparators.
    pub fn has_fixed_result(expr: &Expr) -> bool {
        match expr {
            Expr::Literal(_) => true,
            Expr::FieldAccess(_) | Expr::BindVariable { .. } | Expr::SavedValue { .. } => false,
            Expr::Function { .. } => false,
            Expr::BinaryOp { left, right, .. } => {
                Self::has_fixed_result(left) && Self::has_fixed_result(right)
            }
            Expr::UnaryOp { expr, .. } => Self::has_fixed_result(expr),
            Expr::Between {
                expr, low, high, ..
            } => {
                Self::has_fixed_result(expr)
                    && Self::has_fixed_result(low)
                    && Self::has_fixed_result(high)
            }
            Expr::List(items) => items.iter().all(Self::has_fixed_result),
            Expr::StructLiteral(fields) => {
                fields.iter().all(|(_, value)| Self::has_fixed_result(value))
            }
            Expr::Subquery(_) => false,
        }
    }

    /// Evaluate an expression to a value against the context's current record.
    pub fn value(expr: &Expr, ctx: &mut ExecutionContext) -> SqlResult<FieldValue> {
        match expr {
            Expr::Literal(literal) => Ok(Self::literal_value(literal)),
            Expr::FieldAccess(path) => Ok(Self::field_access(path, ctx)),
            Expr::BindVariable { var, path } => {
                let value = match var {
                    BindVarRef::Named(name) => ctx.get_variable(name),
                    BindVarRef::Indexed(index) => ctx.get_indexed_variable(*index),
                };
                Ok(Self::navigate(value, path))
            }
            Expr::SavedValue { name, path } => {
                let value = ctx.get_save_value(name).unwrap_or(FieldValue::Null);
                Ok(Self::navigate(value, path))
            }
            Expr::Function { name, args } => BuiltinFunctions::call(name, args, ctx),
            Expr::BinaryOp { left, op, right } => Self::binary_op(left, *op, right, ctx),
            Expr::UnaryOp { op, expr } => Self::unary_op(*op, expr, ctx),
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = Self::value(expr, ctx)?;
                let low = Self::value(low, ctx)?;
                let high = Self::value(high, ctx)?;
                if value == FieldValue::Null || low == FieldValue::Null || high == FieldValue::Null
                {
                    return Ok(FieldValue::Boolean(false));
                }
                let in_range = FieldValueComparator::compare_values(&value, &low)?
                    != Ordering::Less
                    && FieldValueComparator::compare_values(&value, &high)? != Ordering::Greater;
                Ok(FieldValue::Boolean(in_range != *negated))
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(Self::value(item, ctx)?);
                }
                Ok(FieldValue::Array(values))
            }
            Expr::StructLiteral(fields) => {
                let mut map = std::collections::HashMap::with_capacity(fields.len());
                for (name, value_expr) in fields {
                    map.insert(name.clone(), Self::value(value_expr, ctx)?);
                }
                Ok(FieldValue::Struct(map))
            }
            Expr::Subquery(query) => query.execute_as_subquery(ctx),
        }
    }

    /// Truth-test an expression against the context's current record.
    pub fn is_true(expr: &Expr, ctx: &mut ExecutionContext) -> SqlResult<bool> {
        Ok(Self::value(expr, ctx)?.is_truthy())
    }

    fn literal_value(literal: &LiteralValue) -> FieldValue {
        match literal {
            LiteralValue::String(s) => FieldValue::String(s.clone()),
            LiteralValue::Integer(i) => FieldValue::Integer(*i),
            LiteralValue::Float(f) => FieldValue::Float(*f),
            LiteralValue::Boolean(b) => FieldValue::Boolean(*b),
            LiteralValue::Null => FieldValue::Null,
        }
    }

    /// Resolve a dotted field path against the current record. A missing
    /// field or a navigation step into a non-map value yields NULL, never an
    /// error.
    fn field_access(path: &[String], ctx: &ExecutionContext) -> FieldValue {
        let Some((first, rest)) = path.split_first() else {
            return FieldValue::Null;
        };
        let root = match ctx.current_record() {
            Some(record) => record.get(first).cloned().unwrap_or(FieldValue::Null),
            None => FieldValue::Null,
        };
        Self::navigate(root, rest)
    }

    /// Walk an accessor path through nested struct/map values.
    fn navigate(mut value: FieldValue, path: &[String]) -> FieldValue {
        for segment in path {
            value = match value {
                FieldValue::Struct(mut map) | FieldValue::Map(mut map) => {
                    map.remove(segment).unwrap_or(FieldValue::Null)
                }
                _ => return FieldValue::Null,
            };
        }
        value
    }

    fn binary_op(
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<FieldValue> {
        match op {
            // Logical operators short-circuit
            BinaryOperator::And => {
                let result = Self::is_true(left, ctx)? && Self::is_true(right, ctx)?;
                Ok(FieldValue::Boolean(result))
            }
            BinaryOperator::Or => {
                let result = Self::is_true(left, ctx)? || Self::is_true(right, ctx)?;
                Ok(FieldValue::Boolean(result))
            }
            BinaryOperator::Add => Self::value(left, ctx)?.add(&Self::value(right, ctx)?),
            BinaryOperator::Subtract => Self::value(left, ctx)?.subtract(&Self::value(right, ctx)?),
            BinaryOperator::Multiply => Self::value(left, ctx)?.multiply(&Self::value(right, ctx)?),
            BinaryOperator::Divide => Self::value(left, ctx)?.divide(&Self::value(right, ctx)?),
            BinaryOperator::Equal => {
                let l = Self::value(left, ctx)?;
                let r = Self::value(right, ctx)?;
                Ok(FieldValue::Boolean(FieldValueComparator::values_equal(
                    &l, &r,
                )))
            }
            BinaryOperator::NotEqual => {
                let l = Self::value(left, ctx)?;
                let r = Self::value(right, ctx)?;
                Ok(FieldValue::Boolean(!FieldValueComparator::values_equal(
                    &l, &r,
                )))
            }
            BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => {
                let l = Self::value(left, ctx)?;
                let r = Self::value(right, ctx)?;
                // Relational tests against NULL are false, not errors
                if l == FieldValue::Null || r == FieldValue::Null {
                    return Ok(FieldValue::Boolean(false));
                }
                let ordering = FieldValueComparator::compare_values(&l, &r)?;
                let result = match op {
                    BinaryOperator::LessThan => ordering == Ordering::Less,
                    BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                    BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(FieldValue::Boolean(result))
            }
            BinaryOperator::Like | BinaryOperator::NotLike => {
                let l = Self::value(left, ctx)?;
                let r = Self::value(right, ctx)?;
                let matched = Self::like_match(&l, &r)?;
                let result = if op == BinaryOperator::Like {
                    matched
                } else {
                    !matched
                };
                Ok(FieldValue::Boolean(result))
            }
            BinaryOperator::In | BinaryOperator::NotIn => {
                let l = Self::value(left, ctx)?;
                let members = Self::value(right, ctx)?;
                let FieldValue::Array(members) = members else {
                    return Err(SqlError::type_error(
                        "ARRAY",
                        members.type_name(),
                        Some(members.to_string()),
                    ));
                };
                let found = members
                    .iter()
                    .any(|m| FieldValueComparator::values_equal(&l, m));
                let result = if op == BinaryOperator::In {
                    found
                } else {
                    !found
                };
                Ok(FieldValue::Boolean(result))
            }
        }
    }

    fn unary_op(
        op: UnaryOperator,
        expr: &Expr,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<FieldValue> {
        match op {
            UnaryOperator::Not => Ok(FieldValue::Boolean(!Self::is_true(expr, ctx)?)),
            UnaryOperator::Minus => {
                let value = Self::value(expr, ctx)?;
                match value {
                    FieldValue::Null => Ok(FieldValue::Null),
                    FieldValue::Integer(i) => Ok(FieldValue::Integer(-i)),
                    FieldValue::Float(f) => Ok(FieldValue::Float(-f)),
                    FieldValue::Decimal(d) => Ok(FieldValue::Decimal(-d)),
                    other => Err(SqlError::type_error(
                        "numeric",
                        other.type_name(),
                        Some(other.to_string()),
                    )),
                }
            }
            UnaryOperator::IsNull => {
                Ok(FieldValue::Boolean(Self::value(expr, ctx)? == FieldValue::Null))
            }
            UnaryOperator::IsNotNull => {
                Ok(FieldValue::Boolean(Self::value(expr, ctx)? != FieldValue::Null))
            }
        }
    }

    /// Match a value against a LIKE pattern with `%` (any run) and `_` (any
    /// single character) wildcards. NULL on either side never matches.
    fn like_match(value: &FieldValue, pattern: &FieldValue) -> SqlResult<bool> {
        let pattern = match pattern {
            FieldValue::Null => return Ok(false),
            FieldValue::String(s) => s,
            other => {
                return Err(SqlError::type_error(
                    "STRING pattern",
                    other.type_name(),
                    Some(other.to_string()),
                ))
            }
        };
        let text = match value {
            FieldValue::Null => return Ok(false),
            FieldValue::String(s) => s.clone(),
            other => other.to_string(),
        };

        let mut regex_pattern = String::with_capacity(pattern.len() + 2);
        regex_pattern.push('^');
        for c in pattern.chars() {
            match c {
                '%' => regex_pattern.push_str(".*"),
                '_' => regex_pattern.push('.'),
                _ => regex_pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        regex_pattern.push('$');

        let re = Regex::new(&regex_pattern).map_err(|e| {
            SqlError::execution_error(format!("invalid LIKE pattern '{}': {}", pattern, e))
        })?;
        Ok(re.is_match(&text))
    }
}
