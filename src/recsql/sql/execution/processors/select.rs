//! SELECT projection stage and the column value extractor.
//!
//! The extractor is shared with the grouping stage, which projects each
//! group's member records through the same SELECT columns.

use crate::recsql::sql::ast::{Expr, SelectClause, SelectColumn};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::results::ResultSet;
use crate::recsql::sql::execution::types::{FieldValue, Record};
use std::rc::Rc;

/// Projects records through the SELECT expression list into output rows, or
/// flattens collection/map valued columns when every column asks for it.
pub struct ColumnExtractor;

impl ColumnExtractor {
    /// Project `records` through `cols`.
    ///
    /// In flatten mode (every column marked EXPAND) each column's collection
    /// items are appended directly to the result sequence instead of building
    /// per-record rows. The current record is restored after every column
    /// evaluation, since an expression may itself move it.
    pub fn extract(
        cols: &[SelectColumn],
        records: &[Rc<Record>],
        distinct: bool,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<ResultSet> {
        let flatten = !cols.is_empty() && cols.iter().all(|c| c.expand);

        let mut rows: Vec<Vec<FieldValue>> = Vec::with_capacity(records.len());
        let mut values: Vec<FieldValue> = Vec::new();

        for (row_index, record) in records.iter().enumerate() {
            ctx.set_current_record(Rc::clone(record));

            let mut row = Vec::with_capacity(cols.len());
            for (col_index, col) in cols.iter().enumerate() {
                let value = ExpressionEvaluator::value(&col.expr, ctx).map_err(|e| {
                    SqlError::execution_error_with_cause(
                        format!(
                            "unable to get value for column {} from result {} ({})",
                            col_index + 1,
                            row_index,
                            record.as_value()
                        ),
                        e,
                    )
                })?;
                // The expression can move the current record; put it back.
                ctx.set_current_record(Rc::clone(record));

                if flatten {
                    Self::append_items(value, &mut values);
                } else {
                    row.push(value);
                }
            }

            if !flatten {
                rows.push(row);
            }
        }

        if flatten {
            if distinct {
                values = Self::dedup(values);
            }
            Ok(ResultSet::Values(values))
        } else {
            if distinct {
                rows = Self::dedup(rows);
            }
            Ok(ResultSet::Rows(rows))
        }
    }

    /// Expand a collection/map value into the flat result sequence. Arrays
    /// contribute their elements, maps and structs their values in key order,
    /// NULL contributes nothing, and a scalar contributes itself.
    fn append_items(value: FieldValue, out: &mut Vec<FieldValue>) {
        match value {
            FieldValue::Null => {}
            FieldValue::Array(items) => out.extend(items),
            FieldValue::Map(map) | FieldValue::Struct(map) => {
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                let mut map = map;
                for key in keys {
                    if let Some(v) = map.remove(&key) {
                        out.push(v);
                    }
                }
            }
            other => out.push(other),
        }
    }

    /// First-seen-order deduplication by structural equality.
    fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
        let mut seen: Vec<T> = Vec::with_capacity(items.len());
        for item in items {
            if !seen.contains(&item) {
                seen.push(item);
            }
        }
        seen
    }
}

/// Processor for the ungrouped SELECT stage
pub struct SelectProcessor;

impl SelectProcessor {
    /// Produce the final result sequence for an ungrouped query.
    pub fn process(
        select: &SelectClause,
        results: ResultSet,
        ctx: &mut ExecutionContext,
    ) -> SqlResult<ResultSet> {
        let records = match results {
            ResultSet::Records(records) => records,
            other => return Ok(other),
        };

        if select.wants_records() {
            // Whole records are returned; DISTINCT dedups them structurally.
            let records = if select.distinct {
                Self::unique_records(records)
            } else {
                records
            };
            return Ok(ResultSet::Records(records));
        }

        let cols = select.columns();

        // A single column constructing a new struct returns one constructed
        // value per record instead of a one-element row.
        if cols.len() == 1 && !cols[0].expand && matches!(cols[0].expr, Expr::StructLiteral(_)) {
            let mut values = Vec::with_capacity(records.len());
            for (row_index, record) in records.iter().enumerate() {
                ctx.set_current_record(Rc::clone(record));
                let value = ExpressionEvaluator::value(&cols[0].expr, ctx).map_err(|e| {
                    SqlError::execution_error_with_cause(
                        format!(
                            "unable to get value for column 1 from result {} ({})",
                            row_index,
                            record.as_value()
                        ),
                        e,
                    )
                })?;
                ctx.set_current_record(Rc::clone(record));
                values.push(value);
            }
            let values = if select.distinct {
                ColumnExtractor::dedup(values)
            } else {
                values
            };
            return Ok(ResultSet::Values(values));
        }

        ColumnExtractor::extract(cols, &records, select.distinct, ctx)
    }

    /// Deduplicate whole records by structural equality, first occurrence
    /// wins.
    pub fn unique_records(records: Vec<Rc<Record>>) -> Vec<Rc<Record>> {
        let mut seen: Vec<Rc<Record>> = Vec::with_capacity(records.len());
        for record in records {
            if !seen.iter().any(|s| **s == *record) {
                seen.push(record);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recsql::sql::ast::SelectItems;
    use std::collections::HashMap;

    fn record(fields: Vec<(&str, FieldValue)>) -> Rc<Record> {
        let mut map = HashMap::new();
        for (name, value) in fields {
            map.insert(name.to_string(), value);
        }
        Rc::new(Record::new(map))
    }

    fn col(name: &str) -> SelectColumn {
        SelectColumn {
            expr: Expr::FieldAccess(vec![name.to_string()]),
            alias: None,
            expand: false,
        }
    }

    #[test]
    fn test_projection_builds_one_row_per_record() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![
            record(vec![
                ("a", FieldValue::Integer(1)),
                ("b", FieldValue::Integer(2)),
            ]),
            record(vec![
                ("a", FieldValue::Integer(3)),
                ("b", FieldValue::Integer(4)),
            ]),
        ];
        let out = ColumnExtractor::extract(&[col("a"), col("b")], &records, false, &mut ctx)
            .unwrap();
        assert_eq!(
            out,
            ResultSet::Rows(vec![
                vec![FieldValue::Integer(1), FieldValue::Integer(2)],
                vec![FieldValue::Integer(3), FieldValue::Integer(4)],
            ])
        );
    }

    #[test]
    fn test_distinct_preserves_first_occurrence() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![
            record(vec![("n", FieldValue::Integer(1))]),
            record(vec![("n", FieldValue::Integer(1))]),
            record(vec![("n", FieldValue::Integer(2))]),
            record(vec![("n", FieldValue::Integer(1))]),
        ];
        let out = ColumnExtractor::extract(&[col("n")], &records, true, &mut ctx).unwrap();
        assert_eq!(
            out,
            ResultSet::Rows(vec![
                vec![FieldValue::Integer(1)],
                vec![FieldValue::Integer(2)],
            ])
        );
    }

    #[test]
    fn test_flatten_appends_collection_items() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![record(vec![(
            "tags",
            FieldValue::Array(vec![
                FieldValue::String("x".to_string()),
                FieldValue::String("y".to_string()),
            ]),
        )])];
        let cols = [SelectColumn {
            expr: Expr::FieldAccess(vec!["tags".to_string()]),
            alias: None,
            expand: true,
        }];
        let out = ColumnExtractor::extract(&cols, &records, false, &mut ctx).unwrap();
        assert_eq!(
            out,
            ResultSet::Values(vec![
                FieldValue::String("x".to_string()),
                FieldValue::String("y".to_string()),
            ])
        );
    }

    #[test]
    fn test_single_struct_column_returns_constructed_values() {
        let mut ctx = ExecutionContext::new(HashMap::new());
        let select = SelectClause {
            distinct: false,
            items: SelectItems::Columns(vec![SelectColumn {
                expr: Expr::StructLiteral(vec![(
                    "id".to_string(),
                    Expr::FieldAccess(vec!["n".to_string()]),
                )]),
                alias: None,
                expand: false,
            }]),
        };
        let records = vec![record(vec![("n", FieldValue::Integer(7))])];
        let out = SelectProcessor::process(&select, ResultSet::Records(records), &mut ctx)
            .unwrap();
        match out {
            ResultSet::Values(values) => match &values[0] {
                FieldValue::Struct(fields) => {
                    assert_eq!(fields.get("id"), Some(&FieldValue::Integer(7)))
                }
                other => panic!("expected struct, got {:?}", other),
            },
            other => panic!("expected values, got {:?}", other),
        }
    }

    #[test]
    fn test_distinct_whole_records() {
        let select = SelectClause {
            distinct: true,
            items: SelectItems::Wildcard,
        };
        let mut ctx = ExecutionContext::new(HashMap::new());
        let records = vec![
            record(vec![("n", FieldValue::Integer(1))]),
            record(vec![("n", FieldValue::Integer(1))]),
            record(vec![("n", FieldValue::Integer(2))]),
        ];
        let out = SelectProcessor::process(&select, ResultSet::Records(records), &mut ctx)
            .unwrap();
        assert_eq!(out.len(), 2);
    }
}
