//! Integration tests for nested sub-queries and parent context delegation.

use recsql::{FieldValue, Query, Record};
use std::collections::HashMap;

fn item(qty: i64) -> FieldValue {
    let mut fields = HashMap::new();
    fields.insert("qty".to_string(), FieldValue::Integer(qty));
    FieldValue::Struct(fields)
}

fn order(id: i64, threshold: i64, qtys: &[i64]) -> Record {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), FieldValue::Integer(id));
    fields.insert("threshold".to_string(), FieldValue::Integer(threshold));
    fields.insert(
        "items".to_string(),
        FieldValue::Array(qtys.iter().map(|q| item(*q)).collect()),
    );
    Record::new(fields)
}

#[test]
fn test_subquery_runs_against_collection_field() {
    // The inner FROM resolves to the parent record's "items" field.
    let query = Query::parse_str(
        "SELECT id FROM orders WHERE size((SELECT * FROM items WHERE qty > 1)) > 0",
    )
    .unwrap();

    let records = vec![order(1, 0, &[2, 3]), order(2, 0, &[1])];
    let results = query.execute(records).unwrap();
    assert_eq!(results.rows(), &[vec![FieldValue::Integer(1)]]);
}

#[test]
fn test_subquery_projection_value() {
    let query = Query::parse_str(
        "SELECT (SELECT qty FROM items WHERE qty > 1) FROM orders WHERE id = 1",
    )
    .unwrap();

    let records = vec![order(1, 0, &[1, 2, 3])];
    let results = query.execute(records).unwrap();

    // The sub-query's projected rows come back as an array of rows.
    assert_eq!(
        results.rows()[0][0],
        FieldValue::Array(vec![
            FieldValue::Array(vec![FieldValue::Integer(2)]),
            FieldValue::Array(vec![FieldValue::Integer(3)]),
        ])
    );
}

#[test]
fn test_correlated_subquery_reads_parent_record() {
    // Each order's own threshold drives the inner filter.
    let query = Query::parse_str(
        "SELECT id FROM orders \
         WHERE size((SELECT * FROM items WHERE qty > :_parent.threshold)) > 0",
    )
    .unwrap();

    let records = vec![
        order(1, 5, &[2, 3]),  // nothing above 5
        order(2, 1, &[2]),     // 2 > 1
    ];
    let results = query.execute(records).unwrap();
    assert_eq!(results.rows(), &[vec![FieldValue::Integer(2)]]);
}

#[test]
fn test_subquery_save_values_delegate_to_outer_query() {
    let query = Query::parse_str(
        "SELECT id FROM orders \
         WHERE size((SELECT * FROM items EXECUTE ON ALL count() AS inner_items)) >= 0",
    )
    .unwrap();

    let records = vec![order(1, 0, &[1, 2, 3])];
    let results = query.execute(records).unwrap();

    // The inner EXECUTE ON wrote through the child context into the outer
    // query's saved values.
    assert_eq!(
        results.save_value("inner_items"),
        Some(&FieldValue::Integer(3))
    );
}

#[test]
fn test_missing_collection_field_yields_empty_subquery() {
    let query = Query::parse_str(
        "SELECT id FROM orders WHERE size((SELECT * FROM items)) = 0",
    )
    .unwrap();

    let mut fields = HashMap::new();
    fields.insert("id".to_string(), FieldValue::Integer(7));
    let results = query.execute(vec![Record::new(fields)]).unwrap();
    assert_eq!(results.rows(), &[vec![FieldValue::Integer(7)]]);
}
