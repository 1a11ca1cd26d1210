//! Integration tests for the grouped pipeline: GROUP BY, per-group
//! aggregates, HAVING, GROUP ORDER BY and the two limit kinds.

use recsql::{FieldValue, Query, Record, ResultSet};
use std::collections::HashMap;

fn work(worker: &str, time: i64) -> Record {
    let mut fields = HashMap::new();
    fields.insert(
        "worker".to_string(),
        FieldValue::String(worker.to_string()),
    );
    fields.insert("time".to_string(), FieldValue::Integer(time));
    Record::new(fields)
}

fn works() -> Vec<Record> {
    vec![work("jeremie", 8), work("sebastien", 5), work("jeremie", 2)]
}

#[test]
fn test_group_by_with_aggregate() {
    let query = Query::parse_str(
        "SELECT worker, @total_time FROM work \
         GROUP BY worker \
         EXECUTE ON GROUP_BY_RESULTS sum(time) AS total_time",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();

    let rows = results.rows();
    assert_eq!(rows.len(), 2);

    let expected = [
        vec![
            FieldValue::String("jeremie".to_string()),
            FieldValue::Integer(10),
        ],
        vec![
            FieldValue::String("sebastien".to_string()),
            FieldValue::Integer(5),
        ],
    ];
    for row in rows {
        assert!(expected.contains(row), "unexpected row {:?}", row);
    }
}

#[test]
fn test_aggregate_is_input_order_independent() {
    let query = Query::parse_str(
        "SELECT worker, @total FROM work \
         GROUP BY worker \
         EXECUTE ON GROUP_BY_RESULTS sum(time) AS total",
    )
    .unwrap();

    let reversed: Vec<Record> = works().into_iter().rev().collect();
    let results = query.execute(reversed).unwrap();
    let jeremie_row = results
        .rows()
        .iter()
        .find(|row| row[0] == FieldValue::String("jeremie".to_string()))
        .expect("jeremie group should exist");
    assert_eq!(jeremie_row[1], FieldValue::Integer(10));
}

#[test]
fn test_groups_appear_in_first_seen_order() {
    let query = Query::parse_str("SELECT worker FROM work GROUP BY worker").unwrap();
    let results = query.execute(works()).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[0].0,
        vec![FieldValue::String("jeremie".to_string())]
    );
    assert_eq!(
        groups[1].0,
        vec![FieldValue::String("sebastien".to_string())]
    );
}

#[test]
fn test_grouping_partitions_without_loss() {
    let query = Query::parse_str("SELECT * FROM work GROUP BY worker").unwrap();
    let results = query.execute(works()).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
    assert_eq!(total, 3);
}

#[test]
fn test_record_with_fully_absent_key_joins_no_group() {
    let mut keyless = HashMap::new();
    keyless.insert("time".to_string(), FieldValue::Integer(9));
    let mut records = works();
    records.push(Record::new(keyless));

    let query = Query::parse_str("SELECT * FROM work GROUP BY worker").unwrap();
    let results = query.execute(records).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(groups.len(), 2);
    let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
    assert_eq!(total, 3);
}

#[test]
fn test_having_reduces_groups_not_members() {
    let query = Query::parse_str(
        "SELECT worker, @total FROM work \
         GROUP BY worker \
         HAVING @total > 5 \
         EXECUTE ON GROUP_BY_RESULTS sum(time) AS total",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].0,
        vec![FieldValue::String("jeremie".to_string())]
    );
    // The surviving group kept both member rows.
    assert_eq!(groups[0].1.len(), 2);
}

#[test]
fn test_having_with_group_key_access() {
    let query = Query::parse_str(
        "SELECT worker FROM work \
         GROUP BY worker \
         HAVING get(:_grpby, 1) = 'sebastien'",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();
    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].0,
        vec![FieldValue::String("sebastien".to_string())]
    );
}

#[test]
fn test_group_order_by_key_position() {
    let query = Query::parse_str(
        "SELECT worker FROM work \
         GROUP BY worker \
         GROUP ORDER BY 1 DESC",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(
        groups[0].0,
        vec![FieldValue::String("sebastien".to_string())]
    );
    assert_eq!(
        groups[1].0,
        vec![FieldValue::String("jeremie".to_string())]
    );
}

#[test]
fn test_group_order_by_saved_value() {
    let query = Query::parse_str(
        "SELECT worker, @total FROM work \
         GROUP BY worker \
         GROUP ORDER BY @total ASC \
         EXECUTE ON GROUP_BY_RESULTS sum(time) AS total",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();

    let rows = results.rows();
    assert_eq!(rows[0][1], FieldValue::Integer(5));
    assert_eq!(rows[1][1], FieldValue::Integer(10));
}

#[test]
fn test_group_limit_restricts_groups() {
    let mut records = works();
    records.push(work("anna", 4));

    let query = Query::parse_str(
        "SELECT worker FROM work \
         GROUP BY worker \
         GROUP LIMIT 1, 2",
    )
    .unwrap();
    let results = query.execute(records).unwrap();

    // First-seen order is jeremie, sebastien, anna; skipping one group
    // leaves sebastien and anna.
    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[0].0,
        vec![FieldValue::String("sebastien".to_string())]
    );
    assert_eq!(groups[1].0, vec![FieldValue::String("anna".to_string())]);
}

#[test]
fn test_row_limit_applies_per_group() {
    let query = Query::parse_str(
        "SELECT time FROM work \
         GROUP BY worker \
         ORDER BY time DESC \
         LIMIT 1",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    for (_, members) in groups {
        assert_eq!(members.len(), 1);
    }
    // Members were sorted descending before the limit, so the jeremie group
    // keeps its largest time.
    assert_eq!(groups[0].1, ResultSet::Rows(vec![vec![FieldValue::Integer(8)]]));
}

#[test]
fn test_per_group_save_values_are_snapshotted() {
    let query = Query::parse_str(
        "SELECT worker FROM work \
         GROUP BY worker \
         EXECUTE ON GROUP_BY_RESULTS sum(time) AS total, count() AS members",
    )
    .unwrap();
    let results = query.execute(works()).unwrap();

    let jeremie = vec![FieldValue::String("jeremie".to_string())];
    let snapshot = results
        .group_by_save_values(&jeremie)
        .expect("snapshot for jeremie");
    assert_eq!(snapshot.get("total"), Some(&FieldValue::Integer(10)));
    assert_eq!(snapshot.get("members"), Some(&FieldValue::Integer(2)));

    let sebastien = vec![FieldValue::String("sebastien".to_string())];
    let snapshot = results
        .group_by_save_values(&sebastien)
        .expect("snapshot for sebastien");
    assert_eq!(snapshot.get("total"), Some(&FieldValue::Integer(5)));
}

#[test]
fn test_group_by_two_keys() {
    let mut records = works();
    records.push(work("jeremie", 8));

    let query = Query::parse_str("SELECT worker, time FROM work GROUP BY worker, time").unwrap();
    let results = query.execute(records).unwrap();

    // (jeremie, 8) appears twice and collapses into one group of two.
    let groups = results.group_by_results().expect("grouped query");
    assert_eq!(groups.len(), 3);
    let first = &groups[0];
    assert_eq!(
        first.0,
        vec![
            FieldValue::String("jeremie".to_string()),
            FieldValue::Integer(8),
        ]
    );
    assert_eq!(first.1.len(), 2);
}

#[test]
fn test_group_by_select_column_position() {
    let query = Query::parse_str("SELECT worker FROM work GROUP BY 1").unwrap();
    let results = query.execute(works()).unwrap();
    assert_eq!(results.group_by_results().map(|g| g.len()), Some(2));
}

#[test]
fn test_grouped_distinct_member_rows() {
    let mut records = works();
    records.push(work("jeremie", 8));

    let query =
        Query::parse_str("SELECT DISTINCT worker, time FROM work GROUP BY worker").unwrap();
    let results = query.execute(records).unwrap();

    let groups = results.group_by_results().expect("grouped query");
    // The duplicated (jeremie, 8) row collapses within its group.
    assert_eq!(groups[0].1.len(), 2);
}
