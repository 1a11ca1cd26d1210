//! Query result sink.
//!
//! [`QueryResults`] accumulates every per-stage output of one execution: the
//! post-WHERE record list, the working result sequence each later stage
//! rewrites, the grouping map and per-group saved-value snapshots, the final
//! saved values, and per-stage timings. It holds no reference back to the
//! query, the execution context or the expression tree, so it can be retained
//! and inspected long after both are gone.

use crate::recsql::sql::execution::types::{FieldValue, Record};
use std::cell::OnceCell;
use std::rc::Rc;

/// The tuple of values identifying one group: one entry per GROUP BY
/// expression that produced a non-null value for the group's records.
pub type GroupKey = Vec<FieldValue>;

/// Named values saved by EXECUTE ON expressions, lowercase-keyed.
pub type SaveValues = std::collections::HashMap<String, FieldValue>;

/// The working result sequence as it moves through the pipeline.
///
/// Stages only ever assume "ordered sequence": the concrete shape shifts from
/// records (WHERE, ORDER BY, LIMIT) to projected rows (SELECT, grouped
/// output) to bare values (EXPAND flattening, single-struct-column queries).
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    /// Whole records
    Records(Vec<Rc<Record>>),
    /// Projected rows, one `Vec<FieldValue>` per surviving record; for
    /// grouped queries the final set holds one row per group key tuple
    Rows(Vec<Vec<FieldValue>>),
    /// Bare values appended directly to the result sequence
    Values(Vec<FieldValue>),
}

impl ResultSet {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Records(v) => v.len(),
            ResultSet::Rows(v) => v.len(),
            ResultSet::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `[offset, offset + count)` sub-sequence, clipped to bounds.
    pub fn sub_list(&self, offset: usize, count: usize) -> ResultSet {
        fn clip<T: Clone>(items: &[T], offset: usize, count: usize) -> Vec<T> {
            let start = offset.min(items.len());
            let end = start.saturating_add(count).min(items.len());
            items[start..end].to_vec()
        }

        match self {
            ResultSet::Records(v) => ResultSet::Records(clip(v, offset, count)),
            ResultSet::Rows(v) => ResultSet::Rows(clip(v, offset, count)),
            ResultSet::Values(v) => ResultSet::Values(clip(v, offset, count)),
        }
    }

    /// Each item as a normalized row: projected rows stay as-is, records and
    /// bare values wrap into one-element rows.
    pub fn to_rows(&self) -> Vec<Vec<FieldValue>> {
        match self {
            ResultSet::Records(v) => v.iter().map(|r| vec![r.as_value()]).collect(),
            ResultSet::Rows(v) => v.clone(),
            ResultSet::Values(v) => v.iter().map(|item| vec![item.clone()]).collect(),
        }
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        ResultSet::Records(Vec::new())
    }
}

/// Accumulated outputs of one query execution.
#[derive(Debug, Default)]
pub struct QueryResults {
    where_results: Vec<Rc<Record>>,
    results: ResultSet,
    group_by_results: Option<Vec<(GroupKey, ResultSet)>>,
    group_by_save_values: Option<Vec<(GroupKey, SaveValues)>>,
    save_values: SaveValues,
    timings: Vec<(String, f64)>,
    rows: OnceCell<Vec<Vec<FieldValue>>>,
}

impl QueryResults {
    pub fn new() -> Self {
        QueryResults::default()
    }

    /// The final results of executing ALL of the query.
    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Normalized row view of the final results, built on first access.
    ///
    /// For grouped queries this is one row per surviving group, in group
    /// order: the first projected row of each group's members. For ungrouped
    /// queries each final item becomes a row (single values and whole records
    /// wrap into one-element rows).
    pub fn rows(&self) -> &[Vec<FieldValue>] {
        self.rows.get_or_init(|| match &self.group_by_results {
            Some(groups) => groups
                .iter()
                .filter_map(|(_, members)| members.to_rows().into_iter().next())
                .collect(),
            None => self.results.to_rows(),
        })
    }

    /// The records that survived the WHERE clause.
    pub fn where_results(&self) -> &[Rc<Record>] {
        &self.where_results
    }

    /// The grouping map: group key tuple to member results, in first-seen
    /// group order. `None` for ungrouped queries.
    pub fn group_by_results(&self) -> Option<&[(GroupKey, ResultSet)]> {
        self.group_by_results.as_deref()
    }

    /// Saved values snapshot for one group key. Keys are compared
    /// structurally; lookup is a linear scan in group order.
    pub fn group_by_save_values(&self, key: &GroupKey) -> Option<&SaveValues> {
        self.group_by_save_values
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, sv)| sv)
    }

    /// All per-group saved-value snapshots, in group order.
    pub fn all_group_by_save_values(&self) -> Option<&[(GroupKey, SaveValues)]> {
        self.group_by_save_values.as_deref()
    }

    /// A saved value by (case-insensitive) name.
    pub fn save_value(&self, name: &str) -> Option<&FieldValue> {
        self.save_values.get(&name.to_lowercase())
    }

    /// All saved values.
    pub fn save_values(&self) -> &SaveValues {
        &self.save_values
    }

    /// Per-stage elapsed times in seconds, in execution order.
    pub fn timings(&self) -> &[(String, f64)] {
        &self.timings
    }

    // Mutators used by the pipeline stages.

    pub fn set_results(&mut self, results: ResultSet) {
        self.results = results;
        self.rows = OnceCell::new();
    }

    /// Move the working result set out, leaving an empty one behind.
    pub fn take_results(&mut self) -> ResultSet {
        self.rows = OnceCell::new();
        std::mem::take(&mut self.results)
    }

    pub fn set_where_results(&mut self, records: Vec<Rc<Record>>) {
        self.where_results = records;
    }

    pub fn set_group_by_results(&mut self, groups: Vec<(GroupKey, ResultSet)>) {
        self.group_by_results = Some(groups);
        self.rows = OnceCell::new();
    }

    /// Move the grouping map out, for stages that rewrite it.
    pub fn take_group_by_results(&mut self) -> Option<Vec<(GroupKey, ResultSet)>> {
        self.rows = OnceCell::new();
        self.group_by_results.take()
    }

    pub fn set_group_by_save_values(&mut self, snapshots: Vec<(GroupKey, SaveValues)>) {
        self.group_by_save_values = Some(snapshots);
    }

    pub fn set_save_values(&mut self, save_values: SaveValues) {
        self.save_values = save_values;
    }

    pub fn add_timing(&mut self, label: impl Into<String>, seconds: f64) {
        self.timings.push((label.into(), seconds));
    }
}
