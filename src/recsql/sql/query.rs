/*!
# Query

The public face of the engine. A [`Query`] is parsed once and can then be
executed any number of times against different record lists:

```rust
use recsql::{FieldValue, Query, Record};
use std::collections::HashMap;

let query = Query::parse_str("SELECT * FROM work WHERE time > 3")?;

let mut fields = HashMap::new();
fields.insert("time".to_string(), FieldValue::Integer(8));
let results = query.execute(vec![Record::new(fields)])?;
assert_eq!(results.results().len(), 1);
# Ok::<(), recsql::SqlError>(())
```

A parsed query may be reused sequentially, one execution at a time. It is not
safe for concurrent use: all mutable execution state lives in a per-execution
context, but the ordering comparators cache a deferred error slot between
stages, so two overlapping executions of the same instance would corrupt each
other.
*/

use crate::recsql::sql::ast::{
    ColumnRef, Expr, FromTarget, LimitClause, OrderByExpr, OrderDirection, SelectClause,
    SelectItems,
};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::execution::context::ExecutionContext;
use crate::recsql::sql::execution::expression::ExpressionEvaluator;
use crate::recsql::sql::execution::processors::{
    ExecuteOnMap, GroupKeyComparator, QueryExecutor, RecordComparator,
};
use crate::recsql::sql::execution::results::QueryResults;
use crate::recsql::sql::execution::types::{FieldValue, Record};
use crate::recsql::sql::parser;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::recsql::sql::execution::context::INT_BIND_VAR_PREFIX;

/// A parsed, executable statement.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) statement: Option<String>,
    pub(crate) select: SelectClause,
    pub(crate) from: FromTarget,
    pub(crate) where_clause: Option<Expr>,
    pub(crate) having: Option<Expr>,
    pub(crate) group_by: Option<Vec<ColumnRef>>,
    pub(crate) order_by: Option<Vec<OrderByExpr>>,
    pub(crate) group_order_by: Option<Vec<OrderByExpr>>,
    pub(crate) limit: Option<LimitClause>,
    pub(crate) group_limit: Option<LimitClause>,
    pub(crate) execute_on: ExecuteOnMap,

    // Resolved at init time
    pub(crate) group_exprs: Vec<Expr>,
    pub(crate) order_comparator: Option<RecordComparator>,
    pub(crate) group_order_comparator: Option<GroupKeyComparator>,

    pub(crate) bind_vars: HashMap<String, FieldValue>,
    pub(crate) parsed: bool,
}

impl Query {
    /// Create an empty, unparsed query.
    pub fn new() -> Query {
        Query::default()
    }

    /// Parse a statement into this query, replacing any previously parsed
    /// clauses. Bind variables set on this instance survive the re-parse.
    pub fn parse(&mut self, statement: &str) -> SqlResult<()> {
        let mut query = parser::parse_statement(statement)?;
        query.bind_vars = std::mem::take(&mut self.bind_vars);
        *self = query;
        Ok(())
    }

    /// Parse a statement into a fresh query.
    pub fn parse_str(statement: &str) -> SqlResult<Query> {
        parser::parse_statement(statement)
    }

    /// The statement text this query was parsed from.
    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    /// Whether `parse` has succeeded on this instance.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    // ---- Bind variables -------------------------------------------------

    /// Set a named bind variable (case-insensitive, optional leading `:`).
    pub fn set_variable(&mut self, name: &str, value: FieldValue) {
        let name = name.strip_prefix(':').unwrap_or(name).to_lowercase();
        self.bind_vars.insert(name, value);
    }

    /// Set an indexed bind variable, as referenced by the n-th `?` in the
    /// statement (1-based).
    pub fn set_indexed_variable(&mut self, index: usize, value: FieldValue) {
        self.bind_vars
            .insert(format!("{}{}", INT_BIND_VAR_PREFIX, index), value);
    }

    /// Set several named bind variables at once.
    pub fn set_variables(&mut self, vars: HashMap<String, FieldValue>) {
        for (name, value) in vars {
            self.set_variable(&name, value);
        }
    }

    /// Read back a named bind variable.
    pub fn variable(&self, name: &str) -> Option<&FieldValue> {
        let name = name.strip_prefix(':').unwrap_or(name).to_lowercase();
        self.bind_vars.get(&name)
    }

    // ---- Execution ------------------------------------------------------

    /// Execute this query against a record list.
    pub fn execute(&self, records: Vec<Record>) -> SqlResult<QueryResults> {
        self.ensure_parsed()?;
        let records = records.into_iter().map(Rc::new).collect();
        let mut ctx = ExecutionContext::new(self.bind_vars.clone());
        QueryExecutor::execute(self, records, &mut ctx)
    }

    /// Execute against any finite record source.
    pub fn execute_iter<I>(&self, records: I) -> SqlResult<QueryResults>
    where
        I: IntoIterator<Item = Record>,
    {
        self.execute(records.into_iter().collect())
    }

    /// Execute against a slice of serializable host values; each item is
    /// converted to a record through serde.
    pub fn execute_serialized<T: Serialize>(&self, items: &[T]) -> SqlResult<QueryResults> {
        let records = items
            .iter()
            .map(Record::from_serialize)
            .collect::<SqlResult<Vec<_>>>()?;
        self.execute(records)
    }

    /// Execute a `FROM null` query with no records: the pipeline runs over a
    /// single-element placeholder record, which is what lets a statement
    /// consist of nothing but EXECUTE ON expressions over bind variables.
    /// Queries that declare a record type must be given records.
    pub fn execute_no_records(&self) -> SqlResult<QueryResults> {
        self.ensure_parsed()?;
        if let FromTarget::Type(name) = &self.from {
            return Err(SqlError::execution_error(format!(
                "record list must be non-null when a record type ({}) is declared",
                name
            )));
        }
        self.execute(vec![Record::new(HashMap::new())])
    }

    /// Execute a nested sub-query: resolve the FROM accessor against the
    /// parent's current record to a collection of records, run the full
    /// pipeline in a child context, and return the final results as a value.
    pub(crate) fn execute_as_subquery(
        &self,
        parent: &mut ExecutionContext,
    ) -> SqlResult<FieldValue> {
        let records = match &self.from {
            FromTarget::Null => vec![Rc::new(Record::new(HashMap::new()))],
            FromTarget::Type(name) => {
                let path: Vec<String> = name.split('.').map(str::to_string).collect();
                let source =
                    ExpressionEvaluator::value(&Expr::FieldAccess(path), parent)?;
                match source {
                    FieldValue::Null => Vec::new(),
                    FieldValue::Array(items) => items
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
                        .collect::<SqlResult<Vec<_>>>()?,
                    other => {
                        return Err(SqlError::type_error(
                            "ARRAY",
                            other.type_name(),
                            Some(other.to_string()),
                        ))
                    }
                }
            }
        };

        let mut child = parent.child();
        let results = QueryExecutor::execute(self, records, &mut child)?;

        let value = match results.results() {
            crate::recsql::sql::execution::results::ResultSet::Records(records) => {
                FieldValue::Array(records.iter().map(|r| r.as_value()).collect())
            }
            crate::recsql::sql::execution::results::ResultSet::Rows(rows) => FieldValue::Array(
                rows.iter()
                    .map(|row| FieldValue::Array(row.clone()))
                    .collect(),
            ),
            crate::recsql::sql::execution::results::ResultSet::Values(values) => {
                FieldValue::Array(values.clone())
            }
        };
        Ok(value)
    }

    // ---- Reordering -----------------------------------------------------

    /// Replace the ORDER BY clause with 1-based column/direction pairs and
    /// re-execute the whole pipeline. Map iteration order (ascending column
    /// index) sets key priority. Only queries that project columns can be
    /// re-ordered.
    pub fn reorder(
        &mut self,
        records: Vec<Record>,
        dirs: &BTreeMap<usize, OrderDirection>,
    ) -> SqlResult<QueryResults> {
        self.ensure_parsed()?;
        if self.select.wants_records() {
            return Err(SqlError::parse_error(
                "only statements that return columns (not the records passed in) can be re-ordered",
                None,
            ));
        }

        let cols = self.select.columns().len();
        let mut order_by = Vec::with_capacity(dirs.len());
        for (&index, &direction) in dirs {
            if index > cols {
                return Err(SqlError::parse_error(
                    format!(
                        "cannot reorder on column {}, only {} columns are present in the statement",
                        index, cols
                    ),
                    None,
                ));
            }
            order_by.push(OrderByExpr {
                key: ColumnRef::Position(index),
                direction,
            });
        }

        self.order_by = Some(order_by);
        self.order_comparator =
            RecordComparator::build(self.order_by.as_deref(), &self.select)?;
        self.execute(records)
    }

    /// Replace the ORDER BY clause from a textual fragment ("name DESC, 2
    /// ASC"), parsed with the same grammar as a statement's ORDER BY clause,
    /// and re-execute the whole pipeline.
    pub fn reorder_str(&mut self, records: Vec<Record>, order_bys: &str) -> SqlResult<QueryResults> {
        self.ensure_parsed()?;
        let order_by = parser::parse_order_by_fragment(order_bys)?;
        self.order_by = Some(order_by);
        self.order_comparator =
            RecordComparator::build(self.order_by.as_deref(), &self.select)?;
        self.execute(records)
    }

    // ---- Init-time validation -------------------------------------------

    /// Validate the parsed clauses and resolve positional references; called
    /// once by the parser after it has assembled the query.
    pub(crate) fn init(&mut self) -> SqlResult<()> {
        self.init_select()?;

        if let Some(where_clause) = &self.where_clause {
            ExpressionEvaluator::init(where_clause)?;
        }
        if let Some(having) = &self.having {
            ExpressionEvaluator::init(having)?;
        }

        self.init_group_by()?;
        self.order_comparator = RecordComparator::build(self.order_by.as_deref(), &self.select)?;

        if self.group_order_by.is_some() && self.group_by.is_none() {
            return Err(SqlError::parse_error(
                "group order bys are only valid when one or more group by columns are present",
                None,
            ));
        }
        self.group_order_comparator =
            GroupKeyComparator::build(self.group_order_by.as_deref(), &self.group_exprs)?;

        for limit in [&self.limit, &self.group_limit].into_iter().flatten() {
            ExpressionEvaluator::init(&limit.offset)?;
            ExpressionEvaluator::init(&limit.count)?;
        }

        for expressions in self.execute_on.values() {
            for aliased in expressions {
                ExpressionEvaluator::init(&aliased.expr)?;
            }
        }

        self.parsed = true;
        Ok(())
    }

    fn init_select(&mut self) -> SqlResult<()> {
        let SelectItems::Columns(cols) = &self.select.items else {
            return Ok(());
        };

        let mut expand_count = 0;
        for col in cols {
            ExpressionEvaluator::init(&col.expr)?;
            if col.expand {
                expand_count += 1;
            }
        }

        // Flattening is all-or-nothing across the SELECT list.
        if expand_count > 0 && expand_count != cols.len() {
            return Err(SqlError::parse_error(
                "if one or more SELECT columns expands collection or map items then ALL columns must expand them",
                None,
            ));
        }
        Ok(())
    }

    fn init_group_by(&mut self) -> SqlResult<()> {
        self.group_exprs.clear();
        let Some(group_by) = &self.group_by else {
            return Ok(());
        };

        let cols = self.select.columns();
        for key in group_by {
            let expr = match key {
                ColumnRef::Position(ci) => {
                    if *ci == 0 {
                        return Err(SqlError::parse_error(
                            "group by column indices should start at 1",
                            None,
                        ));
                    }
                    if self.select.wants_records() {
                        return Err(SqlError::parse_error(
                            "cannot group on a select column index when the records are to be returned",
                            None,
                        ));
                    }
                    if *ci > cols.len() {
                        return Err(SqlError::parse_error(
                            format!(
                                "invalid group by column index: {}, only {} columns are selected",
                                ci,
                                cols.len()
                            ),
                            None,
                        ));
                    }
                    cols[*ci - 1].expr.clone()
                }
                ColumnRef::Expr(expr) => {
                    ExpressionEvaluator::init(expr)?;
                    expr.clone()
                }
            };
            self.group_exprs.push(expr);
        }
        Ok(())
    }

    fn ensure_parsed(&self) -> SqlResult<()> {
        if !self.parsed {
            return Err(SqlError::execution_error("query has not been initialised"));
        }
        Ok(())
    }

    // ---- Accessors used by the stage processors -------------------------

    pub(crate) fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    pub(crate) fn having(&self) -> Option<&Expr> {
        self.having.as_ref()
    }

    pub(crate) fn select(&self) -> &SelectClause {
        &self.select
    }

    pub(crate) fn has_group_by(&self) -> bool {
        self.group_by.is_some()
    }

    pub(crate) fn group_exprs(&self) -> &[Expr] {
        &self.group_exprs
    }

    pub(crate) fn order_comparator(&self) -> Option<&RecordComparator> {
        self.order_comparator.as_ref()
    }

    pub(crate) fn group_order_comparator(&self) -> Option<&GroupKeyComparator> {
        self.group_order_comparator.as_ref()
    }

    pub(crate) fn limit(&self) -> Option<&LimitClause> {
        self.limit.as_ref()
    }

    pub(crate) fn group_limit(&self) -> Option<&LimitClause> {
        self.group_limit.as_ref()
    }

    pub(crate) fn execute_on(&self) -> &ExecuteOnMap {
        &self.execute_on
    }
}
