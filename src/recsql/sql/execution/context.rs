//! Query execution context and state management.
//!
//! [`ExecutionContext`] owns the mutable state of one `execute` call: the
//! record under evaluation, the record list presently in scope, the active
//! group key, bind variables and saved values. Every pipeline stage receives
//! the context explicitly and mutates it; nothing is ambient.
//!
//! A context created for a nested sub-query shares its bind-variable and
//! saved-value stores with the parent, so lookups and writes made while the
//! inner query runs land in the outer query's state. Execution-local fields
//! (current record, in-scope records, group key) never delegate.

use crate::recsql::sql::execution::results::{GroupKey, SaveValues};
use crate::recsql::sql::execution::types::{FieldValue, Record};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Name of the special bind variable exposing the query's saved values.
pub const QUERY_BIND_VAR_NAME: &str = "_query";
/// Name of the special bind variable holding the current record.
pub const CURR_OBJ_VAR_NAME: &str = "_currobj";
/// Name of the special bind variable holding the records in scope.
pub const ALL_OBJS_VAR_NAME: &str = "_allobjs";
/// Name of the special bind variable holding the current group-key tuple.
pub const GRPBY_VAR_NAME: &str = "_grpby";
/// Synonym for [`GRPBY_VAR_NAME`].
pub const GRPBY_VAR_NAME_SYNONYM: &str = "_groupby";
/// Name of the special bind variable holding the parent query's current record.
pub const PARENT_VAR_NAME: &str = "_parent";
/// Key prefix of the internal indexed bind-variable namespace.
pub const INT_BIND_VAR_PREFIX: &str = "^^^";

/// What the context's "current record" slot holds.
///
/// Group-level clauses (HAVING, GROUP ORDER BY) evaluate against the group-key
/// tuple rather than a record.
#[derive(Debug, Clone)]
pub enum CurrentItem {
    None,
    Record(Rc<Record>),
    Group(GroupKey),
}

impl CurrentItem {
    /// The current item as a value: records become structs, group keys become
    /// arrays, absence is NULL.
    pub fn as_value(&self) -> FieldValue {
        match self {
            CurrentItem::None => FieldValue::Null,
            CurrentItem::Record(record) => record.as_value(),
            CurrentItem::Group(key) => FieldValue::Array(key.clone()),
        }
    }
}

/// Mutable evaluation state threaded through every pipeline stage.
pub struct ExecutionContext {
    /// The record (or group-key tuple) under evaluation
    pub current: CurrentItem,
    /// The record list in scope; reassigned at each stage so aggregates over
    /// `:_allobjs` always see the narrowed set
    pub all_records: Vec<Rc<Record>>,
    /// The active group key while group-scoped work runs
    pub current_group: Option<GroupKey>,

    bind_vars: Rc<RefCell<HashMap<String, FieldValue>>>,
    save_values: Rc<RefCell<SaveValues>>,
    group_save_values: Vec<(GroupKey, SaveValues)>,
    parent_current: Option<FieldValue>,
    is_child: bool,
}

impl ExecutionContext {
    /// Create a root context seeded with the query's bind variables.
    pub fn new(bind_vars: HashMap<String, FieldValue>) -> Self {
        ExecutionContext {
            current: CurrentItem::None,
            all_records: Vec::new(),
            current_group: None,
            bind_vars: Rc::new(RefCell::new(bind_vars)),
            save_values: Rc::new(RefCell::new(SaveValues::new())),
            group_save_values: Vec::new(),
            parent_current: None,
            is_child: false,
        }
    }

    /// Create a child context for a nested sub-query. Bind-variable and
    /// saved-value stores are shared with this context; execution-local
    /// fields start fresh. The parent's current record is snapshotted for
    /// `:_parent` (the sub-query runs fully nested inside the parent's
    /// current stage, so the snapshot cannot go stale).
    pub fn child(&self) -> ExecutionContext {
        ExecutionContext {
            current: CurrentItem::None,
            all_records: Vec::new(),
            current_group: None,
            bind_vars: Rc::clone(&self.bind_vars),
            save_values: Rc::clone(&self.save_values),
            group_save_values: Vec::new(),
            parent_current: Some(self.current.as_value()),
            is_child: true,
        }
    }

    /// Whether this context delegates its stores to an outer query.
    pub fn is_child(&self) -> bool {
        self.is_child
    }

    pub fn set_current_record(&mut self, record: Rc<Record>) {
        self.current = CurrentItem::Record(record);
    }

    /// Make a group-key tuple the current item; `:_grpby` tracks it too.
    pub fn set_current_group(&mut self, key: GroupKey) {
        self.current_group = Some(key.clone());
        self.current = CurrentItem::Group(key);
    }

    pub fn clear_current(&mut self) {
        self.current = CurrentItem::None;
    }

    /// The record currently under evaluation, when the current item is one.
    pub fn current_record(&self) -> Option<&Rc<Record>> {
        match &self.current {
            CurrentItem::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Resolve a named bind variable. Names are case-insensitive and may
    /// carry a leading `:`. Special execution-scope names resolve from the
    /// context itself; everything else reads the (shared) variable store and
    /// falls back to NULL.
    pub fn get_variable(&self, name: &str) -> FieldValue {
        let name = name.strip_prefix(':').unwrap_or(name).to_lowercase();

        match name.as_str() {
            // The nearest value-level stand-in for a handle to the query
            // itself: its named saved-value state.
            QUERY_BIND_VAR_NAME => FieldValue::Map(self.save_values.borrow().clone()),
            CURR_OBJ_VAR_NAME => self.current.as_value(),
            ALL_OBJS_VAR_NAME => {
                FieldValue::Array(self.all_records.iter().map(|r| r.as_value()).collect())
            }
            GRPBY_VAR_NAME | GRPBY_VAR_NAME_SYNONYM => match &self.current_group {
                Some(key) => FieldValue::Array(key.clone()),
                None => FieldValue::Null,
            },
            PARENT_VAR_NAME => self.parent_current.clone().unwrap_or(FieldValue::Null),
            _ => self
                .bind_vars
                .borrow()
                .get(&name)
                .cloned()
                .unwrap_or(FieldValue::Null),
        }
    }

    /// Resolve an indexed bind variable from the internal namespace.
    pub fn get_indexed_variable(&self, index: usize) -> FieldValue {
        self.bind_vars
            .borrow()
            .get(&format!("{}{}", INT_BIND_VAR_PREFIX, index))
            .cloned()
            .unwrap_or(FieldValue::Null)
    }

    /// Write a named bind variable into the (shared) store.
    pub fn set_variable(&self, name: &str, value: FieldValue) {
        let name = name.strip_prefix(':').unwrap_or(name).to_lowercase();
        self.bind_vars.borrow_mut().insert(name, value);
    }

    /// Save a value under a (case-insensitive) name. Writes land in the
    /// outermost query's store when this is a child context.
    pub fn set_save_value(&self, name: &str, value: FieldValue) {
        self.save_values
            .borrow_mut()
            .insert(name.to_lowercase(), value);
    }

    /// Read a saved value. Misses fall back to the per-group snapshot for the
    /// group key currently under evaluation, which is how HAVING and GROUP
    /// ORDER BY see group-scoped aggregates.
    pub fn get_save_value(&self, name: &str) -> Option<FieldValue> {
        let key = name.to_lowercase();
        if let Some(value) = self.save_values.borrow().get(&key) {
            return Some(value.clone());
        }
        if let CurrentItem::Group(group_key) = &self.current {
            return self
                .group_save_values
                .iter()
                .find(|(k, _)| k == group_key)
                .and_then(|(_, sv)| sv.get(&key))
                .cloned();
        }
        None
    }

    /// Clone of the full saved-value store.
    pub fn save_values_snapshot(&self) -> SaveValues {
        self.save_values.borrow().clone()
    }

    /// Replace the saved-value store, returning the previous contents. The
    /// group stage uses this to give each group a fresh store seeded from the
    /// pre-grouping values.
    pub fn replace_save_values(&self, save_values: SaveValues) -> SaveValues {
        std::mem::replace(&mut self.save_values.borrow_mut(), save_values)
    }

    /// Record the saved-value snapshot for one group.
    pub fn push_group_save_values(&mut self, key: GroupKey, snapshot: SaveValues) {
        self.group_save_values.push((key, snapshot));
    }

    /// Clone of the saved-value snapshot recorded for one group.
    pub fn group_save_values_snapshot(&self, key: &GroupKey) -> Option<SaveValues> {
        self.group_save_values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, sv)| sv.clone())
    }

    /// Move the accumulated per-group snapshots out of the context.
    pub fn take_group_save_values(&mut self) -> Vec<(GroupKey, SaveValues)> {
        std::mem::take(&mut self.group_save_values)
    }

    /// Move the saved values out of the store (root contexts only; child
    /// contexts share the parent's store and must leave it in place).
    pub fn take_save_values(&self) -> SaveValues {
        if self.is_child {
            self.save_values_snapshot()
        } else {
            std::mem::take(&mut self.save_values.borrow_mut())
        }
    }
}
