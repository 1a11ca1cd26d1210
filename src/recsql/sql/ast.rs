/*!
# Query Abstract Syntax Tree (AST)

This module defines the parsed form of a statement: the clause objects the
executor consumes and the expression tree evaluated against records.

The expression tree is a closed set of typed nodes, fixed at parse time.
Evaluation of every variant lives in
[`execution::expression`](super::execution::expression); nodes here are plain
data. Sub-query nodes embed a full nested [`Query`](super::query::Query) which
executes synchronously within the parent's current stage.

## Statement shape

```sql
SELECT [DISTINCT] <cols | *>
FROM <type | null>
[WHERE <expr>]
[GROUP BY <cols>]
[HAVING <expr>]
[ORDER BY <cols>]
[GROUP ORDER BY <cols>]
[LIMIT <offset>, <count>]
[GROUP LIMIT <offset>, <count>]
[EXECUTE ON {ALL | RESULTS | GROUP_BY_RESULTS} <expr> AS <alias>, ...]
```
*/

use crate::recsql::sql::query::Query;

/// Literal values in a statement
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,

    // String matching with '%' / '_' wildcards
    Like,
    NotLike,

    // Set membership against a list expression
    In,
    NotIn,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
    IsNull,
    IsNotNull,
}

/// Reference to a bind variable, either by name or by position.
///
/// Named variables are stored lowercased (lookups are case-insensitive).
/// Anonymous `?` placeholders are assigned consecutive indices at parse time,
/// shared with any nested sub-queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindVarRef {
    Named(String),
    Indexed(usize),
}

/// Expressions evaluated against records during execution.
///
/// `PartialEq` is structural and is what GROUP ORDER BY key resolution uses to
/// match a key against the GROUP BY expression list. Sub-query nodes never
/// compare equal.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value
    Literal(LiteralValue),
    /// Dotted field access into the current record: `customer.address.city`
    FieldAccess(Vec<String>),
    /// Bind variable reference with optional accessor path: `:name`, `?`,
    /// `:_parent.threshold`
    BindVariable { var: BindVarRef, path: Vec<String> },
    /// Saved value reference with optional accessor path: `@total` or `@stats.best`
    SavedValue { name: String, path: Vec<String> },
    /// Function call: `sum(time)`
    Function { name: String, args: Vec<Expr> },
    /// Binary operation: `expr op expr`
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation: `op expr`
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Range test: `expr [NOT] BETWEEN low AND high`
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// List expression, the right-hand side of IN: `(a, b, c)`
    List(Vec<Expr>),
    /// Constructs a new struct value per record: `{name: expr, ...}`
    StructLiteral(Vec<(String, Expr)>),
    /// Nested query evaluated against a collection-valued field of the
    /// current record
    Subquery(Box<Query>),
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Literal(a), Expr::Literal(b)) => a == b,
            (Expr::FieldAccess(a), Expr::FieldAccess(b)) => a == b,
            (
                Expr::BindVariable { var: a, path: ap },
                Expr::BindVariable { var: b, path: bp },
            ) => a == b && ap == bp,
            (
                Expr::SavedValue { name: a, path: ap },
                Expr::SavedValue { name: b, path: bp },
            ) => a == b && ap == bp,
            (
                Expr::Function { name: a, args: aa },
                Expr::Function { name: b, args: ba },
            ) => a.eq_ignore_ascii_case(b) && aa == ba,
            (
                Expr::BinaryOp {
                    left: al,
                    op: ao,
                    right: ar,
                },
                Expr::BinaryOp {
                    left: bl,
                    op: bo,
                    right: br,
                },
            ) => ao == bo && al == bl && ar == br,
            (
                Expr::UnaryOp { op: ao, expr: ae },
                Expr::UnaryOp { op: bo, expr: be },
            ) => ao == bo && ae == be,
            (
                Expr::Between {
                    expr: ae,
                    low: alo,
                    high: ahi,
                    negated: an,
                },
                Expr::Between {
                    expr: be,
                    low: blo,
                    high: bhi,
                    negated: bn,
                },
            ) => an == bn && ae == be && alo == blo && ahi == bhi,
            (Expr::List(a), Expr::List(b)) => a == b,
            (Expr::StructLiteral(a), Expr::StructLiteral(b)) => a == b,
            // Sub-queries have no meaningful structural identity.
            (Expr::Subquery(_), Expr::Subquery(_)) => false,
            _ => false,
        }
    }
}

/// Sort direction for ORDER BY and GROUP ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// A sort or grouping key: either an expression or a 1-based reference to a
/// SELECT column (for ORDER BY / GROUP BY) or to a group-key tuple position
/// (for GROUP ORDER BY).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef {
    Expr(Expr),
    Position(usize),
}

/// ORDER BY key with direction
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub key: ColumnRef,
    pub direction: OrderDirection,
}

/// One SELECT column: an expression, an optional alias, and whether the
/// column's collection/map items should be expanded into the result sequence
/// (`EXPAND(expr)`).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expr: Expr,
    pub alias: Option<String>,
    pub expand: bool,
}

/// The SELECT list: `*` returns whole records, otherwise projected columns.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItems {
    Wildcard,
    Columns(Vec<SelectColumn>),
}

/// Parsed SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub distinct: bool,
    pub items: SelectItems,
}

impl Default for SelectClause {
    fn default() -> Self {
        SelectClause {
            distinct: false,
            items: SelectItems::Wildcard,
        }
    }
}

impl SelectClause {
    /// Whether the query returns the input records themselves rather than
    /// projected rows.
    pub fn wants_records(&self) -> bool {
        matches!(self.items, SelectItems::Wildcard)
    }

    /// The projected columns, empty for a wildcard select.
    pub fn columns(&self) -> &[SelectColumn] {
        match &self.items {
            SelectItems::Wildcard => &[],
            SelectItems::Columns(cols) => cols,
        }
    }
}

/// FROM target: a record type name, or `null` for the no-records sentinel.
/// In a sub-query the name is a dotted accessor path resolved against the
/// parent's current record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FromTarget {
    Type(String),
    #[default]
    Null,
}

/// Scope an EXECUTE ON expression list runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteOnScope {
    /// The full incoming record list, before WHERE
    All,
    /// The record list surviving the WHERE clause
    Results,
    /// Each group's member list, once per group
    GroupByResults,
}

impl ExecuteOnScope {
    pub fn label(&self) -> &'static str {
        match self {
            ExecuteOnScope::All => "ALL",
            ExecuteOnScope::Results => "RESULTS",
            ExecuteOnScope::GroupByResults => "GROUP_BY_RESULTS",
        }
    }
}

/// An EXECUTE ON expression with its result alias
#[derive(Debug, Clone, PartialEq)]
pub struct AliasedExpression {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// LIMIT clause: rows to skip and maximum rows to return. Both sides are
/// expressions so bind variables can size pagination at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitClause {
    pub offset: Expr,
    pub count: Expr,
}
