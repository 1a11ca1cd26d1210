/*!
# Statement Parser

This module implements a recursive descent parser for the query language. The
parser converts statement text into the clause objects and expression tree the
execution pipeline consumes.

## Grammar Overview

```sql
SELECT [DISTINCT] field_list | *
FROM type_name | null
[WHERE condition]
[GROUP BY key_list]
[HAVING condition]
[ORDER BY order_list]
[GROUP ORDER BY order_list]
[LIMIT offset, count]
[GROUP LIMIT offset, count]
[EXECUTE ON {ALL | RESULTS | GROUP_BY_RESULTS} expr AS alias, ...]
```

- `field_list` items are `expr [AS alias]`; wrapping an item in `EXPAND(expr)`
  requests collection/map flattening.
- `key_list` / `order_list` items are an expression or a 1-based column
  index; order items take `ASC` / `DESC` (default `ASC`).
- Expressions support literals, dotted field accessors, `:name` / `?` bind
  variables, `@name` saved values, function calls, `{name: expr, ...}` struct
  literals, `(SELECT ...)` sub-queries, arithmetic, comparison, `LIKE`,
  `BETWEEN`, `IN`, `IS [NOT] NULL`, `AND` / `OR` / `NOT`.

## Architecture

Parsing is a two-phase process:

1. **Tokenization**: statement text becomes a stream of position-tagged
   tokens (identifiers, numbers, strings, symbols)
2. **Parsing**: recursive descent builds the clause objects, with operator
   precedence `OR < AND < NOT < comparison < additive < multiplicative <
   unary`

Keywords are case-insensitive. Errors carry the character position of the
offending token.
*/

use crate::recsql::sql::ast::{
    AliasedExpression, BinaryOperator, BindVarRef, ColumnRef, ExecuteOnScope, Expr, FromTarget,
    LimitClause, LiteralValue, OrderByExpr, OrderDirection, SelectClause, SelectColumn,
    SelectItems, UnaryOperator,
};
use crate::recsql::sql::error::{SqlError, SqlResult};
use crate::recsql::sql::query::Query;

/// Parse a complete statement into an initialized [`Query`].
pub fn parse_statement(statement: &str) -> SqlResult<Query> {
    let tokens = tokenize(statement)?;
    let mut parser = Parser::new(tokens);
    let mut query = parser.parse_query()?;
    parser.expect_eof()?;
    query.statement = Some(statement.to_string());
    query.init()?;
    Ok(query)
}

/// Parse a standalone order-by fragment ("name DESC, 2 ASC"), as accepted by
/// [`Query::reorder_str`]. A leading `ORDER BY` is permitted.
pub fn parse_order_by_fragment(fragment: &str) -> SqlResult<Vec<OrderByExpr>> {
    let tokens = tokenize(fragment)?;
    let mut parser = Parser::new(tokens);
    if parser.eat_keyword("ORDER") {
        parser.expect_keyword("BY")?;
    }
    let order_by = parser.parse_order_list()?;
    parser.expect_eof()?;
    Ok(order_by)
}

// ---- Tokenizer ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(&'static str),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(input: &str) -> SqlResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let pos = i;

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                pos,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| {
                    SqlError::parse_error(format!("invalid number: {}", text), Some(pos))
                })?;
                tokens.push(Token {
                    kind: TokenKind::Float(value),
                    pos,
                });
            } else {
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<i64>().map_err(|_| {
                    SqlError::parse_error(format!("invalid number: {}", text), Some(pos))
                })?;
                tokens.push(Token {
                    kind: TokenKind::Int(value),
                    pos,
                });
            }
            continue;
        }

        if c == '\'' {
            i += 1;
            let mut value = String::new();
            loop {
                if i >= chars.len() {
                    return Err(SqlError::parse_error("unclosed string literal", Some(pos)));
                }
                if chars[i] == '\'' {
                    // Doubled quote is an escaped quote
                    if i + 1 < chars.len() && chars[i + 1] == '\'' {
                        value.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                value.push(chars[i]);
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Str(value),
                pos,
            });
            continue;
        }

        // Two-character operators first
        let two: Option<&'static str> = if i + 1 < chars.len() {
            match (c, chars[i + 1]) {
                ('!', '=') => Some("!="),
                ('<', '>') => Some("<>"),
                ('<', '=') => Some("<="),
                ('>', '=') => Some(">="),
                _ => None,
            }
        } else {
            None
        };
        if let Some(sym) = two {
            tokens.push(Token {
                kind: TokenKind::Sym(sym),
                pos,
            });
            i += 2;
            continue;
        }

        let single: &'static str = match c {
            '(' => "(",
            ')' => ")",
            '{' => "{",
            '}' => "}",
            ',' => ",",
            '.' => ".",
            ':' => ":",
            '@' => "@",
            '?' => "?",
            '*' => "*",
            '+' => "+",
            '-' => "-",
            '/' => "/",
            '=' => "=",
            '<' => "<",
            '>' => ">",
            other => {
                return Err(SqlError::parse_error(
                    format!("unexpected character: {}", other),
                    Some(pos),
                ))
            }
        };
        tokens.push(Token {
            kind: TokenKind::Sym(single),
            pos,
        });
        i += 1;
    }

    Ok(tokens)
}

// ---- Parser -------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    anon_index: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            anon_index: 0,
        }
    }

    // -- token helpers --

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn current_pos(&self) -> Option<usize> {
        self.tokens.get(self.pos).map(|t| t.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(id)) if id.eq_ignore_ascii_case(keyword))
    }

    fn peek_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(TokenKind::Ident(id)) if id.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> SqlResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {}", keyword)))
        }
    }

    fn peek_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Sym(s)) if *s == sym)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.peek_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> SqlResult<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{}'", sym)))
        }
    }

    fn expect_ident(&mut self) -> SqlResult<String> {
        if matches!(self.peek(), Some(TokenKind::Ident(_))) {
            if let Some(Token {
                kind: TokenKind::Ident(id),
                ..
            }) = self.advance()
            {
                return Ok(id);
            }
        }
        Err(self.error_here("expected identifier"))
    }

    fn expect_eof(&mut self) -> SqlResult<()> {
        if self.pos < self.tokens.len() {
            Err(self.error_here("unexpected trailing input"))
        } else {
            Ok(())
        }
    }

    fn error_here(&self, message: impl Into<String>) -> SqlError {
        SqlError::parse_error(message, self.current_pos())
    }

    // -- statement --

    fn parse_query(&mut self) -> SqlResult<Query> {
        self.expect_keyword("SELECT")?;
        let distinct = self.eat_keyword("DISTINCT");

        let items = if self.eat_sym("*") {
            SelectItems::Wildcard
        } else {
            SelectItems::Columns(self.parse_select_columns()?)
        };

        self.expect_keyword("FROM")?;
        let from = if self.eat_keyword("NULL") {
            FromTarget::Null
        } else {
            FromTarget::Type(self.parse_dotted_name()?)
        };

        let mut query = Query {
            select: SelectClause { distinct, items },
            from,
            ..Query::default()
        };

        loop {
            if self.eat_keyword("WHERE") {
                query.where_clause = Some(self.parse_expr()?);
            } else if self.eat_keyword("HAVING") {
                query.having = Some(self.parse_expr()?);
            } else if self.peek_keyword("GROUP") {
                self.pos += 1;
                if self.eat_keyword("BY") {
                    query.group_by = Some(self.parse_key_list()?);
                } else if self.eat_keyword("ORDER") {
                    self.expect_keyword("BY")?;
                    query.group_order_by = Some(self.parse_order_list()?);
                } else if self.eat_keyword("LIMIT") {
                    query.group_limit = Some(self.parse_limit()?);
                } else {
                    return Err(self.error_here("expected BY, ORDER BY or LIMIT after GROUP"));
                }
            } else if self.eat_keyword("ORDER") {
                self.expect_keyword("BY")?;
                query.order_by = Some(self.parse_order_list()?);
            } else if self.eat_keyword("LIMIT") {
                query.limit = Some(self.parse_limit()?);
            } else if self.eat_keyword("EXECUTE") {
                self.expect_keyword("ON")?;
                let (scope, expressions) = self.parse_execute_on()?;
                query.execute_on.entry(scope).or_default().extend(expressions);
            } else {
                break;
            }
        }

        Ok(query)
    }

    fn parse_select_columns(&mut self) -> SqlResult<Vec<SelectColumn>> {
        let mut cols = Vec::new();
        loop {
            let expand = self.peek_keyword("EXPAND") && self.peek_sym_at(1, "(");
            let expr = if expand {
                self.pos += 1;
                self.expect_sym("(")?;
                let expr = self.parse_expr()?;
                self.expect_sym(")")?;
                expr
            } else {
                self.parse_expr()?
            };

            let alias = if self.eat_keyword("AS") {
                Some(self.expect_ident()?)
            } else {
                None
            };

            cols.push(SelectColumn {
                expr,
                alias,
                expand,
            });

            if !self.eat_sym(",") {
                break;
            }
        }
        Ok(cols)
    }

    fn peek_sym_at(&self, offset: usize, sym: &str) -> bool {
        matches!(self.peek_at(offset), Some(TokenKind::Sym(s)) if *s == sym)
    }

    fn parse_dotted_name(&mut self) -> SqlResult<String> {
        let mut name = self.expect_ident()?;
        while self.eat_sym(".") {
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    /// GROUP BY keys: a 1-based column index or an expression.
    fn parse_key_list(&mut self) -> SqlResult<Vec<ColumnRef>> {
        let mut keys = Vec::new();
        loop {
            keys.push(self.parse_column_ref()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        Ok(keys)
    }

    fn parse_column_ref(&mut self) -> SqlResult<ColumnRef> {
        if let Some(TokenKind::Int(value)) = self.peek() {
            let value = *value;
            if value >= 0 {
                self.pos += 1;
                return Ok(ColumnRef::Position(value as usize));
            }
        }
        Ok(ColumnRef::Expr(self.parse_expr()?))
    }

    fn parse_order_list(&mut self) -> SqlResult<Vec<OrderByExpr>> {
        let mut items = Vec::new();
        loop {
            let key = self.parse_column_ref()?;
            let direction = if self.eat_keyword("DESC") {
                OrderDirection::Desc
            } else {
                self.eat_keyword("ASC");
                OrderDirection::Asc
            };
            items.push(OrderByExpr { key, direction });
            if !self.eat_sym(",") {
                break;
            }
        }
        Ok(items)
    }

    /// `LIMIT count` or `LIMIT offset, count`.
    fn parse_limit(&mut self) -> SqlResult<LimitClause> {
        let first = self.parse_expr()?;
        if self.eat_sym(",") {
            let count = self.parse_expr()?;
            Ok(LimitClause {
                offset: first,
                count,
            })
        } else {
            Ok(LimitClause {
                offset: Expr::Literal(LiteralValue::Integer(0)),
                count: first,
            })
        }
    }

    fn parse_execute_on(&mut self) -> SqlResult<(ExecuteOnScope, Vec<AliasedExpression>)> {
        let scope_name = self.expect_ident()?;
        let scope = match scope_name.to_uppercase().as_str() {
            "ALL" => ExecuteOnScope::All,
            "RESULTS" => ExecuteOnScope::Results,
            "GROUP_BY_RESULTS" => ExecuteOnScope::GroupByResults,
            other => {
                return Err(self.error_here(format!(
                    "expected ALL, RESULTS or GROUP_BY_RESULTS, got {}",
                    other
                )))
            }
        };

        let mut expressions = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let alias = if self.eat_keyword("AS") {
                Some(self.expect_ident()?)
            } else {
                None
            };
            expressions.push(AliasedExpression { expr, alias });
            if !self.eat_sym(",") {
                break;
            }
        }
        Ok((scope, expressions))
    }

    // -- expressions --

    fn parse_expr(&mut self) -> SqlResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> SqlResult<Expr> {
        if self.eat_keyword("NOT") {
            let expr = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> SqlResult<Expr> {
        let left = self.parse_additive()?;

        // Postfix IS [NOT] NULL
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::UnaryOp {
                op: if negated {
                    UnaryOperator::IsNotNull
                } else {
                    UnaryOperator::IsNull
                },
                expr: Box::new(left),
            });
        }

        // x NOT BETWEEN / NOT LIKE / NOT IN
        let negated = if self.peek_keyword("NOT")
            && (self.peek_keyword_at(1, "BETWEEN")
                || self.peek_keyword_at(1, "LIKE")
                || self.peek_keyword_at(1, "IN"))
        {
            self.pos += 1;
            true
        } else {
            false
        };

        if self.eat_keyword("BETWEEN") {
            let low = self.parse_additive()?;
            self.expect_keyword("AND")?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        if self.eat_keyword("LIKE") {
            let right = self.parse_additive()?;
            return Ok(Expr::BinaryOp {
                left: Box::new(left),
                op: if negated {
                    BinaryOperator::NotLike
                } else {
                    BinaryOperator::Like
                },
                right: Box::new(right),
            });
        }

        if self.eat_keyword("IN") {
            let right = self.parse_in_operand()?;
            return Ok(Expr::BinaryOp {
                left: Box::new(left),
                op: if negated {
                    BinaryOperator::NotIn
                } else {
                    BinaryOperator::In
                },
                right: Box::new(right),
            });
        }

        if negated {
            return Err(self.error_here("expected BETWEEN, LIKE or IN after NOT"));
        }

        let op = if self.eat_sym("=") {
            Some(BinaryOperator::Equal)
        } else if self.eat_sym("!=") || self.eat_sym("<>") {
            Some(BinaryOperator::NotEqual)
        } else if self.eat_sym("<=") {
            Some(BinaryOperator::LessThanOrEqual)
        } else if self.eat_sym(">=") {
            Some(BinaryOperator::GreaterThanOrEqual)
        } else if self.eat_sym("<") {
            Some(BinaryOperator::LessThan)
        } else if self.eat_sym(">") {
            Some(BinaryOperator::GreaterThan)
        } else {
            None
        };

        match op {
            Some(op) => {
                let right = self.parse_additive()?;
                Ok(Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }
            None => Ok(left),
        }
    }

    /// The right side of IN: a parenthesized list, or any expression
    /// evaluating to a collection (a sub-query included).
    fn parse_in_operand(&mut self) -> SqlResult<Expr> {
        if self.peek_sym("(") && !self.peek_keyword_at(1, "SELECT") {
            self.expect_sym("(")?;
            let mut items = Vec::new();
            loop {
                items.push(self.parse_expr()?);
                if !self.eat_sym(",") {
                    break;
                }
            }
            self.expect_sym(")")?;
            return Ok(Expr::List(items));
        }
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinaryOperator::Add
            } else if self.eat_sym("-") {
                BinaryOperator::Subtract
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> SqlResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinaryOperator::Multiply
            } else if self.eat_sym("/") {
                BinaryOperator::Divide
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> SqlResult<Expr> {
        if self.eat_sym("-") {
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> SqlResult<Expr> {
        // Parenthesized expression or sub-query
        if self.peek_sym("(") {
            if self.peek_keyword_at(1, "SELECT") {
                self.expect_sym("(")?;
                let mut inner = self.parse_query()?;
                self.expect_sym(")")?;
                inner.init()?;
                return Ok(Expr::Subquery(Box::new(inner)));
            }
            self.expect_sym("(")?;
            let expr = self.parse_expr()?;
            self.expect_sym(")")?;
            return Ok(expr);
        }

        // Struct literal
        if self.eat_sym("{") {
            let mut fields = Vec::new();
            if !self.peek_sym("}") {
                loop {
                    let name = self.expect_ident()?;
                    self.expect_sym(":")?;
                    let value = self.parse_expr()?;
                    fields.push((name, value));
                    if !self.eat_sym(",") {
                        break;
                    }
                }
            }
            self.expect_sym("}")?;
            return Ok(Expr::StructLiteral(fields));
        }

        // Named bind variable with optional accessor path
        if self.eat_sym(":") {
            let name = self.expect_ident()?;
            let mut path = Vec::new();
            while self.eat_sym(".") {
                path.push(self.expect_ident()?);
            }
            return Ok(Expr::BindVariable {
                var: BindVarRef::Named(name.to_lowercase()),
                path,
            });
        }

        // Anonymous bind variable: consecutive 1-based indices, shared with
        // nested sub-queries
        if self.eat_sym("?") {
            self.anon_index += 1;
            return Ok(Expr::BindVariable {
                var: BindVarRef::Indexed(self.anon_index),
                path: Vec::new(),
            });
        }

        // Saved value with optional accessor path
        if self.eat_sym("@") {
            let name = self.expect_ident()?;
            let mut path = Vec::new();
            while self.eat_sym(".") {
                path.push(self.expect_ident()?);
            }
            return Ok(Expr::SavedValue {
                name: name.to_lowercase(),
                path,
            });
        }

        match self.peek().cloned() {
            Some(TokenKind::Str(value)) => {
                self.pos += 1;
                Ok(Expr::Literal(LiteralValue::String(value)))
            }
            Some(TokenKind::Int(value)) => {
                self.pos += 1;
                Ok(Expr::Literal(LiteralValue::Integer(value)))
            }
            Some(TokenKind::Float(value)) => {
                self.pos += 1;
                Ok(Expr::Literal(LiteralValue::Float(value)))
            }
            Some(TokenKind::Ident(id)) => {
                if id.eq_ignore_ascii_case("TRUE") {
                    self.pos += 1;
                    return Ok(Expr::Literal(LiteralValue::Boolean(true)));
                }
                if id.eq_ignore_ascii_case("FALSE") {
                    self.pos += 1;
                    return Ok(Expr::Literal(LiteralValue::Boolean(false)));
                }
                if id.eq_ignore_ascii_case("NULL") {
                    self.pos += 1;
                    return Ok(Expr::Literal(LiteralValue::Null));
                }

                // Function call
                if self.peek_sym_at(1, "(") {
                    self.pos += 2;
                    let mut args = Vec::new();
                    if self.eat_sym("*") {
                        // count(*) form: no arguments
                        self.expect_sym(")")?;
                        return Ok(Expr::Function {
                            name: id.to_lowercase(),
                            args,
                        });
                    }
                    if !self.peek_sym(")") {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat_sym(",") {
                                break;
                            }
                        }
                    }
                    self.expect_sym(")")?;
                    return Ok(Expr::Function {
                        name: id.to_lowercase(),
                        args,
                    });
                }

                // Dotted field access
                self.pos += 1;
                let mut path = vec![id];
                while self.peek_sym(".") && matches!(self.peek_at(1), Some(TokenKind::Ident(_))) {
                    self.pos += 1;
                    path.push(self.expect_ident()?);
                }
                Ok(Expr::FieldAccess(path))
            }
            _ => Err(self.error_here("expected expression")),
        }
    }
}
