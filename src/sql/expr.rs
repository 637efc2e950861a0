//! The fragment algebra - an immutable, parameterized
//! representation of a SQL scalar expression.
//!
//! Every [`SqlExpr`] tree is a plain value: composing it never mutates a
//! shared buffer, and rendering it twice (e.g. once inside a pre-aggregation
//! CTE, once in the outer query) produces independent output each time -
//! there is no mutable builder object to share in the first place.
//!
//! User-supplied values are carried in [`SqlExpr::Param`] and only ever
//! reach the output as a placeholder (`$1`, `?`, ...) via [`Binder`] -
//! they never appear as literal text in the compiled SQL.

use std::collections::HashMap;

use serde_json::Value;

use super::dialect::Dialect;
use super::select::Select;
use super::token::{Token, TokenStream};

/// Accumulates parameters in emission order and assigns each a stable index.
///
/// One `Binder` is owned by a single compilation (filter caches
/// and builder instances are request-local); it is never shared across
/// threads or across compilations. Binding the same value twice - whether
/// from one cached filter fragment spliced into two places, or two
/// unrelated filters that happen to compare against the same literal -
/// reuses the earlier placeholder instead of appending a duplicate, which
/// is what ultimately gives the compiled parameter list its "each distinct
/// value appears once" guarantee; the Filter Cache
/// only has to guarantee identical fragment *shape*; this is where the
/// identical *value* collapses to one placeholder.
#[derive(Debug, Clone, Default)]
pub struct Binder {
    dialect: Dialect,
    params: Vec<Value>,
    dedup: HashMap<String, usize>,
}

impl Binder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
            dedup: HashMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Record a value and return the token that refers to it, reusing an
    /// existing placeholder if this exact value was already bound.
    pub fn bind(&mut self, value: Value) -> Token {
        let key = serde_json::to_string(&value).unwrap_or_default();
        if let Some(&index) = self.dedup.get(&key) {
            return Token::Placeholder(index);
        }
        let index = self.params.len();
        self.dedup.insert(key, index);
        self.params.push(value);
        Token::Placeholder(index)
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// An immutable, parameterized SQL scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// `table.column`, or bare `column` when `table` is `None`.
    Column { table: Option<String>, column: String },

    /// A bound user value - rendered exclusively as a placeholder.
    Param(Value),

    /// A compiler-authored constant (never user-controlled) - e.g. the
    /// granularity keyword baked into a `DATE_TRUNC` call, or `NULL`.
    Literal(Literal),

    BinaryOp {
        left: Box<SqlExpr>,
        op: BinaryOperator,
        right: Box<SqlExpr>,
    },

    UnaryOp {
        op: UnaryOperator,
        expr: Box<SqlExpr>,
    },

    /// Function or aggregate call.
    Call {
        name: String,
        args: Vec<SqlExpr>,
        distinct: bool,
    },

    /// `agg(...) FILTER (WHERE cond)` - only emitted when the dialect
    /// supports it; callers otherwise wrap the aggregate argument in
    /// `CASE WHEN` themselves and never construct this variant.
    AggregateFilter {
        aggregate: Box<SqlExpr>,
        condition: Box<SqlExpr>,
    },

    /// `CAST(expr AS type_name)`. `type_name` is always a compiler-chosen
    /// keyword (see [`super::dialect::CastTarget`]), never user text.
    Cast {
        expr: Box<SqlExpr>,
        type_name: String,
    },

    /// Ordered-set aggregate: `name(args) WITHIN GROUP (ORDER BY order_by)`.
    /// Used for PostgreSQL's `PERCENTILE_CONT`/`PERCENTILE_DISC`.
    WithinGroup {
        name: String,
        args: Vec<SqlExpr>,
        order_by: Box<SqlExpr>,
    },

    /// `INTERVAL amount unit` - `amount` may itself be a computed
    /// expression (e.g. MySQL's `INTERVAL WEEKDAY(col) DAY`), not just a
    /// literal count.
    Interval {
        amount: Box<SqlExpr>,
        unit: &'static str,
    },

    /// A binary operator with no [`BinaryOperator`] variant - dialect
    /// string-matching spellings (`~`, `!~`, `REGEXP`, `ILIKE`) that don't
    /// exist on every engine and so don't belong in the shared enum.
    Infix {
        left: Box<SqlExpr>,
        op: &'static str,
        right: Box<SqlExpr>,
    },

    /// `EXTRACT(field FROM expr)`.
    Extract {
        field: &'static str,
        expr: Box<SqlExpr>,
    },

    Case {
        operand: Option<Box<SqlExpr>>,
        when_then: Vec<(SqlExpr, SqlExpr)>,
        else_: Option<Box<SqlExpr>>,
    },

    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
        negated: bool,
    },

    In {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },

    /// `expr IN (SELECT ...)` - single-key propagating filter.
    InSubquery {
        expr: Box<SqlExpr>,
        subquery: Box<Select>,
        negated: bool,
    },

    /// `EXISTS (SELECT 1 FROM ... WHERE ...)` - composite-key propagating filter.
    Exists {
        subquery: Box<Select>,
        negated: bool,
    },

    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },

    /// `function(...) OVER (PARTITION BY ... ORDER BY ... <frame>)`.
    Window {
        function: Box<SqlExpr>,
        partition_by: Vec<SqlExpr>,
        order_by: Vec<(SqlExpr, SortDir)>,
        frame: Option<String>,
    },

    Paren(Box<SqlExpr>),

    Star,

    /// Trusted, compiler-authored SQL text. Never built from user input.
    Raw(String),

    /// A calculated-measure template after substitution - literal
    /// template text interleaved with the resolved child fragments it
    /// referenced. Rendering splices each child's own tokens (and so its
    /// own bound parameters) in place rather than flattening everything to
    /// a string first, preserving per-fragment parameter ownership.
    Template(Vec<TemplatePart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Fragment(Box<SqlExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SqlExpr {
    pub fn column(column: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: None,
            column: column.into(),
        }
    }

    pub fn table_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<SqlExpr>, distinct: bool) -> Self {
        SqlExpr::Call {
            name: name.into(),
            args,
            distinct,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        SqlExpr::Raw(sql.into())
    }

    pub fn null() -> Self {
        SqlExpr::Literal(Literal::Null)
    }

    pub fn cast(self, type_name: impl Into<String>) -> Self {
        SqlExpr::Cast {
            expr: Box::new(self),
            type_name: type_name.into(),
        }
    }

    pub fn infix(self, op: &'static str, right: SqlExpr) -> Self {
        SqlExpr::Infix {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn extract(field: &'static str, expr: SqlExpr) -> Self {
        SqlExpr::Extract {
            field,
            expr: Box::new(expr),
        }
    }

    pub fn not(self) -> Self {
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self),
        }
    }

    pub fn and(self, other: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            left: Box::new(self),
            op: BinaryOperator::And,
            right: Box::new(other),
        }
    }

    pub fn or(self, other: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            left: Box::new(self),
            op: BinaryOperator::Or,
            right: Box::new(other),
        }
    }

    pub fn concat(self, other: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            left: Box::new(self),
            op: BinaryOperator::Concat,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            left: Box::new(self),
            op: BinaryOperator::Eq,
            right: Box::new(other),
        }
    }

    /// Fold a list of predicates with `AND`, or `None` if the list is empty.
    pub fn conjunction(mut preds: Vec<SqlExpr>) -> Option<SqlExpr> {
        if preds.is_empty() {
            return None;
        }
        let mut acc = preds.remove(0);
        for p in preds {
            acc = acc.and(p);
        }
        Some(acc)
    }

    pub fn to_tokens(&self, dialect: Dialect, binder: &mut Binder) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            SqlExpr::Column { table, column } => {
                ts.push(Token::QualifiedIdent {
                    table: table.clone(),
                    name: column.clone(),
                });
            }
            SqlExpr::Param(value) => {
                ts.push(binder.bind(value.clone()));
            }
            SqlExpr::Literal(lit) => ts.push(literal_token(lit)),
            SqlExpr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens(dialect, binder));
                ts.space().push(binary_op_token(*op)).space();
                ts.append(&right.to_tokens(dialect, binder));
            }
            SqlExpr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => {
                    ts.push(Token::Not).space();
                    ts.append(&expr.to_tokens(dialect, binder));
                }
                UnaryOperator::Minus => {
                    ts.push(Token::Minus);
                    ts.append(&expr.to_tokens(dialect, binder));
                }
            },
            SqlExpr::Call {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone())).lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens(dialect, binder));
                }
                ts.rparen();
            }
            SqlExpr::AggregateFilter {
                aggregate,
                condition,
            } => {
                ts.append(&aggregate.to_tokens(dialect, binder));
                ts.space().push(Token::Raw("FILTER".into())).space().lparen();
                ts.push(Token::Where).space();
                ts.append(&condition.to_tokens(dialect, binder));
                ts.rparen();
            }
            SqlExpr::Cast { expr, type_name } => {
                ts.push(Token::Raw("CAST".into())).lparen();
                ts.append(&expr.to_tokens(dialect, binder));
                ts.space().push(Token::As).space();
                ts.push(Token::Raw(type_name.clone()));
                ts.rparen();
            }
            SqlExpr::WithinGroup {
                name,
                args,
                order_by,
            } => {
                ts.push(Token::FunctionName(name.clone())).lparen();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens(dialect, binder));
                }
                ts.rparen().space();
                ts.push(Token::Raw("WITHIN GROUP".into())).space().lparen();
                ts.push(Token::OrderBy).space();
                ts.append(&order_by.to_tokens(dialect, binder));
                ts.rparen();
            }
            SqlExpr::Infix { left, op, right } => {
                ts.append(&left.to_tokens(dialect, binder));
                ts.space().push(Token::Raw((*op).into())).space();
                ts.append(&right.to_tokens(dialect, binder));
            }
            SqlExpr::Interval { amount, unit } => {
                ts.push(Token::Raw("INTERVAL".into())).space();
                ts.append(&amount.to_tokens(dialect, binder));
                ts.space().push(Token::Raw((*unit).into()));
            }
            SqlExpr::Extract { field, expr } => {
                ts.push(Token::Raw("EXTRACT".into())).lparen();
                ts.push(Token::Raw((*field).into())).space();
                ts.push(Token::Raw("FROM".into())).space();
                ts.append(&expr.to_tokens(dialect, binder));
                ts.rparen();
            }
            SqlExpr::Case {
                operand,
                when_then,
                else_,
            } => {
                ts.push(Token::Case).space();
                if let Some(op) = operand {
                    ts.append(&op.to_tokens(dialect, binder)).space();
                }
                for (when, then) in when_then {
                    ts.push(Token::When).space();
                    ts.append(&when.to_tokens(dialect, binder));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens(dialect, binder));
                    ts.space();
                }
                if let Some(e) = else_ {
                    ts.push(Token::Else).space();
                    ts.append(&e.to_tokens(dialect, binder));
                    ts.space();
                }
                ts.push(Token::End);
            }
            SqlExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                ts.append(&expr.to_tokens(dialect, binder));
                ts.space();
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Between).space();
                ts.append(&low.to_tokens(dialect, binder));
                ts.space().push(Token::And).space();
                ts.append(&high.to_tokens(dialect, binder));
            }
            SqlExpr::In {
                expr,
                list,
                negated,
            } => {
                ts.append(&expr.to_tokens(dialect, binder));
                ts.space();
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::In).lparen();
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&item.to_tokens(dialect, binder));
                }
                ts.rparen();
            }
            SqlExpr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                ts.append(&expr.to_tokens(dialect, binder));
                ts.space();
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::In).lparen();
                ts.append(&subquery.to_tokens(dialect, binder));
                ts.rparen();
            }
            SqlExpr::Exists { subquery, negated } => {
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Exists).lparen();
                ts.append(&subquery.to_tokens(dialect, binder));
                ts.rparen();
            }
            SqlExpr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens(dialect, binder));
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }
            SqlExpr::Window {
                function,
                partition_by,
                order_by,
                frame,
            } => {
                ts.append(&function.to_tokens(dialect, binder));
                ts.space().push(Token::Over).space().lparen();
                if !partition_by.is_empty() {
                    ts.push(Token::PartitionBy).space();
                    for (i, e) in partition_by.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&e.to_tokens(dialect, binder));
                    }
                    if !order_by.is_empty() || frame.is_some() {
                        ts.space();
                    }
                }
                if !order_by.is_empty() {
                    ts.push(Token::OrderBy).space();
                    for (i, (e, dir)) in order_by.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&e.to_tokens(dialect, binder));
                        ts.space().push(match dir {
                            SortDir::Asc => Token::Asc,
                            SortDir::Desc => Token::Desc,
                        });
                    }
                    if frame.is_some() {
                        ts.space();
                    }
                }
                if let Some(f) = frame {
                    ts.push(Token::Raw(f.clone()));
                }
                ts.rparen();
            }
            SqlExpr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens(dialect, binder));
                ts.rparen();
            }
            SqlExpr::Star => {
                ts.push(Token::Star);
            }
            SqlExpr::Raw(s) => {
                ts.push(Token::Raw(s.clone()));
            }
            SqlExpr::Template(parts) => {
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => {
                            ts.push(Token::Raw(text.clone()));
                        }
                        TemplatePart::Fragment(expr) => {
                            ts.lparen();
                            ts.append(&expr.to_tokens(dialect, binder));
                            ts.rparen();
                        }
                    }
                }
            }
        }
        ts
    }
}

fn literal_token(lit: &Literal) -> Token {
    match lit {
        Literal::Int(n) => Token::LitInt(*n),
        Literal::Float(f) => Token::LitFloat(*f),
        Literal::Str(s) => Token::LitString(s.clone()),
        Literal::Bool(b) => Token::LitBool(*b),
        Literal::Null => Token::LitNull,
    }
}

fn binary_op_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Mod => Token::Mod,
        BinaryOperator::Concat => Token::Concat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_never_inlined() {
        let expr = SqlExpr::column("organisation_id").eq(SqlExpr::Param(Value::from(42)));
        let mut binder = Binder::new(Dialect::Postgres);
        let sql = expr.to_tokens(Dialect::Postgres, &mut binder).serialize(Dialect::Postgres);
        assert_eq!(sql, "\"organisation_id\" = $1");
        assert_eq!(binder.into_params(), vec![Value::from(42)]);
    }

    #[test]
    fn test_param_injection_value_never_in_sql_text() {
        let malicious = "abc\u{0}; DROP TABLE employees;--";
        let expr = SqlExpr::column("name").eq(SqlExpr::Param(Value::from(malicious)));
        let mut binder = Binder::new(Dialect::MySql);
        let sql = expr
            .to_tokens(Dialect::MySql, &mut binder)
            .serialize(Dialect::MySql);
        assert!(!sql.contains("DROP TABLE"));
        assert!(!sql.contains(';'));
        assert_eq!(binder.into_params(), vec![Value::from(malicious)]);
    }

    #[test]
    fn test_binder_dedups_identical_values() {
        let mut binder = Binder::new(Dialect::Postgres);
        let first = binder.bind(Value::from(7));
        let second = binder.bind(Value::from(7));
        let third = binder.bind(Value::from(8));
        assert_eq!(first, Token::Placeholder(0));
        assert_eq!(second, Token::Placeholder(0));
        assert_eq!(third, Token::Placeholder(1));
        assert_eq!(binder.into_params(), vec![Value::from(7), Value::from(8)]);
    }

    #[test]
    fn test_in_subquery_renders_single_select() {
        use super::super::select::Select;
        let inner = Select::new().from("employees", None).select_raw("id");
        let expr = SqlExpr::InSubquery {
            expr: Box::new(SqlExpr::table_column("productivity", "employee_id")),
            subquery: Box::new(inner),
            negated: false,
        };
        let mut binder = Binder::new(Dialect::Postgres);
        let sql = expr
            .to_tokens(Dialect::Postgres, &mut binder)
            .serialize(Dialect::Postgres);
        assert!(sql.starts_with("\"productivity\".\"employee_id\" IN (SELECT"));
    }
}
