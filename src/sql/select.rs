//! Final statement assembly - SELECT/CTE structure shared by the
//! outer query and every pre-aggregation CTE built along the way.
//!
//! A [`Select`] is a plain value, not a mutable "query builder" object: the
//! executor constructs one per CTE and one for the outer query, then
//! threads a single [`Binder`] through all of them so parameter indices
//! stay globally consistent (the filter cache's deduplication depends on this).

use super::dialect::Dialect;
use super::expr::{Binder, SortDir, SqlExpr};
use super::token::{Token, TokenStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }

    /// The identifier other expressions should qualify columns with.
    pub fn ref_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Option<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Box<Select>,
}

/// A SELECT statement, optionally preceded by one or more CTEs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub ctes: Vec<Cte>,
    pub distinct: bool,
    pub select_list: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order_by: Vec<(SqlExpr, SortDir)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cte(mut self, name: impl Into<String>, query: Select) -> Self {
        self.ctes.push(Cte {
            name: name.into(),
            query: Box::new(query),
        });
        self
    }

    pub fn from(mut self, name: impl Into<String>, alias: Option<String>) -> Self {
        self.from = Some(TableRef::new(name, alias));
        self
    }

    pub fn join(mut self, join_type: JoinType, table: TableRef, on: Option<SqlExpr>) -> Self {
        self.joins.push(Join {
            join_type,
            table,
            on,
        });
        self
    }

    pub fn select(mut self, expr: SqlExpr, alias: Option<String>) -> Self {
        self.select_list.push(SelectItem { expr, alias });
        self
    }

    /// Convenience for tests and simple CTE bodies: select a bare column by name.
    pub fn select_raw(self, column: &str) -> Self {
        self.select(SqlExpr::column(column), None)
    }

    pub fn where_expr(mut self, expr: SqlExpr) -> Self {
        self.where_ = Some(match self.where_.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn group_by_expr(mut self, expr: SqlExpr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having_expr(mut self, expr: SqlExpr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by_expr(mut self, expr: SqlExpr, dir: SortDir) -> Self {
        self.order_by.push((expr, dir));
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn to_tokens(&self, dialect: Dialect, binder: &mut Binder) -> TokenStream {
        let mut ts = TokenStream::new();

        if !self.ctes.is_empty() {
            ts.push(Token::With).space();
            for (i, cte) in self.ctes.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(cte.name.clone())).space();
                ts.push(Token::As).space().lparen();
                ts.append(&cte.query.to_tokens(dialect, binder));
                ts.rparen();
            }
            ts.space();
        }

        ts.push(Token::Select).space();
        if self.distinct {
            ts.push(Token::Distinct).space();
        }
        if self.select_list.is_empty() {
            ts.push(Token::Star);
        } else {
            for (i, item) in self.select_list.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&item.expr.to_tokens(dialect, binder));
                if let Some(alias) = &item.alias {
                    ts.space().push(Token::As).space();
                    ts.push(Token::Ident(alias.clone()));
                }
            }
        }

        if let Some(from) = &self.from {
            ts.space().push(Token::From).space();
            ts.push(Token::Ident(from.name.clone()));
            if let Some(alias) = &from.alias {
                ts.space().push(Token::As).space();
                ts.push(Token::Ident(alias.clone()));
            }
        }

        for join in &self.joins {
            ts.space();
            push_join_keyword(&mut ts, join.join_type);
            ts.space().push(Token::Ident(join.table.name.clone()));
            if let Some(alias) = &join.table.alias {
                ts.space().push(Token::As).space();
                ts.push(Token::Ident(alias.clone()));
            }
            if let Some(on) = &join.on {
                ts.space().push(Token::On).space();
                ts.append(&on.to_tokens(dialect, binder));
            }
        }

        if let Some(where_) = &self.where_ {
            ts.space().push(Token::Where).space();
            ts.append(&where_.to_tokens(dialect, binder));
        }

        if !self.group_by.is_empty() {
            ts.space().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens(dialect, binder));
            }
        }

        if let Some(having) = &self.having {
            ts.space().push(Token::Having).space();
            ts.append(&having.to_tokens(dialect, binder));
        }

        if !self.order_by.is_empty() {
            ts.space().push(Token::OrderBy).space();
            for (i, (expr, dir)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens(dialect, binder));
                ts.space().push(match dir {
                    SortDir::Asc => Token::Asc,
                    SortDir::Desc => Token::Desc,
                });
            }
        }

        if let Some(limit) = self.limit {
            ts.space().push(Token::Limit).space();
            ts.push(Token::LitInt(limit));
        }
        if let Some(offset) = self.offset {
            ts.space().push(Token::Offset).space();
            ts.push(Token::LitInt(offset));
        }

        ts
    }

    /// Render this statement and return the SQL text plus collected params.
    pub fn compile(&self, dialect: Dialect) -> (String, Vec<serde_json::Value>) {
        let mut binder = Binder::new(dialect);
        let tokens = self.to_tokens(dialect, &mut binder);
        (tokens.serialize(dialect), binder.into_params())
    }
}

fn push_join_keyword(ts: &mut TokenStream, join_type: JoinType) {
    match join_type {
        JoinType::Inner => {
            ts.push(Token::Inner).space().push(Token::Join);
        }
        JoinType::Left => {
            ts.push(Token::Left).space().push(Token::Outer).space().push(Token::Join);
        }
        JoinType::Right => {
            ts.push(Token::Right).space().push(Token::Outer).space().push(Token::Join);
        }
        JoinType::Full => {
            ts.push(Token::Full).space().push(Token::Outer).space().push(Token::Join);
        }
        JoinType::Cross => {
            ts.push(Token::Cross).space().push(Token::Join);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_select() {
        let select = Select::new()
            .from("employees", None)
            .select(SqlExpr::column("id"), None)
            .where_expr(SqlExpr::column("active").eq(SqlExpr::Param(serde_json::Value::Bool(true))));
        let (sql, params) = select.compile(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT \"id\" FROM \"employees\" WHERE \"active\" = $1"
        );
        assert_eq!(params, vec![serde_json::Value::Bool(true)]);
    }

    #[test]
    fn test_cte_prefixes_outer_select() {
        let inner = Select::new()
            .from("productivity", Some("p".into()))
            .select(SqlExpr::table_column("p", "employee_id"), None);
        let outer = Select::new()
            .with_cte("cte_productivity", inner)
            .from("cte_productivity", None)
            .select(SqlExpr::Star, None);
        let (sql, _) = outer.compile(Dialect::Postgres);
        assert!(sql.starts_with("WITH \"cte_productivity\" AS (SELECT"));
        assert!(sql.contains(") SELECT * FROM \"cte_productivity\""));
    }

    #[test]
    fn test_left_join_renders_outer_keyword() {
        let select = Select::new().from("employees", Some("e".into())).join(
            JoinType::Left,
            TableRef::new("departments", Some("d".into())),
            Some(SqlExpr::table_column("e", "department_id").eq(SqlExpr::table_column("d", "id"))),
        );
        let (sql, _) = select.compile(Dialect::Postgres);
        assert!(sql.contains("LEFT OUTER JOIN \"departments\" AS \"d\" ON"));
    }
}
