//! Dimension definitions.

use std::sync::Arc;

use super::types::DataType;
use crate::query::context::QueryContext;
use crate::sql::expr::SqlExpr;

/// A cube field, dimension expression, or security predicate resolved
/// against a request's [`QueryContext`]. Wrapped in `Arc` so the same cube definition can be
/// shared read-only across concurrent compilations.
pub type ExprResolver = Arc<dyn Fn(&QueryContext) -> SqlExpr + Send + Sync>;

/// Build an [`ExprResolver`] from a plain column reference - the common
/// case for dimensions and measure base expressions that don't need the
/// security context at all.
pub fn column_resolver(table: impl Into<String>, column: impl Into<String>) -> ExprResolver {
    let table = table.into();
    let column = column.into();
    Arc::new(move |_ctx| SqlExpr::table_column(table.clone(), column.clone()))
}

#[derive(Clone)]
pub struct Dimension {
    pub name: String,
    pub data_type: DataType,
    pub sql: ExprResolver,
    pub primary_key: bool,
}

impl Dimension {
    pub fn new(name: impl Into<String>, data_type: DataType, sql: ExprResolver) -> Self {
        Self {
            name: name.into(),
            data_type,
            sql,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self, is_pk: bool) -> Self {
        self.primary_key = is_pk;
        self
    }
}

impl std::fmt::Debug for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}
