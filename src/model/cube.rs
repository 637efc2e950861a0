//! Cube definitions - the named, secured unit of the semantic model.

use std::collections::HashMap;
use std::sync::Arc;

use super::dimension::Dimension;
use super::join::CubeJoin;
use super::measure::Measure;
use crate::query::context::QueryContext;
use crate::sql::expr::SqlExpr;
use crate::sql::select::TableRef;

/// The row-level-secured base relation a cube resolves to: `from` is the
/// table reference, `where_` an optional security predicate.
#[derive(Debug, Clone)]
pub struct CubeRelation {
    pub from: TableRef,
    pub where_: Option<SqlExpr>,
}

/// A cube's relation constructor - always invoked with the caller's
/// [`QueryContext`]; never cached across contexts.
pub type RelationResolver = Arc<dyn Fn(&QueryContext) -> CubeRelation + Send + Sync>;

#[derive(Clone)]
pub struct Cube {
    pub name: String,
    pub sql: RelationResolver,
    pub dimensions: HashMap<String, Dimension>,
    pub measures: HashMap<String, Measure>,
    pub joins: Vec<CubeJoin>,
}

impl Cube {
    pub fn new(name: impl Into<String>, sql: RelationResolver) -> Self {
        Self {
            name: name.into(),
            sql,
            dimensions: HashMap::new(),
            measures: HashMap::new(),
            joins: Vec::new(),
        }
    }

    pub fn with_dimension(mut self, dim: Dimension) -> Self {
        self.dimensions.insert(dim.name.clone(), dim);
        self
    }

    pub fn with_measure(mut self, name: impl Into<String>, measure: Measure) -> Self {
        self.measures.insert(name.into(), measure);
        self
    }

    pub fn with_join(mut self, join: CubeJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn join_to(&self, target_cube: &str) -> Option<&CubeJoin> {
        self.joins.iter().find(|j| j.target_cube == target_cube)
    }
}

impl std::fmt::Debug for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cube")
            .field("name", &self.name)
            .field("dimensions", &self.dimensions.keys().collect::<Vec<_>>())
            .field("measures", &self.measures.keys().collect::<Vec<_>>())
            .field("joins", &self.joins)
            .finish()
    }
}
