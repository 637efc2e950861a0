//! The compiler-internal query plan.

use std::collections::HashMap;

use crate::model::CubeJoin;
use crate::query::semantic_query::TimeDimensionRequest;
use crate::sql::expr::SqlExpr;

/// One hop of the BFS join traversal, carrying the join
/// definition used to reach `cube` from its predecessor in the plan.
#[derive(Debug, Clone)]
pub struct PlannedJoin {
    pub cube: String,
    pub join: CubeJoin,
}

/// `{ sourceColumn, targetColumn }` pair recorded for a pre-aggregation
/// CTE - joining and grouping happen off the source column
/// while aggregation happens inside the CTE.
#[derive(Debug, Clone)]
pub struct CteJoinKey {
    pub source_column: String,
    pub target_column: String,
}

/// A filter belonging to another selected cube, rewritten as an
/// `IN`/`EXISTS` subquery constraint on the CTE's cube.
#[derive(Debug, Clone)]
pub struct PropagatingFilter {
    pub source_cube: String,
    pub predicate: SqlExpr,
}

#[derive(Debug, Clone)]
pub struct CteInfo {
    pub cte_alias: String,
    pub cube: String,
    pub measures: Vec<String>,
    /// Requested plain dimensions of this cube, local member names, beyond
    /// whatever already appears among `join_keys`.
    pub dimensions: Vec<String>,
    /// Requested time dimensions of this cube, local member names.
    pub time_dimensions: Vec<TimeDimensionRequest>,
    pub join_keys: Vec<CteJoinKey>,
    pub propagating_filters: Vec<PropagatingFilter>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub primary_cube: String,
    pub join_cubes: Vec<PlannedJoin>,
    pub pre_aggregation_ctes: Vec<CteInfo>,
    /// `cubeName -> SQL[]` - computed once per cube so every consumer
    /// (main WHERE, CTE WHERE, propagating-filter subquery) shares the
    /// identical fragment and its parameters.
    pub pre_built_filters: HashMap<String, Vec<SqlExpr>>,
}

impl QueryPlan {
    pub fn cte_for(&self, cube: &str) -> Option<&CteInfo> {
        self.pre_aggregation_ctes.iter().find(|c| c.cube == cube)
    }

    pub fn is_cte_materialized(&self, cube: &str) -> bool {
        self.cte_for(cube).is_some()
    }
}

/// Deterministic CTE alias for a cube.
pub fn cte_alias(cube_name: &str) -> String {
    format!("cte_{}", to_snake_case(cube_name))
}

fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cte_alias_is_deterministic_snake_case() {
        assert_eq!(cte_alias("Productivity"), "cte_productivity");
        assert_eq!(cte_alias("OrderItems"), "cte_order_items");
    }
}
