//! GroupByBuilder - whether GROUP BY is emitted at all, and which
//! column represents each requested dimension.

use crate::error::{CompileError, Result};
use crate::model::CubeRegistry;
use crate::query::context::QueryContext;
use crate::query::plan::CteInfo;
use crate::resolver;
use crate::sql::expr::SqlExpr;

/// GROUP BY is emitted iff the query has at least one aggregate measure (a
/// post-aggregation window's base measure counts, since it's folded into
/// the inner aggregation layer before the window runs) - never for
/// dimension-only or window-only-over-raw-rows queries.
pub fn should_emit_group_by(aggregate_measure_count: usize) -> bool {
    aggregate_measure_count > 0
}

/// The GROUP BY column for one requested dimension or time dimension.
///
/// - If the owning cube is materialized as a pre-aggregation CTE and this
///   dimension is exactly the join key the CTE was joined on, group by the
///   *main-table* column (`main_table_join_key`) instead of the CTE's - the
///   CTE's own `GROUP BY` already grouped on it, and grouping the outer
///   query by the main table's copy keeps the join key out of the CTE's
///   select list from mattering twice.
/// - Otherwise, if the cube is CTE-materialized, group by the CTE's column.
/// - Otherwise, group by the cube's own resolved expression.
///
/// Join-key columns are never added to GROUP BY solely for joinability -
/// callers only reach this function for dimensions the query actually asked
/// for.
pub fn resolve_group_by_column(
    registry: &CubeRegistry,
    ctx: &QueryContext,
    qualified: &str,
    cte: Option<&CteInfo>,
    main_table_join_key: Option<(&str, &str)>,
) -> Result<SqlExpr> {
    let (cube, member) = registry.resolve_member(qualified)?;

    if let Some(cte) = cte {
        if let Some((table, column)) = main_table_join_key {
            return Ok(SqlExpr::table_column(table.to_string(), column.to_string()));
        }
        return Ok(SqlExpr::table_column(cte.cte_alias.clone(), member.to_string()));
    }

    let dim = cube
        .dimensions
        .get(member)
        .ok_or_else(|| CompileError::UnknownMember(qualified.to_string()))?;
    Ok(resolver::resolve(&dim.sql, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::model::{Cube, CubeRelation, Dimension};
    use crate::query::context::SecurityContext;
    use crate::query::plan::CteJoinKey;
    use crate::sql::select::TableRef;

    fn registry() -> CubeRegistry {
        let mut registry = CubeRegistry::new();
        let cube = Cube::new(
            "Employees",
            std::sync::Arc::new(|_ctx| CubeRelation {
                from: TableRef::new("employees", None),
                where_: None,
            }),
        )
        .with_dimension(Dimension::new(
            "departmentId",
            crate::model::DataType::Number,
            column_resolver("employees", "department_id"),
        ));
        registry.register(cube);
        registry
    }

    #[test]
    fn test_no_aggregates_means_no_group_by() {
        assert!(!should_emit_group_by(0));
        assert!(should_emit_group_by(1));
    }

    #[test]
    fn test_plain_dimension_resolves_cube_expression() {
        let registry = registry();
        let ctx = QueryContext::new("db", SecurityContext::default());
        let expr = resolve_group_by_column(&registry, &ctx, "Employees.departmentId", None, None).unwrap();
        assert_eq!(expr, SqlExpr::table_column("employees", "department_id"));
    }

    #[test]
    fn test_join_key_dimension_prefers_main_table_column() {
        let registry = registry();
        let ctx = QueryContext::new("db", SecurityContext::default());
        let cte = CteInfo {
            cte_alias: "cte_employees".into(),
            cube: "Employees".into(),
            measures: vec![],
            dimensions: vec![],
            time_dimensions: vec![],
            join_keys: vec![CteJoinKey {
                source_column: "department_id".into(),
                target_column: "departmentId".into(),
            }],
            propagating_filters: vec![],
        };
        let expr = resolve_group_by_column(
            &registry,
            &ctx,
            "Employees.departmentId",
            Some(&cte),
            Some(("employees", "department_id")),
        )
        .unwrap();
        assert_eq!(expr, SqlExpr::table_column("employees", "department_id"));
    }
}
