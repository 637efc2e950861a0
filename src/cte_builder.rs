//! CTE Builder - turns one [`CteInfo`] decided by the planner
//! into a materialized `SELECT ... GROUP BY` fragment: join-key columns and
//! aggregated measures, each aliased by member name so the outer query (and
//! [`crate::builders::group_by`]) can reference them without knowing
//! anything about the underlying table.

use crate::builders::datetime::DateTimeBuilder;
use crate::builders::measure::{MeasureBuilder, MeasureScope};
use crate::error::{CompileError, Result, Warning};
use crate::model::{Cube, CubeRegistry};
use crate::query::context::QueryContext;
use crate::query::plan::{CteInfo, CteJoinKey, QueryPlan};
use crate::resolver;
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::SqlExpr;
use crate::sql::select::Select;

/// Build every pre-aggregation CTE the planner decided on, in plan order.
pub fn build_all(
    registry: &CubeRegistry,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    plan: &QueryPlan,
) -> Result<(Vec<(String, Select)>, Vec<Warning>)> {
    let mut ctes = Vec::with_capacity(plan.pre_aggregation_ctes.len());
    let mut warnings = Vec::new();
    for cte in &plan.pre_aggregation_ctes {
        let (select, mut w) = build(registry, ctx, dialect, datetime, plan, cte)?;
        warnings.append(&mut w);
        ctes.push((cte.cte_alias.clone(), select));
    }
    Ok((ctes, warnings))
}

/// Build one CTE: `FROM` the cube's own (secured) relation, `SELECT` its
/// join keys, requested dimensions/time-dimensions, and requested measures,
/// `WHERE` its own filters plus whatever the planner propagated down from
/// the cube that selected it, `GROUP BY` the join keys plus every selected
/// dimension/time-dimension. A CTE is always grouped - it exists only
/// because it has at least one measure to pre-aggregate.
pub fn build(
    registry: &CubeRegistry,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    plan: &QueryPlan,
    cte: &CteInfo,
) -> Result<(Select, Vec<Warning>)> {
    let cube = registry.require(&cte.cube)?;
    let relation = resolver::resolve_relation(cube, ctx);
    let ref_name = relation.from.ref_name().to_string();

    let mut select = Select::new().from(relation.from.name.clone(), relation.from.alias.clone());

    let mut group_exprs = Vec::with_capacity(cte.join_keys.len());
    let mut selected_columns: std::collections::HashSet<String> = std::collections::HashSet::new();
    for key in &cte.join_keys {
        let expr = join_key_expr(cube, ctx, &ref_name, key);
        select = select.select(expr.clone(), Some(key.target_column.clone()));
        group_exprs.push(expr);
        selected_columns.insert(key.target_column.clone());
    }

    for name in &cte.dimensions {
        if !selected_columns.insert(name.clone()) {
            continue;
        }
        let dim = cube
            .dimensions
            .get(name)
            .ok_or_else(|| CompileError::UnknownMember(format!("{}.{}", cte.cube, name)))?;
        let expr = resolver::resolve(&dim.sql, ctx);
        select = select.select(expr.clone(), Some(name.clone()));
        group_exprs.push(expr);
    }

    for td in &cte.time_dimensions {
        if !selected_columns.insert(td.dimension.clone()) {
            continue;
        }
        let dim = cube
            .dimensions
            .get(&td.dimension)
            .ok_or_else(|| CompileError::UnknownMember(format!("{}.{}", cte.cube, td.dimension)))?;
        let base = resolver::resolve(&dim.sql, ctx);
        let expr = datetime.build_time_dimension_expression(dialect, base, td.granularity);
        select = select.select(expr.clone(), Some(td.dimension.clone()));
        group_exprs.push(expr);
    }

    let qualified_measures: Vec<String> = cte.measures.iter().map(|m| format!("{}.{}", cte.cube, m)).collect();
    let mut measure_builder = MeasureBuilder::new(dialect, registry, ctx);
    let resolved = measure_builder.resolve(&qualified_measures, &MeasureScope::new())?;
    for (local, qualified) in cte.measures.iter().zip(qualified_measures.iter()) {
        let expr = resolved
            .get(qualified)
            .cloned()
            .ok_or_else(|| CompileError::UnknownMember(qualified.clone()))?;
        select = select.select(expr, Some(local.clone()));
    }

    let mut predicate: Option<SqlExpr> = relation.where_;
    if let Some(own) = plan.pre_built_filters.get(&cte.cube) {
        for condition in own {
            predicate = Some(match predicate {
                Some(existing) => existing.and(condition.clone()),
                None => condition.clone(),
            });
        }
    }
    for propagating in &cte.propagating_filters {
        predicate = Some(match predicate {
            Some(existing) => existing.and(propagating.predicate.clone()),
            None => propagating.predicate.clone(),
        });
    }
    if let Some(predicate) = predicate {
        select = select.where_expr(predicate);
    }

    for expr in group_exprs {
        select = select.group_by_expr(expr);
    }

    Ok((select, measure_builder.warnings))
}

/// The column a join key selects: the target cube's own dimension
/// expression when the key matches a declared dimension, otherwise the raw
/// physical column against the cube's table.
fn join_key_expr(cube: &Cube, ctx: &QueryContext, ref_name: &str, key: &CteJoinKey) -> SqlExpr {
    match cube.dimensions.values().find(|dim| dim.name == key.target_column) {
        Some(dim) => resolver::resolve(&dim.sql, ctx),
        None => SqlExpr::table_column(ref_name.to_string(), key.target_column.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::model::join::JoinKeyPair;
    use crate::model::{AggregateType, Cube, CubeRelation, CubeJoin, DataType, Dimension, Measure, Relationship};
    use crate::query::context::SecurityContext;
    use crate::query::plan::{cte_alias, PropagatingFilter};
    use crate::sql::dialect::{Dialect, PostgresDialect};
    use crate::sql::select::TableRef;

    fn registry() -> CubeRegistry {
        let mut registry = CubeRegistry::new();
        let employees = Cube::new(
            "Employees",
            std::sync::Arc::new(|_ctx| CubeRelation {
                from: TableRef::new("employees", None),
                where_: None,
            }),
        )
        .with_dimension(Dimension::new("id", DataType::Number, column_resolver("employees", "id")).primary_key(true))
        .with_join(CubeJoin::new(
            "Productivity",
            Relationship::HasMany,
            vec![JoinKeyPair {
                source_col: "id".into(),
                target_col: "employee_id".into(),
            }],
        ));

        let productivity = Cube::new(
            "Productivity",
            std::sync::Arc::new(|_ctx| CubeRelation {
                from: TableRef::new("productivity", None),
                where_: None,
            }),
        )
        .with_measure(
            "totalHours",
            Measure::aggregate(AggregateType::Sum, column_resolver("productivity", "hours")),
        );

        registry.register(employees);
        registry.register(productivity);
        registry
    }

    fn ctx() -> QueryContext {
        QueryContext::new("db", SecurityContext::default())
    }

    #[test]
    fn test_cte_groups_by_join_key_and_aggregates_measure() {
        let registry = registry();
        let dialect = PostgresDialect;

        let cte = CteInfo {
            cte_alias: cte_alias("Productivity"),
            cube: "Productivity".into(),
            measures: vec!["totalHours".into()],
            dimensions: vec![],
            time_dimensions: vec![],
            join_keys: vec![CteJoinKey {
                source_column: "id".into(),
                target_column: "employee_id".into(),
            }],
            propagating_filters: vec![],
        };
        let plan = QueryPlan {
            primary_cube: "Employees".into(),
            join_cubes: vec![],
            pre_aggregation_ctes: vec![cte.clone()],
            pre_built_filters: Default::default(),
        };

        let datetime = DateTimeBuilder::new(chrono::Utc::now());
        let (select, warnings) = build(&registry, &ctx(), &dialect, &datetime, &plan, &cte).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(select.group_by.len(), 1);

        let (sql, _params) = select.compile(Dialect::Postgres);
        assert!(sql.starts_with("SELECT \"productivity\".\"employee_id\" AS \"employee_id\", SUM(\"productivity\".\"hours\") AS \"totalHours\""));
        assert!(sql.contains("GROUP BY \"productivity\".\"employee_id\""));
    }

    #[test]
    fn test_propagating_filter_lands_in_cte_where() {
        let registry = registry();
        let dialect = PostgresDialect;

        let cte = CteInfo {
            cte_alias: cte_alias("Productivity"),
            cube: "Productivity".into(),
            measures: vec!["totalHours".into()],
            dimensions: vec![],
            time_dimensions: vec![],
            join_keys: vec![CteJoinKey {
                source_column: "id".into(),
                target_column: "employee_id".into(),
            }],
            propagating_filters: vec![PropagatingFilter {
                source_cube: "Employees".into(),
                predicate: SqlExpr::InSubquery {
                    expr: Box::new(SqlExpr::table_column(cte_alias("Productivity"), "employee_id")),
                    subquery: Box::new(
                        Select::new()
                            .from("employees", None)
                            .select(SqlExpr::table_column("employees", "id"), None),
                    ),
                    negated: false,
                },
            }],
        };
        let plan = QueryPlan {
            primary_cube: "Employees".into(),
            join_cubes: vec![],
            pre_aggregation_ctes: vec![cte.clone()],
            pre_built_filters: Default::default(),
        };

        let datetime = DateTimeBuilder::new(chrono::Utc::now());
        let (select, _) = build(&registry, &ctx(), &dialect, &datetime, &plan, &cte).unwrap();
        assert!(select.where_.is_some());
        let (sql, _) = select.compile(Dialect::Postgres);
        assert!(sql.contains("IN (SELECT"));
    }
}
