//! Query Executor / Assembler - turns a [`QueryPlan`] plus the
//! pre-aggregation CTEs into the final outer `Select`.
//!
//! A post-aggregation window measure forces a two-layer build: an inner
//! aggregation (aliased `"agg"`) computes every aggregate measure, and an
//! outer layer runs each window function atop it. Without one, a single
//! flat `Select` covers everything. Both paths share the same FROM/JOIN/
//! WHERE/GROUP BY/HAVING assembly in [`build_flat`].

use std::collections::HashMap;

use crate::builders::datetime::DateTimeBuilder;
use crate::builders::group_by::{resolve_group_by_column, should_emit_group_by};
use crate::builders::measure::{categorize_for_post_aggregation, MeasureBuilder, MeasureScope};
use crate::builders::FilterBuilder;
use crate::error::{CompileError, Result, Warning};
use crate::model::types::DataType;
use crate::model::{CubeRegistry, Measure};
use crate::query::context::QueryContext;
use crate::query::plan::{CteInfo, QueryPlan};
use crate::query::semantic_query::{FilterCondition, FilterNode, OrderDirection, SemanticQuery};
use crate::resolver;
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::SqlExpr;
use crate::sql::select::{JoinType, Select, TableRef};

const DEFAULT_LIMIT: i64 = 50;

/// The assembled outer statement plus every warning collected along the way.
pub struct ExecutionResult {
    pub select: Select,
    pub warnings: Vec<Warning>,
}

/// Assemble the final `Select` for `query` against `plan`.
pub fn execute(
    registry: &CubeRegistry,
    query: &SemanticQuery,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    plan: &QueryPlan,
) -> Result<ExecutionResult> {
    let mut warnings = Vec::new();

    let (ctes, cte_warnings) = crate::cte_builder::build_all(registry, ctx, dialect, datetime, plan)?;
    warnings.extend(cte_warnings);

    let scope = build_measure_scope(registry, plan)?;
    let categorized = categorize_for_post_aggregation(registry, &query.measures)?;

    let select = if categorized.post_agg_window_measures.is_empty() {
        build_flat(registry, query, ctx, dialect, datetime, plan, &scope, &query.measures, &mut warnings)?
    } else {
        build_post_aggregation(registry, query, ctx, dialect, datetime, plan, &scope, &categorized, &mut warnings)?
    };

    let with_ctes = ctes.into_iter().fold(select, |acc, (alias, cte_select)| acc.with_cte(alias, cte_select));
    let final_select = apply_order_and_limit(query, with_ctes)?;

    Ok(ExecutionResult {
        select: final_select,
        warnings,
    })
}

/// Every measure sourced from a pre-aggregation CTE, keyed by its qualified
/// name, so `MeasureBuilder` re-aggregates instead of recomputing from rows.
fn build_measure_scope(registry: &CubeRegistry, plan: &QueryPlan) -> Result<MeasureScope> {
    let mut scope = MeasureScope::new();
    for cte in &plan.pre_aggregation_ctes {
        for local in &cte.measures {
            let qualified = format!("{}.{}", cte.cube, local);
            scope = scope.with_cte(qualified, cte.cte_alias.clone(), local.clone());
        }
    }
    // Confirm every scoped measure actually resolves - a CTE naming an
    // unknown member is a planner bug, not a user-facing condition.
    for cte in &plan.pre_aggregation_ctes {
        for local in &cte.measures {
            registry.resolve_member(&format!("{}.{}", cte.cube, local))?;
        }
    }
    Ok(scope)
}

/// Build one flat `Select`: dimensions + time dimensions + `measures`
/// (aggregate or re-aggregated, per `scope`), FROM/JOINs, WHERE, GROUP BY,
/// HAVING. Used directly when there's no post-aggregation split, and as the
/// inner aggregation layer when there is one.
#[allow(clippy::too_many_arguments)]
fn build_flat(
    registry: &CubeRegistry,
    query: &SemanticQuery,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    plan: &QueryPlan,
    scope: &MeasureScope,
    measures: &[String],
    warnings: &mut Vec<Warning>,
) -> Result<Select> {
    let primary = registry.require(&plan.primary_cube)?;
    let primary_relation = resolver::resolve_relation(primary, ctx);
    let primary_ref = primary_relation.from.ref_name().to_string();

    let mut select = Select::new().from(primary_relation.from.name.clone(), primary_relation.from.alias.clone());

    for qualified in &query.dimensions {
        let (cube, member) = registry.resolve_member(qualified)?;
        let cte = plan.cte_for(&cube.name);
        let main_table_join_key = cte.and_then(|c| main_table_join_key(plan, &primary_ref, &cube.name, c));
        let expr = resolve_group_by_column(registry, ctx, qualified, cte, main_table_join_key)?;
        select = select.select(expr, Some(member.to_string()));
    }

    for td in &query.time_dimensions {
        let (cube, member) = registry.resolve_member(&td.dimension)?;
        let cte = plan.cte_for(&cube.name);
        let expr = if let Some(cte) = cte {
            SqlExpr::table_column(cte.cte_alias.clone(), member.to_string())
        } else {
            let dim = cube
                .dimensions
                .get(member)
                .ok_or_else(|| CompileError::UnknownMember(td.dimension.clone()))?;
            let base = resolver::resolve(&dim.sql, ctx);
            datetime.build_time_dimension_expression(dialect, base, td.granularity)
        };
        select = select.select(expr, Some(member.to_string()));
    }

    let mut measure_builder = MeasureBuilder::new(dialect, registry, ctx);
    let resolved = measure_builder.resolve(measures, scope)?;
    for qualified in measures {
        let (_, member) = registry.resolve_member(qualified)?;
        let expr = resolved
            .get(qualified)
            .cloned()
            .ok_or_else(|| CompileError::UnknownMember(qualified.clone()))?;
        select = select.select(expr, Some(member.to_string()));
    }
    warnings.append(&mut measure_builder.warnings);

    for (i, hop) in plan.join_cubes.iter().enumerate() {
        select = add_join(registry, ctx, plan, &primary_ref, i, hop, select)?;
    }

    if let Some(security) = primary_relation.where_ {
        select = select.where_expr(security);
    }
    for (cube_name, conditions) in sorted_filters(&plan.pre_built_filters) {
        if plan.is_cte_materialized(cube_name) {
            continue;
        }
        for condition in conditions {
            select = select.where_expr(condition.clone());
        }
    }

    let aggregate_count = measures
        .iter()
        .filter(|m| registry.resolve_member(m).ok().map(|(c, n)| is_group_triggering(c.measures.get(n))).unwrap_or(false))
        .count();
    if should_emit_group_by(aggregate_count) {
        for qualified in &query.dimensions {
            let (cube, _) = registry.resolve_member(qualified)?;
            let cte = plan.cte_for(&cube.name);
            let main_table_join_key = cte.and_then(|c| main_table_join_key(plan, &primary_ref, &cube.name, c));
            let expr = resolve_group_by_column(registry, ctx, qualified, cte, main_table_join_key)?;
            select = select.group_by_expr(expr);
        }
        for td in &query.time_dimensions {
            let (cube, member) = registry.resolve_member(&td.dimension)?;
            let cte = plan.cte_for(&cube.name);
            let expr = if let Some(cte) = cte {
                SqlExpr::table_column(cte.cte_alias.clone(), member.to_string())
            } else {
                let dim = cube.dimensions.get(member).ok_or_else(|| CompileError::UnknownMember(td.dimension.clone()))?;
                let base = resolver::resolve(&dim.sql, ctx);
                datetime.build_time_dimension_expression(dialect, base, td.granularity)
            };
            select = select.group_by_expr(expr);
        }
    }

    for node in &query.filters {
        if let Some(having) = collect_having(node, registry, ctx, dialect, datetime, scope, &resolved)? {
            select = select.having_expr(having);
        }
    }

    Ok(select)
}

/// Counts toward GROUP BY triggering iff the measure is computed from rows
/// (directly or via a re-aggregated CTE column) - window functions over raw
/// rows never force a GROUP BY; post-aggregation windows
/// are handled entirely in the outer layer and never reach here directly.
fn is_group_triggering(measure: Option<&Measure>) -> bool {
    matches!(measure, Some(Measure::Aggregate { .. }) | Some(Measure::Statistical { .. }) | Some(Measure::Calculated { .. }))
}

/// Deterministic iteration over `pre_built_filters` so WHERE clause
/// fragment order (and so parameter order) never depends on hash order.
fn sorted_filters(filters: &HashMap<String, Vec<SqlExpr>>) -> Vec<(&String, &Vec<SqlExpr>)> {
    let mut entries: Vec<_> = filters.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// The predecessor table's own join-key column, when a requested dimension
/// happens to be exactly the column the CTE was joined on - lets the outer
/// GROUP BY reference the main table's copy instead of the CTE's.
fn main_table_join_key<'a>(plan: &QueryPlan, primary_ref: &'a str, cube_name: &str, cte: &'a CteInfo) -> Option<(&'a str, &'a str)> {
    plan.join_cubes.iter().find(|h| h.cube == cube_name)?;
    cte.join_keys.first().map(|key| (primary_ref, key.source_column.as_str()))
}

/// Add one join hop to `select`: either against a CTE-materialized cube
/// (ON clause built from `cte.join_keys`, predecessor-qualified), or a
/// direct join against the target cube's own secured relation.
fn add_join(
    registry: &CubeRegistry,
    ctx: &QueryContext,
    plan: &QueryPlan,
    primary_ref: &str,
    hop_index: usize,
    hop: &crate::query::plan::PlannedJoin,
    select: Select,
) -> Result<Select> {
    let predecessor_ref = predecessor_table_ref(registry, ctx, plan, primary_ref, hop_index)?;

    if let Some(cte) = plan.cte_for(&hop.cube) {
        let mut on: Option<SqlExpr> = None;
        for key in &cte.join_keys {
            let pred = SqlExpr::table_column(predecessor_ref.clone(), key.source_column.clone())
                .eq(SqlExpr::table_column(cte.cte_alias.clone(), key.target_column.clone()));
            on = Some(match on {
                Some(existing) => existing.and(pred),
                None => pred,
            });
        }
        let table = TableRef::new(cte.cte_alias.clone(), None);
        return Ok(select.join(hop.join.join_type(), table, on));
    }

    let target = registry.require(&hop.cube)?;
    let relation = resolver::resolve_relation(target, ctx);
    let target_ref = relation.from.ref_name().to_string();

    let mut on: Option<SqlExpr> = None;
    for (source_column, target_column) in raw_join_pairs(&hop.join) {
        let pred = SqlExpr::table_column(predecessor_ref.clone(), source_column).eq(SqlExpr::table_column(target_ref.clone(), target_column));
        on = Some(match on {
            Some(existing) => existing.and(pred),
            None => pred,
        });
    }
    if let Some(security) = relation.where_ {
        on = Some(match on {
            Some(existing) => existing.and(security),
            None => security,
        });
    }

    Ok(select.join(hop.join.join_type(), relation.from, on))
}

/// The raw physical `(sourceColumn, targetColumn)` pairs for a direct
/// (non-CTE) join - `join.on` when declared directly, otherwise the
/// `through` junction's key lists zipped together. Deliberately distinct
/// from `planner::cte_join_keys`: a direct join's ON clause references the
/// target's own physical table, never a CTE's member-aliased columns.
fn raw_join_pairs(join: &crate::model::CubeJoin) -> Vec<(String, String)> {
    if !join.on.is_empty() {
        join.on.iter().map(|pair| (pair.source_col.clone(), pair.target_col.clone())).collect()
    } else if let Some(through) = &join.through {
        through.source_key.iter().zip(through.target_key.iter()).map(|(s, t)| (s.clone(), t.clone())).collect()
    } else {
        Vec::new()
    }
}

/// The ref name of the cube that precedes `hop_index` in plan order - the
/// primary cube for the first hop, otherwise the previous hop's cube. An
/// approximation for a non-linear join tree (BFS may reach two targets from
/// the same predecessor), but every scenario this compiler targets is a
/// single chain off the primary cube.
fn predecessor_table_ref(registry: &CubeRegistry, ctx: &QueryContext, plan: &QueryPlan, primary_ref: &str, hop_index: usize) -> Result<String> {
    if hop_index == 0 {
        return Ok(primary_ref.to_string());
    }
    let predecessor_cube = &plan.join_cubes[hop_index - 1].cube;
    if let Some(cte) = plan.cte_for(predecessor_cube) {
        return Ok(cte.cte_alias.clone());
    }
    let cube = registry.require(predecessor_cube)?;
    let relation = resolver::resolve_relation(cube, ctx);
    Ok(relation.from.ref_name().to_string())
}

/// Walk one filter node for measure-typed leaf conditions, building each
/// against its already-resolved (possibly CTE-reaggregated) expression and
/// re-running it through `FilterBuilder` as a HAVING predicate.
/// Dimension/time-dimension leaves are skipped - those already landed in
/// WHERE via the planner.
fn collect_having(
    node: &FilterNode,
    registry: &CubeRegistry,
    _ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    scope: &MeasureScope,
    resolved: &HashMap<String, SqlExpr>,
) -> Result<Option<SqlExpr>> {
    match node {
        FilterNode::Condition(condition) => build_having_condition(condition, registry, dialect, datetime, scope, resolved),
        FilterNode::And(children) => {
            let mut built = Vec::new();
            for child in children {
                if let Some(expr) = collect_having(child, registry, _ctx, dialect, datetime, scope, resolved)? {
                    built.push(expr);
                }
            }
            Ok(SqlExpr::conjunction(built))
        }
        FilterNode::Or(children) => {
            let mut built = Vec::new();
            for child in children {
                if let Some(expr) = collect_having(child, registry, _ctx, dialect, datetime, scope, resolved)? {
                    built.push(expr);
                }
            }
            let Some(first) = built.first().cloned() else {
                return Ok(None);
            };
            Ok(Some(built.into_iter().skip(1).fold(first, SqlExpr::or)))
        }
    }
}

fn build_having_condition(
    condition: &FilterCondition,
    registry: &CubeRegistry,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    _scope: &MeasureScope,
    resolved: &HashMap<String, SqlExpr>,
) -> Result<Option<SqlExpr>> {
    let (cube, member) = registry.resolve_member(&condition.member)?;
    if !cube.measures.contains_key(member) {
        return Ok(None);
    }
    let Some(expr) = resolved.get(&condition.member).cloned() else {
        return Ok(None);
    };
    let built = FilterBuilder::new(dialect, datetime).build(expr, DataType::Number, condition)?;
    Ok(Some(built))
}

/// Split build for a post-aggregation-window query: an inner
/// aggregation over `aggregateMeasures + requiredBaseMeasures`, aliased
/// `"agg"`, then an outer layer selecting dimensions/time-dimensions and
/// pass-through measures straight off it, plus each post-aggregation window
/// computed atop the inner relation.
#[allow(clippy::too_many_arguments)]
fn build_post_aggregation(
    registry: &CubeRegistry,
    query: &SemanticQuery,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    plan: &QueryPlan,
    scope: &MeasureScope,
    categorized: &crate::builders::measure::Categorized,
    warnings: &mut Vec<Warning>,
) -> Result<Select> {
    const INNER_ALIAS: &str = "agg";

    let mut inner_measures = categorized.aggregate_measures.clone();
    for base in &categorized.required_base_measures {
        if !inner_measures.contains(base) {
            inner_measures.push(base.clone());
        }
    }

    let inner = build_flat(registry, query, ctx, dialect, datetime, plan, scope, &inner_measures, warnings)?;

    let mut outer = Select::new().from(INNER_ALIAS.to_string(), None);

    for qualified in &query.dimensions {
        let (_, member) = registry.resolve_member(qualified)?;
        outer = outer.select(SqlExpr::table_column(INNER_ALIAS.to_string(), member.to_string()), Some(member.to_string()));
    }
    for td in &query.time_dimensions {
        let (_, member) = registry.resolve_member(&td.dimension)?;
        outer = outer.select(SqlExpr::table_column(INNER_ALIAS.to_string(), member.to_string()), Some(member.to_string()));
    }
    for qualified in &categorized.aggregate_measures {
        let (_, member) = registry.resolve_member(qualified)?;
        outer = outer.select(SqlExpr::table_column(INNER_ALIAS.to_string(), member.to_string()), Some(member.to_string()));
    }

    let mut measure_builder = MeasureBuilder::new(dialect, registry, ctx);
    for qualified in &categorized.post_agg_window_measures {
        let (_, member) = registry.resolve_member(qualified)?;
        let expr = measure_builder.build_post_aggregation_window(qualified, INNER_ALIAS)?;
        outer = outer.select(expr, Some(member.to_string()));
    }
    warnings.append(&mut measure_builder.warnings);

    Ok(outer.with_cte(INNER_ALIAS.to_string(), inner))
}

/// Apply explicit `order`, then ascending implicit ordering for every
/// un-ordered time dimension, and finally LIMIT/OFFSET
/// validation and defaulting, to whichever `Select` is the final outer one.
fn apply_order_and_limit(query: &SemanticQuery, mut select: Select) -> Result<Select> {
    let known_aliases: Vec<String> = select.select_list.iter().filter_map(|item| item.alias.clone()).collect();

    let mut ordered_fields = Vec::new();
    for (field, direction) in &query.order {
        let local = local_alias(field);
        if !known_aliases.iter().any(|a| a == &local) {
            return Err(CompileError::InvalidOrderField(field.clone()));
        }
        let dir = match direction {
            OrderDirection::Asc => crate::sql::expr::SortDir::Asc,
            OrderDirection::Desc => crate::sql::expr::SortDir::Desc,
        };
        select = select.order_by_expr(SqlExpr::column(local.clone()), dir);
        ordered_fields.push(local);
    }

    let mut implicit: Vec<String> = query
        .time_dimensions
        .iter()
        .map(|td| local_alias(&td.dimension))
        .filter(|name| !ordered_fields.contains(name))
        .collect();
    implicit.sort();
    for name in implicit {
        select = select.order_by_expr(SqlExpr::column(name), crate::sql::expr::SortDir::Asc);
    }

    if let Some(limit) = query.limit {
        if limit < 0 {
            return Err(CompileError::InvalidLimit(limit));
        }
        select = select.limit(limit);
    }
    if let Some(offset) = query.offset {
        if offset < 0 {
            return Err(CompileError::InvalidOffset(offset));
        }
        select = select.offset(offset);
        if query.limit.is_none() {
            select = select.limit(DEFAULT_LIMIT);
        }
    }

    Ok(select)
}

fn local_alias(qualified: &str) -> String {
    qualified.rsplit('.').next().unwrap_or(qualified).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_cache::FilterCache;
    use crate::model::dimension::column_resolver;
    use crate::model::join::JoinKeyPair;
    use crate::model::{AggregateType, Cube, CubeRelation, CubeJoin, DataType as ModelDataType, Dimension, Relationship};
    use crate::query::context::SecurityContext;
    use crate::query::semantic_query::FilterOperator;
    use crate::sql::dialect::{Dialect, PostgresDialect};
    use chrono::Utc;
    use serde_json::json;

    fn registry() -> CubeRegistry {
        let mut registry = CubeRegistry::new();
        let employees = Cube::new(
            "Employees",
            std::sync::Arc::new(|_ctx| CubeRelation {
                from: TableRef::new("employees", None),
                where_: None,
            }),
        )
        .with_dimension(Dimension::new("id", ModelDataType::Number, column_resolver("employees", "id")).primary_key(true))
        .with_dimension(Dimension::new("department", ModelDataType::String, column_resolver("employees", "department")))
        .with_measure("count", Measure::aggregate(AggregateType::Count, column_resolver("employees", "id")))
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
    fn test_single_cube_aggregate_query() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Employees.count".into());

        let plan = crate::planner::plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let result = execute(&registry, &query, &ctx(), &dialect, &datetime, &plan).unwrap();
        let (sql, _params) = result.select.compile(Dialect::Postgres);
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("COUNT(\"employees\".\"id\")"));
    }

    #[test]
    fn test_cross_cube_measure_joins_through_cte() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Productivity.totalHours".into());

        let plan = crate::planner::plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let result = execute(&registry, &query, &ctx(), &dialect, &datetime, &plan).unwrap();
        let (sql, _) = result.select.compile(Dialect::Postgres);
        assert!(sql.starts_with("WITH \"cte_productivity\" AS"));
        assert!(sql.contains("LEFT OUTER JOIN \"cte_productivity\""));
    }

    #[test]
    fn test_having_filters_on_measure() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Employees.count".into());
        query.filters.push(FilterNode::Condition(FilterCondition::new(
            "Employees.count",
            FilterOperator::Gt,
            vec![json!(10)],
        )));

        let plan = crate::planner::plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let result = execute(&registry, &query, &ctx(), &dialect, &datetime, &plan).unwrap();
        let (sql, params) = result.select.compile(Dialect::Postgres);
        assert!(sql.contains("HAVING COUNT(\"employees\".\"id\") > $1"));
        assert_eq!(params, vec![json!(10)]);
    }

    #[test]
    fn test_order_by_unknown_field_rejected() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.order.push(("Employees.id".into(), OrderDirection::Asc));

        let plan = crate::planner::plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let result = execute(&registry, &query, &ctx(), &dialect, &datetime, &plan);
        assert!(matches!(result, Err(CompileError::InvalidOrderField(_))));
    }

    #[test]
    fn test_offset_without_limit_defaults_to_fifty() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.offset = Some(10);

        let plan = crate::planner::plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let result = execute(&registry, &query, &ctx(), &dialect, &datetime, &plan).unwrap();
        assert_eq!(result.select.limit, Some(DEFAULT_LIMIT));
        assert_eq!(result.select.offset, Some(10));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.limit = Some(-1);

        let plan = crate::planner::plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let result = execute(&registry, &query, &ctx(), &dialect, &datetime, &plan);
        assert!(matches!(result, Err(CompileError::InvalidLimit(-1))));
    }
}
