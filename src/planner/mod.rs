//! Query Planner - decides which cubes participate, how they
//! join, which ones materialize as pre-aggregation CTEs, and which filters
//! on one cube need to propagate into another's CTE as a subquery
//! constraint. Consumed by the CTE Builder and the Query Executor.
//!
//! Join traversal walks the full join graph (forward and reversed edges) by
//! BFS from the primary cube, so a chain of declared joins can connect two
//! cubes even when neither declares a join directly to the other. Filter
//! propagation, by contrast, is scoped to a CTE cube's immediate BFS
//! predecessor only - a cube three hops upstream does not also get its
//! filters pushed down transitively. This mirrors every concrete scenario
//! in practice (one hasMany/belongsToMany hop between a selected dimension
//! cube and a selected measure cube) without the complexity of chasing
//! filters across an arbitrarily long path.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::builders::datetime::DateTimeBuilder;
use crate::builders::filter::FilterBuilder;
use crate::builders::measure::categorize_for_post_aggregation;
use crate::calc_measure;
use crate::error::{CompileError, Result};
use crate::filter_cache::FilterCache;
use crate::model::{Cube, CubeJoin, CubeRegistry, Measure};
use crate::query::context::QueryContext;
use crate::query::plan::{cte_alias, CteInfo, CteJoinKey, PlannedJoin, PropagatingFilter, QueryPlan};
use crate::query::semantic_query::{FilterCondition, FilterNode, SemanticQuery};
use crate::resolver;
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::{Literal, SqlExpr};
use crate::sql::select::Select;
use crate::template;

/// Plan a query against the registry: primary-cube selection, join
/// traversal, pre-aggregation CTE decisions, propagating filters, and the
/// per-cube pre-built filter map.
pub fn plan(
    registry: &CubeRegistry,
    query: &SemanticQuery,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    filter_cache: &mut FilterCache,
) -> Result<QueryPlan> {
    let primary_cube = select_primary_cube(registry, query)?;

    let mut selected_cubes: Vec<String> = Vec::new();
    for qualified in query.all_members() {
        let (cube, _) = registry.resolve_member(qualified)?;
        if !selected_cubes.contains(&cube.name) {
            selected_cubes.push(cube.name.clone());
        }
    }
    let targets: Vec<String> = selected_cubes.into_iter().filter(|c| c != &primary_cube).collect();

    let adjacency = build_adjacency(registry);
    let hops = bfs_hops(&adjacency, &primary_cube, &targets)?;

    let needed_measures = measures_needed_per_cube(registry, &query.measures)?;

    let mut join_cubes = Vec::new();
    let mut ctes = Vec::new();

    for hop in &hops {
        join_cubes.push(PlannedJoin {
            cube: hop.to.clone(),
            join: hop.join.clone(),
        });

        let cube_measures = needed_measures.get(&hop.to).cloned().unwrap_or_default();
        if hop.join.relationship.is_many_side() && !cube_measures.is_empty() {
            let cte_alias_name = cte_alias(&hop.to);
            let join_keys = cte_join_keys(registry, ctx, &hop.to, &hop.join);
            let propagating = build_propagating_filters(
                registry,
                query,
                ctx,
                dialect,
                datetime,
                filter_cache,
                &hop.from,
                &join_keys,
                &cte_alias_name,
            )?;

            let mut cube_dimensions = Vec::new();
            for qualified in &query.dimensions {
                let (cube, member) = registry.resolve_member(qualified)?;
                if cube.name == hop.to && !cube_dimensions.contains(&member.to_string()) {
                    cube_dimensions.push(member.to_string());
                }
            }
            let mut cube_time_dimensions = Vec::new();
            for td in &query.time_dimensions {
                let (cube, member) = registry.resolve_member(&td.dimension)?;
                if cube.name == hop.to {
                    cube_time_dimensions.push(crate::query::semantic_query::TimeDimensionRequest {
                        dimension: member.to_string(),
                        granularity: td.granularity,
                        date_range: td.date_range.clone(),
                    });
                }
            }

            ctes.push(CteInfo {
                cte_alias: cte_alias_name,
                cube: hop.to.clone(),
                measures: cube_measures,
                dimensions: cube_dimensions,
                time_dimensions: cube_time_dimensions,
                join_keys,
                propagating_filters: propagating,
            });
        }
    }

    let mut pre_built_filters: HashMap<String, Vec<SqlExpr>> = HashMap::new();
    for node in &query.filters {
        collect_conditions_by_cube(registry, ctx, node, dialect, datetime, filter_cache, &mut pre_built_filters)?;
    }

    Ok(QueryPlan {
        primary_cube,
        join_cubes,
        pre_aggregation_ctes: ctes,
        pre_built_filters,
    })
}

/// The cube containing the first requested dimension or time dimension;
/// failing that, the cube containing the first requested measure. Ties
/// (a member name that could only ever resolve to one cube anyway) never
/// arise here - `registry.order_index` exists for the symmetric ambiguity
/// the open question the registry ordering already resolves in its own favor.
fn select_primary_cube(registry: &CubeRegistry, query: &SemanticQuery) -> Result<String> {
    let candidate = query
        .dimensions
        .first()
        .map(String::as_str)
        .or_else(|| query.time_dimensions.first().map(|t| t.dimension.as_str()))
        .or_else(|| query.measures.first().map(String::as_str))
        .ok_or_else(|| CompileError::UnknownMember("query selects no measures or dimensions".into()))?;
    let (cube, _) = registry.resolve_member(candidate)?;
    Ok(cube.name.clone())
}

/// Every cube's declared joins, plus their reverse, so BFS can traverse a
/// join declared on either end.
fn build_adjacency(registry: &CubeRegistry) -> HashMap<String, Vec<(String, CubeJoin)>> {
    let mut adjacency: HashMap<String, Vec<(String, CubeJoin)>> = HashMap::new();
    for cube in registry.iter() {
        for join in &cube.joins {
            adjacency
                .entry(cube.name.clone())
                .or_default()
                .push((join.target_cube.clone(), join.clone()));
            adjacency
                .entry(join.target_cube.clone())
                .or_default()
                .push((cube.name.clone(), join.reversed(cube.name.clone())));
        }
    }
    adjacency
}

#[derive(Clone)]
struct Hop {
    from: String,
    to: String,
    join: CubeJoin,
}

/// BFS from `start`, returning the ordered, deduplicated set of hops needed
/// to reach every cube in `targets`. A target with no path raises
/// [`CompileError::UnreachableCube`].
fn bfs_hops(adjacency: &HashMap<String, Vec<(String, CubeJoin)>>, start: &str, targets: &[String]) -> Result<Vec<Hop>> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(start.to_string());
    let mut predecessor: HashMap<String, Hop> = HashMap::new();

    while let Some(current) = queue.pop_front() {
        if let Some(edges) = adjacency.get(&current) {
            for (next, join) in edges {
                if visited.insert(next.clone()) {
                    predecessor.insert(
                        next.clone(),
                        Hop {
                            from: current.clone(),
                            to: next.clone(),
                            join: join.clone(),
                        },
                    );
                    queue.push_back(next.clone());
                }
            }
        }
    }

    let mut hops = Vec::new();
    let mut added: HashSet<String> = HashSet::new();
    for target in targets {
        if target == start {
            continue;
        }
        if !predecessor.contains_key(target) {
            return Err(CompileError::UnreachableCube {
                from: start.to_string(),
                to: target.clone(),
            });
        }
        let mut chain = Vec::new();
        let mut node = target.clone();
        while node != start {
            let hop = predecessor.get(&node).expect("bfs predecessor chain is complete").clone();
            chain.push(hop.clone());
            node = hop.from.clone();
        }
        chain.reverse();
        for hop in chain {
            if added.insert(hop.to.clone()) {
                hops.push(hop);
            }
        }
    }
    Ok(hops)
}

/// `{ sourceColumn, targetColumn }` pairs for a hop's join key. `sourceColumn` is the predecessor's physical join column;
/// `targetColumn` is the *dimension member name* on the CTE cube that the
/// join's target column corresponds to (falling back to the physical
/// column when no dimension models it) - the CTE builder aliases every
/// selected column by member name, so this is what later GROUP BY/subquery
/// consumers match against and reference, never the raw column directly.
/// `belongsToMany` hops carry no direct `on` pairs - derive them from the
/// junction table's source/target keys instead.
fn cte_join_keys(registry: &CubeRegistry, ctx: &QueryContext, target_cube: &str, join: &CubeJoin) -> Vec<CteJoinKey> {
    let pairs: Vec<(String, String)> = if !join.on.is_empty() {
        join.on.iter().map(|pair| (pair.source_col.clone(), pair.target_col.clone())).collect()
    } else if let Some(through) = &join.through {
        through
            .source_key
            .iter()
            .zip(through.target_key.iter())
            .map(|(source, target)| (source.clone(), target.clone()))
            .collect()
    } else {
        Vec::new()
    };

    let cube = registry.get(target_cube);
    pairs
        .into_iter()
        .map(|(source_column, target_col)| {
            let target_column = cube
                .and_then(|c| dimension_member_for_column(c, ctx, &target_col))
                .unwrap_or(target_col);
            CteJoinKey { source_column, target_column }
        })
        .collect()
}

fn dimension_member_for_column(cube: &Cube, ctx: &QueryContext, column: &str) -> Option<String> {
    cube.dimensions.values().find_map(|dim| match resolver::resolve(&dim.sql, ctx) {
        SqlExpr::Column { column: c, .. } if c == column => Some(dim.name.clone()),
        _ => None,
    })
}

/// Every base measure (requested directly, required by a post-aggregation
/// window, or referenced by a requested calculated measure) bucketed by the
/// cube it belongs to, keyed by local member name.
fn measures_needed_per_cube(registry: &CubeRegistry, requested: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let mut needed: HashMap<String, Vec<String>> = HashMap::new();

    for qualified in requested {
        let (cube, member) = registry.resolve_member(qualified)?;
        if let Some(measure) = cube.measures.get(member) {
            if !measure.is_calculated() {
                record_needed(registry, qualified, &mut needed)?;
            }
        }
    }

    let categorized = categorize_for_post_aggregation(registry, requested)?;
    for base in &categorized.required_base_measures {
        record_needed(registry, base, &mut needed)?;
    }

    for calculated in calc_measure::resolve_order(registry, requested)? {
        let (cube, member) = registry.resolve_member(&calculated)?;
        let Some(Measure::Calculated { calculated_sql }) = cube.measures.get(member) else {
            continue;
        };
        let cube_name = cube.name.clone();
        for reference in template::extract_references(calculated_sql)? {
            let dep_qualified = if reference.contains('.') {
                reference
            } else {
                format!("{}.{}", cube_name, reference)
            };
            let (dep_cube, dep_member) = registry.resolve_member(&dep_qualified)?;
            if let Some(dep_measure) = dep_cube.measures.get(dep_member) {
                if !dep_measure.is_calculated() {
                    record_needed(registry, &dep_qualified, &mut needed)?;
                }
            }
        }
    }

    Ok(needed)
}

fn record_needed(registry: &CubeRegistry, qualified: &str, needed: &mut HashMap<String, Vec<String>>) -> Result<()> {
    let (cube, member) = registry.resolve_member(qualified)?;
    let list = needed.entry(cube.name.clone()).or_default();
    if !list.iter().any(|m| m == member) {
        list.push(member.to_string());
    }
    Ok(())
}

/// Project `node` onto the leaf conditions whose member belongs to
/// `cube_name`, rebuilding the surrounding `AND`/`OR` structure around only
/// those leaves; a branch with nothing left collapses to `None`.
fn build_predicate_for_cube(
    node: &FilterNode,
    cube_name: &str,
    registry: &CubeRegistry,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    filter_cache: &mut FilterCache,
) -> Result<Option<SqlExpr>> {
    match node {
        FilterNode::Condition(condition) => {
            let (cube, _) = registry.resolve_member(&condition.member)?;
            if cube.name != cube_name {
                return Ok(None);
            }
            build_condition(condition, registry, ctx, dialect, datetime, filter_cache)
        }
        FilterNode::And(children) => {
            let mut built = Vec::new();
            for child in children {
                if let Some(expr) = build_predicate_for_cube(child, cube_name, registry, ctx, dialect, datetime, filter_cache)? {
                    built.push(expr);
                }
            }
            Ok(SqlExpr::conjunction(built))
        }
        FilterNode::Or(children) => {
            let mut built = Vec::new();
            for child in children {
                if let Some(expr) = build_predicate_for_cube(child, cube_name, registry, ctx, dialect, datetime, filter_cache)? {
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

/// Build one dimension filter's predicate, or `None` when `condition`
/// targets a measure - measure filters never enter WHERE (nor a CTE's own
/// WHERE, nor a propagating subquery); the executor routes them into HAVING
/// instead, against the fully-aggregated expression.
fn build_condition(
    condition: &FilterCondition,
    registry: &CubeRegistry,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    filter_cache: &mut FilterCache,
) -> Result<Option<SqlExpr>> {
    let (cube, member) = registry.resolve_member(&condition.member)?;
    let dim = match cube.dimensions.get(member) {
        Some(dim) => dim,
        None if cube.measures.contains_key(member) => return Ok(None),
        None => return Err(CompileError::UnknownMember(condition.member.clone())),
    };
    let resolved = resolver::resolve(&dim.sql, ctx);
    let built = FilterBuilder::new(dialect, datetime).build(resolved, dim.data_type, condition)?;
    // A cache hit still pays for `build` above since `FilterBuilder::build`
    // can fail and `get_or_build`'s closure can't - harmless, since the
    // builder is pure; the cache's job is fragment-shape reuse, not
    // avoiding this one redundant call.
    Ok(Some(filter_cache.get_or_build(condition, || built.clone())))
}

fn collect_conditions_by_cube(
    registry: &CubeRegistry,
    ctx: &QueryContext,
    node: &FilterNode,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    filter_cache: &mut FilterCache,
    out: &mut HashMap<String, Vec<SqlExpr>>,
) -> Result<()> {
    match node {
        FilterNode::Condition(condition) => {
            let (cube, _) = registry.resolve_member(&condition.member)?;
            let cube_name = cube.name.clone();
            if let Some(built) = build_condition(condition, registry, ctx, dialect, datetime, filter_cache)? {
                out.entry(cube_name).or_default().push(built);
            }
            Ok(())
        }
        FilterNode::And(children) | FilterNode::Or(children) => {
            for child in children {
                collect_conditions_by_cube(registry, ctx, child, dialect, datetime, filter_cache, out)?;
            }
            Ok(())
        }
    }
}

/// Rewrite `predecessor_cube`'s own filters (and its row-level security
/// predicate) as an `IN`/`EXISTS` subquery constraining the CTE-materialized
/// cube on the other end of `join_keys`. Returns no filter at
/// all when the predecessor contributes nothing to filter on.
#[allow(clippy::too_many_arguments)]
fn build_propagating_filters(
    registry: &CubeRegistry,
    query: &SemanticQuery,
    ctx: &QueryContext,
    dialect: &dyn SqlDialect,
    datetime: &DateTimeBuilder,
    filter_cache: &mut FilterCache,
    predecessor_cube: &str,
    join_keys: &[CteJoinKey],
    cte_alias_name: &str,
) -> Result<Vec<PropagatingFilter>> {
    if join_keys.is_empty() {
        return Ok(Vec::new());
    }

    let mut own_filters = Vec::new();
    for node in &query.filters {
        if let Some(expr) = build_predicate_for_cube(node, predecessor_cube, registry, ctx, dialect, datetime, filter_cache)? {
            own_filters.push(expr);
        }
    }
    let Some(mut predicate) = SqlExpr::conjunction(own_filters) else {
        return Ok(Vec::new());
    };

    let cube = registry.require(predecessor_cube)?;
    let relation = resolver::resolve_relation(cube, ctx);
    if let Some(security) = relation.where_ {
        predicate = security.and(predicate);
    }
    let source_table = relation.from.name.clone();

    let subquery_predicate = if join_keys.len() == 1 {
        let key = &join_keys[0];
        let pk_expr = SqlExpr::table_column(source_table.clone(), key.source_column.clone());
        let inner = Select::new()
            .from(source_table, None)
            .select(pk_expr, None)
            .where_expr(predicate);
        SqlExpr::InSubquery {
            expr: Box::new(SqlExpr::table_column(cte_alias_name.to_string(), key.target_column.clone())),
            subquery: Box::new(inner),
            negated: false,
        }
    } else {
        let mut eq_preds: Vec<SqlExpr> = join_keys
            .iter()
            .map(|key| {
                SqlExpr::table_column(source_table.clone(), key.source_column.clone())
                    .eq(SqlExpr::table_column(cte_alias_name.to_string(), key.target_column.clone()))
            })
            .collect();
        let mut full = eq_preds.remove(0);
        for pred in eq_preds {
            full = full.and(pred);
        }
        full = full.and(predicate);
        let inner = Select::new()
            .from(source_table, None)
            .select(SqlExpr::Literal(Literal::Int(1)), None)
            .where_expr(full);
        SqlExpr::Exists {
            subquery: Box::new(inner),
            negated: false,
        }
    };

    Ok(vec![PropagatingFilter {
        source_cube: predecessor_cube.to_string(),
        predicate: subquery_predicate,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::model::join::JoinKeyPair;
    use crate::model::{AggregateType, Cube, CubeRelation, DataType, Dimension, Relationship};
    use crate::query::context::SecurityContext;
    use crate::query::semantic_query::FilterOperator;
    use crate::sql::dialect::PostgresDialect;
    use crate::sql::select::TableRef;
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
        .with_dimension(
            Dimension::new("id", DataType::Number, column_resolver("employees", "id")).primary_key(true),
        )
        .with_dimension(Dimension::new(
            "department",
            DataType::String,
            column_resolver("employees", "department"),
        ))
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
    fn test_primary_cube_prefers_first_dimension() {
        let registry = registry();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Productivity.totalHours".into());
        assert_eq!(select_primary_cube(&registry, &query).unwrap(), "Employees");
    }

    #[test]
    fn test_plan_materializes_cte_when_many_side_has_measure() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Productivity.totalHours".into());

        let plan = plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();

        assert_eq!(plan.primary_cube, "Employees");
        assert_eq!(plan.join_cubes.len(), 1);
        assert_eq!(plan.join_cubes[0].cube, "Productivity");
        assert!(plan.is_cte_materialized("Productivity"));
        let cte = plan.cte_for("Productivity").unwrap();
        assert_eq!(cte.measures, vec!["totalHours".to_string()]);
        assert_eq!(cte.join_keys[0].source_column, "id");
        assert_eq!(cte.join_keys[0].target_column, "employee_id");
    }

    #[test]
    fn test_unreachable_cube_is_rejected() {
        let mut registry = registry();
        let stranded = Cube::new(
            "Stranded",
            std::sync::Arc::new(|_ctx| CubeRelation {
                from: TableRef::new("stranded", None),
                where_: None,
            }),
        )
        .with_measure(
            "count",
            Measure::aggregate(AggregateType::Count, column_resolver("stranded", "id")),
        );
        registry.register(stranded);

        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Stranded.count".into());

        let result = plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache);
        assert!(matches!(result, Err(CompileError::UnreachableCube { .. })));
    }

    #[test]
    fn test_filter_on_cte_cube_propagates_from_predecessor() {
        let registry = registry();
        let dialect = PostgresDialect;
        let datetime = DateTimeBuilder::new(Utc::now());
        let mut cache = FilterCache::new();
        let mut query = SemanticQuery::new();
        query.dimensions.push("Employees.department".into());
        query.measures.push("Productivity.totalHours".into());
        query.filters.push(FilterNode::Condition(FilterCondition::new(
            "Employees.department",
            FilterOperator::Equals,
            vec![json!("engineering")],
        )));

        let plan = plan(&registry, &query, &ctx(), &dialect, &datetime, &mut cache).unwrap();
        let cte = plan.cte_for("Productivity").unwrap();
        assert_eq!(cte.propagating_filters.len(), 1);
        assert_eq!(cte.propagating_filters[0].source_cube, "Employees");
        assert!(matches!(
            cte.propagating_filters[0].predicate,
            SqlExpr::InSubquery { .. }
        ));

        assert_eq!(plan.pre_built_filters.get("Employees").map(Vec::len), Some(1));
    }
}
