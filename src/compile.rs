//! Public Surface.
//!
//! `compile` is the crate's single inbound entry point: validate every
//! member a [`SemanticQuery`] references against the [`CubeRegistry`],
//! plan it, build any pre-aggregation CTEs and the outer statement
//!, and render the result through the chosen [`Dialect`]. `explain`
//! runs the identical pipeline - this compiler never touches a database
//! connection, so there is no execution step to skip.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::builders::DateTimeBuilder;
use crate::error::{CompileError, Result, Warning};
use crate::executor;
use crate::filter_cache::FilterCache;
use crate::model::CubeRegistry;
use crate::planner;
use crate::query::context::QueryContext;
use crate::query::plan::QueryPlan;
use crate::query::semantic_query::SemanticQuery;
use crate::sql::dialect::Dialect;

/// One join hop as it appears in the final plan.
#[derive(Debug, Clone, Serialize)]
pub struct JoinAnnotation {
    pub cube: String,
    pub relationship: String,
    pub materialized_as_cte: bool,
}

/// A pre-aggregation CTE decision.
#[derive(Debug, Clone, Serialize)]
pub struct CteAnnotation {
    pub alias: String,
    pub cube: String,
    pub measures: Vec<String>,
}

/// Describes the plan a compilation produced: primary cube, join list, CTE
/// aliases, and pre-aggregation decisions.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub primary_cube: String,
    pub dialect: String,
    pub joins: Vec<JoinAnnotation>,
    pub ctes: Vec<CteAnnotation>,
}

impl Annotation {
    fn from_plan(plan: &QueryPlan, dialect: Dialect) -> Self {
        let joins = plan
            .join_cubes
            .iter()
            .map(|hop| JoinAnnotation {
                cube: hop.cube.clone(),
                relationship: format!("{:?}", hop.join.relationship),
                materialized_as_cte: plan.is_cte_materialized(&hop.cube),
            })
            .collect();
        let ctes = plan
            .pre_aggregation_ctes
            .iter()
            .map(|cte| CteAnnotation {
                alias: cte.cte_alias.clone(),
                cube: cte.cube.clone(),
                measures: cte.measures.clone(),
            })
            .collect();
        Annotation {
            primary_cube: plan.primary_cube.clone(),
            dialect: dialect.to_string(),
            joins,
            ctes,
        }
    }
}

/// `{ sql, params, annotation }`, plus any `UnsupportedFeature`/
/// `InvalidInputValue` warnings collected along the way.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub sql: String,
    pub params: Vec<Value>,
    pub annotation: Annotation,
    pub warnings: Vec<Warning>,
}

pub type CompileResult = Result<CompileOutput>;

/// Compile `query` against `registry` for `dialect`, threading `ctx`
/// through every cube's `sql(ctx)` relation resolver.
pub fn compile(registry: &CubeRegistry, query: &SemanticQuery, ctx: &QueryContext, dialect: Dialect) -> CompileResult {
    validate_members(registry, query)?;

    let adapter = dialect.adapter();
    let datetime = DateTimeBuilder::new(Utc::now());
    let mut filter_cache = FilterCache::new();

    let plan = planner::plan(registry, query, ctx, adapter, &datetime, &mut filter_cache)?;
    let execution = executor::execute(registry, query, ctx, adapter, &datetime, &plan)?;

    let annotation = Annotation::from_plan(&plan, dialect);
    let (sql, params) = execution.select.compile(dialect);

    Ok(CompileOutput {
        sql,
        params,
        annotation,
        warnings: execution.warnings,
    })
}

/// Returns the same `{sql, params, annotation}` as [`compile`] - this
/// compiler never executes a query, so "dry run" and "compile" coincide.
pub fn explain(registry: &CubeRegistry, query: &SemanticQuery, ctx: &QueryContext, dialect: Dialect) -> CompileResult {
    compile(registry, query, ctx, dialect)
}

/// Every member a query references must parse as `Cube.field` and resolve
/// within the registry before planning begins.
fn validate_members(registry: &CubeRegistry, query: &SemanticQuery) -> Result<()> {
    for qualified in query.all_members() {
        registry.resolve_member(qualified).map_err(|_| CompileError::UnknownMember(qualified.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::model::join::JoinKeyPair;
    use crate::model::{AggregateType, Cube, CubeRelation, CubeJoin, DataType, Dimension, Measure, Relationship};
    use crate::query::context::SecurityContext;
    use crate::query::semantic_query::FilterCondition;
    use crate::query::semantic_query::{FilterNode, FilterOperator};
    use crate::sql::select::TableRef;
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
        .with_dimension(Dimension::new("id", DataType::Number, column_resolver("employees", "id")).primary_key(true))
        .with_dimension(Dimension::new(
            "organisationId",
            DataType::Number,
            column_resolver("employees", "organisation_id"),
        ))
        .with_dimension(Dimension::new(
            "departmentId",
            DataType::Number,
            column_resolver("employees", "department_id"),
        ))
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
            "totalLines",
            Measure::aggregate(AggregateType::Sum, column_resolver("productivity", "lines")),
        );

        registry.register(employees);
        registry.register(productivity);
        registry
    }

    fn ctx() -> QueryContext {
        QueryContext::new("db", SecurityContext::default())
    }

    #[test]
    fn test_single_cube_aggregate_scenario() {
        let registry = registry();
        let mut query = SemanticQuery::new();
        query.measures.push("Employees.count".into());
        query.dimensions.push("Employees.departmentId".into());
        query.filters.push(FilterNode::Condition(FilterCondition::new(
            "Employees.organisationId",
            FilterOperator::Equals,
            vec![json!(42)],
        )));

        let output = compile(&registry, &query, &ctx(), Dialect::Postgres).unwrap();
        assert!(output.sql.contains("SELECT"));
        assert!(output.sql.contains("GROUP BY"));
        assert_eq!(output.params, vec![json!(42)]);
        assert_eq!(output.annotation.primary_cube, "Employees");
    }

    #[test]
    fn test_cross_cube_cte_scenario_dedupes_parameter() {
        let registry = registry();
        let mut query = SemanticQuery::new();
        query.measures.push("Employees.count".into());
        query.measures.push("Productivity.totalLines".into());
        query.dimensions.push("Employees.departmentId".into());
        query.filters.push(FilterNode::Condition(FilterCondition::new(
            "Employees.organisationId",
            FilterOperator::Equals,
            vec![json!(42)],
        )));

        let output = compile(&registry, &query, &ctx(), Dialect::Postgres).unwrap();
        assert!(output.sql.starts_with("WITH"));
        assert_eq!(output.params.iter().filter(|v| **v == json!(42)).count(), 1);
        assert_eq!(output.annotation.ctes.len(), 1);
        assert_eq!(output.annotation.ctes[0].cube, "Productivity");
    }

    #[test]
    fn test_unknown_member_rejected() {
        let registry = registry();
        let mut query = SemanticQuery::new();
        query.measures.push("Employees.doesNotExist".into());

        let result = compile(&registry, &query, &ctx(), Dialect::Postgres);
        assert!(matches!(result, Err(CompileError::UnknownMember(_))));
    }

    #[test]
    fn test_filter_injection_defence_drops_nul_value() {
        let registry = registry();
        let mut query = SemanticQuery::new();
        query.measures.push("Employees.count".into());
        query.filters.push(FilterNode::Condition(FilterCondition::new(
            "Employees.organisationId",
            FilterOperator::Equals,
            vec![json!("abc\u{0}; DROP TABLE employees;--")],
        )));

        let output = compile(&registry, &query, &ctx(), Dialect::Postgres).unwrap();
        assert!(!output.sql.contains(';'));
        for param in &output.params {
            if let Value::String(s) = param {
                assert!(!s.contains('\u{0}'));
            }
        }
    }

    #[test]
    fn test_explain_matches_compile() {
        let registry = registry();
        let mut query = SemanticQuery::new();
        query.measures.push("Employees.count".into());

        let compiled = compile(&registry, &query, &ctx(), Dialect::Postgres).unwrap();
        let explained = explain(&registry, &query, &ctx(), Dialect::Postgres).unwrap();
        assert_eq!(compiled.sql, explained.sql);
        assert_eq!(compiled.params, explained.params);
    }
}
