//! MeasureBuilder - classification, topological resolution, aggregate
//! emission, row-filter application, calculated-measure emission, and
//! CTE-aware re-aggregation.

use std::collections::HashMap;

use crate::calc_measure;
use crate::error::{CompileError, Result, Warning};
use crate::model::measure::{AggregateType, Measure, WindowType};
use crate::model::{CubeRegistry, Dimension};
use crate::query::context::QueryContext;
use crate::resolver;
use crate::sql::dialect::{SqlDialect, WindowKind, WindowSpec};
use crate::sql::expr::SqlExpr;
use crate::template;

/// The categorization the Executor needs before it knows whether a
/// query requires splitting into an inner aggregation + outer window layer.
#[derive(Debug, Default, Clone)]
pub struct Categorized {
    pub aggregate_measures: Vec<String>,
    pub post_agg_window_measures: Vec<String>,
    /// Base aggregate measures referenced by `postAggWindowMeasures` that
    /// weren't themselves requested - must be auto-added to the inner query.
    pub required_base_measures: Vec<String>,
}

pub fn is_window_function(measure: &Measure) -> bool {
    measure.is_window()
}

pub fn is_post_aggregation_window(measure: &Measure) -> bool {
    measure.is_post_aggregation_window()
}

pub fn is_calculated_measure(measure: &Measure) -> bool {
    measure.is_calculated()
}

/// `categorizeForPostAggregation`: split `requested` into aggregate
/// measures, post-aggregation-window measures, and the base measures the
/// latter require but didn't ask for directly.
pub fn categorize_for_post_aggregation(registry: &CubeRegistry, requested: &[String]) -> Result<Categorized> {
    let mut out = Categorized::default();
    let mut required = Vec::new();
    for name in requested {
        let (cube, member) = registry.resolve_member(name)?;
        let measure = cube.measures.get(member).ok_or_else(|| CompileError::UnknownMember(name.clone()))?;
        if is_post_aggregation_window(measure) {
            out.post_agg_window_measures.push(name.clone());
            if let Measure::PostAggregationWindow { config, .. } = measure {
                if let Some(base) = &config.measure {
                    let qualified = qualify(base, &cube.name);
                    if !requested.contains(&qualified) {
                        required.push(qualified);
                    }
                }
            }
        } else if !is_calculated_measure(measure) && !is_window_function(measure) {
            out.aggregate_measures.push(name.clone());
        }
    }
    required.sort();
    required.dedup();
    out.required_base_measures = required;
    Ok(out)
}

fn qualify(member: &str, local_cube: &str) -> String {
    if member.contains('.') {
        member.to_string()
    } else {
        format!("{}.{}", local_cube, member)
    }
}

/// How a cube's measures are sourced for one build call: straight off the
/// base relation, or re-aggregated from an already-materialized CTE column.
#[derive(Debug, Clone)]
pub enum MeasureSource {
    Base,
    Cte { cte_alias: String, column: String },
}

#[derive(Debug, Default, Clone)]
pub struct MeasureScope {
    sources: HashMap<String, MeasureSource>,
}

impl MeasureScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope one measure's source by its fully-qualified name - keyed per
    /// measure rather than per cube, since a single materialized CTE exposes
    /// several measures, each under its own column alias.
    pub fn with_cte(mut self, qualified_member: impl Into<String>, cte_alias: impl Into<String>, column: impl Into<String>) -> Self {
        self.sources.insert(
            qualified_member.into(),
            MeasureSource::Cte {
                cte_alias: cte_alias.into(),
                column: column.into(),
            },
        );
        self
    }

    fn source_for(&self, qualified_member: &str) -> &MeasureSource {
        self.sources.get(qualified_member).unwrap_or(&MeasureSource::Base)
    }
}

pub struct MeasureBuilder<'a> {
    pub dialect: &'a dyn SqlDialect,
    pub registry: &'a CubeRegistry,
    pub ctx: &'a QueryContext,
    pub warnings: Vec<Warning>,
}

impl<'a> MeasureBuilder<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, registry: &'a CubeRegistry, ctx: &'a QueryContext) -> Self {
        Self {
            dialect,
            registry,
            ctx,
            warnings: Vec::new(),
        }
    }

    /// Resolve every measure in `requested`, plus every base dependency a
    /// calculated measure among them needs, building calculated measures
    /// last and in topological order.
    pub fn resolve(&mut self, requested: &[String], scope: &MeasureScope) -> Result<HashMap<String, SqlExpr>> {
        let calc_order = calc_measure::resolve_order(self.registry, requested)?;

        let mut base_needed: Vec<String> = requested.iter().filter(|n| !self.is_calculated(n)).cloned().collect();
        for calc in &calc_order {
            let (cube, member) = self.registry.resolve_member(calc)?;
            if let Measure::Calculated { calculated_sql } = &cube.measures[member] {
                for reference in template::extract_references(calculated_sql)? {
                    let qualified = qualify(&reference, &cube.name);
                    if !self.is_calculated(&qualified) {
                        base_needed.push(qualified);
                    }
                }
            }
        }
        base_needed.sort();
        base_needed.dedup();

        let mut resolved: HashMap<String, SqlExpr> = HashMap::new();
        for name in &base_needed {
            let expr = self.build_base_measure(name, scope)?;
            resolved.insert(name.clone(), expr);
        }

        for calc in &calc_order {
            let (cube, member) = self.registry.resolve_member(calc)?;
            let Measure::Calculated { calculated_sql } = &cube.measures[member] else {
                continue;
            };
            let template_expr = template::substitute(calculated_sql, &cube.name, |qualified| resolved.get(qualified).cloned())?;
            resolved.insert(calc.clone(), self.dialect.preprocess_template(template_expr));
        }

        Ok(resolved)
    }

    fn is_calculated(&self, qualified: &str) -> bool {
        self.registry
            .resolve_member(qualified)
            .ok()
            .and_then(|(cube, member)| cube.measures.get(member))
            .map(Measure::is_calculated)
            .unwrap_or(false)
    }

    /// Build one non-calculated measure, dispatching on `scope`: a direct
    /// aggregate over the owning cube's rows, or a re-aggregation over an
    /// already pre-aggregated CTE column.
    fn build_base_measure(&mut self, qualified: &str, scope: &MeasureScope) -> Result<SqlExpr> {
        let (cube, member) = self.registry.resolve_member(qualified)?;
        let measure = cube.measures.get(member).ok_or_else(|| CompileError::UnknownMember(qualified.to_string()))?;

        if let MeasureSource::Cte { cte_alias, column } = scope.source_for(qualified) {
            return Ok(self.reaggregate_over_cte(measure, cte_alias, column));
        }

        match measure {
            Measure::Aggregate { agg_type, sql, row_filters } => {
                let base = resolver::resolve(sql, self.ctx);
                let filtered = self.apply_row_filters(base, row_filters);
                Ok(self.build_aggregate(*agg_type, filtered))
            }
            Measure::Statistical { stat_type, sql, config } => {
                let base = resolver::resolve(sql, self.ctx);
                Ok(self.build_statistical(cube.name.as_str(), member, *stat_type, base, config.as_ref()))
            }
            Measure::Window { window_type, sql, config } => {
                let arg = sql.as_ref().map(|resolver| resolver::resolve(resolver, self.ctx));
                self.build_window(cube.name.as_str(), member, *window_type, arg, config)
            }
            Measure::PostAggregationWindow { .. } => {
                // Handled by the executor's outer layer, never built here.
                Ok(SqlExpr::raw(format!("/* {} resolved in outer window layer */", qualified)))
            }
            Measure::Calculated { .. } => unreachable!("calculated measures are built in the topological pass"),
        }
    }

    fn apply_row_filters(&self, base: SqlExpr, row_filters: &[crate::model::dimension::ExprResolver]) -> SqlExpr {
        if row_filters.is_empty() {
            return base;
        }
        let mut condition = None;
        for filter in row_filters {
            let predicate = resolver::resolve(filter, self.ctx);
            condition = Some(match condition {
                Some(existing) => SqlExpr::and(existing, predicate),
                None => predicate,
            });
        }
        self.dialect.build_case_when(vec![(condition.unwrap(), base)], None)
    }

    fn build_aggregate(&self, agg_type: AggregateType, expr: SqlExpr) -> SqlExpr {
        match agg_type {
            AggregateType::Count => SqlExpr::call("COUNT", vec![expr], false),
            AggregateType::CountDistinct => SqlExpr::call("COUNT", vec![expr], true),
            AggregateType::Sum => SqlExpr::call("SUM", vec![expr], false),
            AggregateType::Avg => self.dialect.build_avg(expr),
            AggregateType::Min => SqlExpr::call("MIN", vec![expr], false),
            AggregateType::Max => SqlExpr::call("MAX", vec![expr], false),
            AggregateType::Number => expr,
        }
    }

    /// An unsupported statistical function degrades to `MAX(NULL)` plus a
    /// warning rather than aborting compilation.
    fn build_statistical(
        &mut self,
        cube: &str,
        member: &str,
        stat_type: crate::model::measure::StatisticalType,
        expr: SqlExpr,
        config: Option<&crate::model::measure::StatisticalConfig>,
    ) -> SqlExpr {
        use crate::model::measure::StatisticalType::*;
        use crate::sql::dialect::PercentileSpec;

        let use_sample = config.map(|c| c.use_sample).unwrap_or(false);
        let built = match stat_type {
            Stddev => self.dialect.build_stddev(expr, false),
            StddevSamp => self.dialect.build_stddev(expr, true),
            Variance => self.dialect.build_variance(expr, false),
            VarianceSamp => self.dialect.build_variance(expr, true),
            Median | P95 | P99 | Percentile => stat_type.fraction(config).and_then(|fraction| {
                self.dialect.build_percentile(expr, PercentileSpec { fraction, use_sample })
            }),
        };

        match built {
            Some(expr) => expr,
            None => {
                let message = format!("{:?} is unsupported on dialect '{}'; degraded to NULL", stat_type, self.dialect.name());
                tracing::warn!(cube = %cube, member = %member, message = %message, "statistical measure degraded");
                self.warnings.push(Warning::new(cube, member, message));
                SqlExpr::call("MAX", vec![SqlExpr::null()], false)
            }
        }
    }

    fn build_window(
        &mut self,
        cube: &str,
        member: &str,
        window_type: WindowType,
        arg: Option<SqlExpr>,
        config: &crate::model::measure::WindowConfig,
    ) -> Result<SqlExpr> {
        let kind = window_kind(window_type);
        let spec = self.window_spec(cube, config)?;
        match self.dialect.build_window_function(kind, arg, spec) {
            Some(expr) => Ok(expr),
            None => {
                let message = format!("{:?} window function is unsupported on dialect '{}'; degraded to NULL", window_type, self.dialect.name());
                tracing::warn!(cube = %cube, member = %member, message = %message, "window measure degraded");
                self.warnings.push(Warning::new(cube, member, message));
                Ok(SqlExpr::null())
            }
        }
    }

    fn window_spec(&self, local_cube: &str, config: &crate::model::measure::WindowConfig) -> Result<WindowSpec> {
        let mut partition_by = Vec::with_capacity(config.partition_by.len());
        for member in &config.partition_by {
            partition_by.push(self.resolve_member_expr(&qualify(member, local_cube))?);
        }
        let mut order_by = Vec::with_capacity(config.order_by.len());
        for (member, asc) in &config.order_by {
            order_by.push((self.resolve_member_expr(&qualify(member, local_cube))?, *asc));
        }
        Ok(WindowSpec {
            partition_by,
            order_by,
            offset: config.offset,
            default_value: config.default_value.clone(),
            n_tile: config.n_tile,
            frame: config.frame.map(|(preceding, following)| crate::sql::dialect::WindowFrame { preceding, following }),
        })
    }

    /// Resolve a dimension or a non-calculated, non-aggregated measure base
    /// expression - used for window `partitionBy`/`orderBy` references, which
    /// operate per-row and are never themselves aggregated.
    fn resolve_member_expr(&self, qualified: &str) -> Result<SqlExpr> {
        let (cube, member) = self.registry.resolve_member(qualified)?;
        if let Some(dim) = cube.dimensions.get(member) {
            return Ok(resolve_dimension(dim, self.ctx));
        }
        match cube.measures.get(member) {
            Some(Measure::Aggregate { sql, .. }) => Ok(resolver::resolve(sql, self.ctx)),
            Some(_) => Err(CompileError::UnknownMember(qualified.to_string())),
            None => Err(CompileError::UnknownMember(qualified.to_string())),
        }
    }

    /// CTE-aware HAVING emission: re-aggregate a CTE's already
    /// pre-aggregated column rather than recomputing from base rows.
    /// `sum` covers count/sum/countDistinct (roll-up by summation);
    /// `avg` uses the dialect's null-safe average; everything else (min,
    /// max, number, statistical) passes through as `MIN`/`MAX`, the closest
    /// defined combinator, since the CTE stored a single scalar per group.
    fn reaggregate_over_cte(&self, measure: &Measure, cte_alias: &str, column: &str) -> SqlExpr {
        let cte_column = SqlExpr::table_column(cte_alias.to_string(), column.to_string());
        match measure {
            Measure::Aggregate { agg_type, .. } => match agg_type {
                AggregateType::Count | AggregateType::Sum | AggregateType::CountDistinct => {
                    SqlExpr::call("SUM", vec![cte_column], false)
                }
                AggregateType::Avg => self.dialect.build_avg(cte_column),
                AggregateType::Min => SqlExpr::call("MIN", vec![cte_column], false),
                AggregateType::Max | AggregateType::Number => SqlExpr::call("MAX", vec![cte_column], false),
            },
            _ => SqlExpr::call("MAX", vec![cte_column], false),
        }
    }

    /// Build one post-aggregation window measure for the executor's outer
    /// layer: every partition/order/argument reference resolves
    /// against the inner aggregation's own column aliases, never against the
    /// base cube's raw row expressions, since by this point the rows no
    /// longer exist - only the inner relation's grouped output does.
    pub fn build_post_aggregation_window(&mut self, qualified: &str, inner_alias: &str) -> Result<SqlExpr> {
        let (cube, member) = self.registry.resolve_member(qualified)?;
        let (window_type, config) = match cube.measures.get(member) {
            Some(Measure::PostAggregationWindow { window_type, config }) => (*window_type, config.clone()),
            _ => return Err(CompileError::UnknownMember(qualified.to_string())),
        };
        let cube_name = cube.name.clone();

        let arg = config.measure.as_ref().map(|base| {
            let qualified_base = qualify(base, &cube_name);
            SqlExpr::table_column(inner_alias.to_string(), local_member_name(&qualified_base))
        });
        let partition_by = config
            .partition_by
            .iter()
            .map(|m| SqlExpr::table_column(inner_alias.to_string(), local_member_name(&qualify(m, &cube_name))))
            .collect();
        let order_by = config
            .order_by
            .iter()
            .map(|(m, asc)| (SqlExpr::table_column(inner_alias.to_string(), local_member_name(&qualify(m, &cube_name))), *asc))
            .collect();
        let spec = WindowSpec {
            partition_by,
            order_by,
            offset: config.offset,
            default_value: config.default_value.clone(),
            n_tile: config.n_tile,
            frame: config.frame.map(|(preceding, following)| crate::sql::dialect::WindowFrame { preceding, following }),
        };

        let kind = window_kind(window_type);
        match self.dialect.build_window_function(kind, arg, spec) {
            Some(expr) => Ok(expr),
            None => {
                let message = format!(
                    "{:?} window function is unsupported on dialect '{}'; degraded to NULL",
                    window_type,
                    self.dialect.name()
                );
                tracing::warn!(cube = %cube_name, member = %member, message = %message, "post-aggregation window degraded");
                self.warnings.push(Warning::new(cube_name, member, message));
                Ok(SqlExpr::null())
            }
        }
    }
}

fn local_member_name(qualified: &str) -> String {
    qualified.rsplit('.').next().unwrap_or(qualified).to_string()
}

fn resolve_dimension(dim: &Dimension, ctx: &QueryContext) -> SqlExpr {
    resolver::resolve(&dim.sql, ctx)
}

fn window_kind(window_type: WindowType) -> WindowKind {
    match window_type {
        WindowType::Lag => WindowKind::Lag,
        WindowType::Lead => WindowKind::Lead,
        WindowType::Rank => WindowKind::Rank,
        WindowType::DenseRank => WindowKind::DenseRank,
        WindowType::RowNumber => WindowKind::RowNumber,
        WindowType::NTile => WindowKind::NTile,
        WindowType::FirstValue => WindowKind::FirstValue,
        WindowType::LastValue => WindowKind::LastValue,
        WindowType::MovingAvg => WindowKind::MovingAvg,
        WindowType::MovingSum => WindowKind::MovingSum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::model::{Cube, CubeRelation};
    use crate::query::context::SecurityContext;
    use crate::sql::dialect::PostgresDialect;
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
        .with_measure("count", Measure::aggregate(AggregateType::Count, column_resolver("employees", "id")))
        .with_measure("activeCount", Measure::aggregate(AggregateType::Count, column_resolver("employees", "id")))
        .with_measure(
            "activePercentage",
            Measure::Calculated {
                calculated_sql: "100.0 * {activeCount} / {count}".into(),
            },
        );
        registry.register(cube);
        registry
    }

    #[test]
    fn test_calculated_measure_resolves_dependencies_first() {
        let registry = registry();
        let ctx = QueryContext::new("db", SecurityContext::default());
        let dialect = PostgresDialect;
        let mut builder = MeasureBuilder::new(&dialect, &registry, &ctx);
        let resolved = builder.resolve(&["Employees.activePercentage".to_string()], &MeasureScope::new()).unwrap();
        assert!(resolved.contains_key("Employees.count"));
        assert!(resolved.contains_key("Employees.activeCount"));
        match resolved.get("Employees.activePercentage").unwrap() {
            SqlExpr::Template(parts) => assert_eq!(parts.len(), 4),
            other => panic!("expected a template, got {:?}", other),
        }
    }

    #[test]
    fn test_cte_reaggregation_sums_count() {
        let registry = registry();
        let ctx = QueryContext::new("db", SecurityContext::default());
        let dialect = PostgresDialect;
        let builder = MeasureBuilder::new(&dialect, &registry, &ctx);
        let (_cube, member) = registry.resolve_member("Employees.count").unwrap();
        let measure = registry.get("Employees").unwrap().measures.get(member).unwrap();
        let expr = builder.reaggregate_over_cte(measure, "cte_employees", "count");
        match expr {
            SqlExpr::Call { name, .. } => assert_eq!(name, "SUM"),
            other => panic!("expected SUM(...), got {:?}", other),
        }
    }
}
