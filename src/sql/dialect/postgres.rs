//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features used here:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - `$N` numbered placeholders
//! - `DATE_TRUNC` for time bucketing
//! - `FILTER (WHERE ...)` for conditional aggregates
//! - `PERCENTILE_CONT`/`PERCENTILE_DISC` for percentiles
//! - full window-function support with frame clauses

use super::super::expr::SqlExpr;
use super::helpers;
use super::{
    CastTarget, Capabilities, IntervalUnit, PercentileSpec, SqlDialect, StringOp, WindowKind,
    WindowSpec,
};
use crate::model::types::Granularity;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stddev: true,
            supports_variance: true,
            supports_percentile: true,
            supports_percentile_subqueries: true,
            supports_window_functions: true,
            supports_frame_clause: true,
            supports_lateral_joins: true,
            supports_aggregate_filter: true,
        }
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_placeholder(&self, index: usize) -> String {
        helpers::placeholder_dollar(index)
    }

    fn build_time_dimension(&self, granularity: Granularity, expr: SqlExpr) -> SqlExpr {
        SqlExpr::call(
            "DATE_TRUNC",
            vec![SqlExpr::raw(format!("'{}'", granularity.as_str())), expr],
            false,
        )
    }

    fn build_string_condition(&self, expr: SqlExpr, op: StringOp, value: SqlExpr) -> SqlExpr {
        match op {
            StringOp::Contains => expr.infix("LIKE", value),
            StringOp::NotContains => expr.infix("LIKE", value).not(),
            StringOp::StartsWith => expr.infix("LIKE", value),
            StringOp::EndsWith => expr.infix("LIKE", value),
            StringOp::Like => expr.infix("LIKE", value),
            StringOp::NotLike => expr.infix("LIKE", value).not(),
            StringOp::ILike => expr.infix("ILIKE", value),
            StringOp::Regex => expr.infix("~", value),
            StringOp::NotRegex => expr.infix("!~", value),
        }
    }

    fn cast(&self, expr: SqlExpr, target: CastTarget) -> SqlExpr {
        let ty = match target {
            CastTarget::Timestamp => "TIMESTAMP",
            CastTarget::Decimal => "DECIMAL",
            CastTarget::Integer => "INTEGER",
        };
        expr.cast(ty)
    }

    fn date_add(&self, expr: SqlExpr, n: i64, unit: IntervalUnit) -> SqlExpr {
        // `n` is a trusted i64 (never user SQL text), so a single quoted
        // interval literal is safe here.
        expr.infix(
            "+",
            SqlExpr::raw(format!("INTERVAL '{} {}'", n, helpers::interval_unit_keyword(unit))),
        )
    }

    fn date_diff(&self, unit: IntervalUnit, start: SqlExpr, end: SqlExpr) -> SqlExpr {
        let diff = SqlExpr::extract("EPOCH", end.infix("-", start));
        match seconds_per_unit(unit) {
            1.0 => diff,
            divisor => diff.infix("/", SqlExpr::Literal(super::super::expr::Literal::Float(divisor))),
        }
    }

    fn build_percentile(&self, expr: SqlExpr, spec: PercentileSpec) -> Option<SqlExpr> {
        let fn_name = if spec.use_sample {
            "PERCENTILE_DISC"
        } else {
            "PERCENTILE_CONT"
        };
        Some(SqlExpr::WithinGroup {
            name: fn_name.into(),
            args: vec![SqlExpr::Literal(super::super::expr::Literal::Float(spec.fraction))],
            order_by: Box::new(expr),
        })
    }

    fn build_window_function(
        &self,
        kind: WindowKind,
        arg: Option<SqlExpr>,
        spec: WindowSpec,
    ) -> Option<SqlExpr> {
        super::build_standard_window_function(kind, arg, spec)
    }
}

fn seconds_per_unit(unit: IntervalUnit) -> f64 {
    match unit {
        IntervalUnit::Second => 1.0,
        IntervalUnit::Minute => 60.0,
        IntervalUnit::Hour => 3600.0,
        IntervalUnit::Day => 86400.0,
        IntervalUnit::Week => 604_800.0,
        IntervalUnit::Month => 2_592_000.0,
        IntervalUnit::Quarter => 7_776_000.0,
        IntervalUnit::Year => 31_536_000.0,
    }
}
