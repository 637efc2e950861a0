//! DuckDB SQL dialect.
//!
//! DuckDB is largely PostgreSQL-compatible for analytical SQL:
//! - ANSI identifier quoting (`"`)
//! - `DATE_TRUNC` for time bucketing
//! - `QUANTILE_CONT`/`QUANTILE_DISC` for percentiles (plain aggregate
//!   calls, unlike Postgres's `WITHIN GROUP` ordered-set syntax)
//! - full window-function and `FILTER (WHERE ...)` support

use super::super::expr::SqlExpr;
use super::helpers;
use super::{
    CastTarget, Capabilities, IntervalUnit, PercentileSpec, SqlDialect, StringOp, WindowKind,
    WindowSpec,
};
use crate::model::types::Granularity;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
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
            StringOp::Regex => SqlExpr::call("REGEXP_MATCHES", vec![expr, value], false),
            StringOp::NotRegex => SqlExpr::call("REGEXP_MATCHES", vec![expr, value], false).not(),
        }
    }

    fn cast(&self, expr: SqlExpr, target: CastTarget) -> SqlExpr {
        let ty = match target {
            CastTarget::Timestamp => "TIMESTAMP",
            CastTarget::Decimal => "DECIMAL(18,4)",
            CastTarget::Integer => "BIGINT",
        };
        expr.cast(ty)
    }

    fn date_add(&self, expr: SqlExpr, n: i64, unit: IntervalUnit) -> SqlExpr {
        expr.infix(
            "+",
            SqlExpr::raw(format!("INTERVAL '{} {}'", n, helpers::interval_unit_keyword(unit))),
        )
    }

    fn date_diff(&self, unit: IntervalUnit, start: SqlExpr, end: SqlExpr) -> SqlExpr {
        SqlExpr::call(
            "DATE_DIFF",
            vec![SqlExpr::raw(format!("'{}'", helpers::interval_unit_keyword(unit))), start, end],
            false,
        )
    }

    fn build_percentile(&self, expr: SqlExpr, spec: PercentileSpec) -> Option<SqlExpr> {
        let fn_name = if spec.use_sample {
            "QUANTILE_DISC"
        } else {
            "QUANTILE_CONT"
        };
        Some(SqlExpr::call(
            fn_name,
            vec![expr, SqlExpr::Literal(super::super::expr::Literal::Float(spec.fraction))],
            false,
        ))
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
