//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI relevant to this compiler:
//! - Backtick identifier quoting
//! - `?` positional placeholders (no numbered style)
//! - No `PERCENTILE_CONT`/`PERCENTILE_DISC` - percentile measures degrade
//!   to NULL with a warning (`supports_percentile_subqueries` still lets
//!   the planner fall back to an ordered-subquery approximation)
//! - No `FILTER (WHERE ...)` - conditional aggregates use `CASE WHEN`
//! - `TIMESTAMPDIFF`/`DATE_ADD` for date math instead of `INTERVAL` literals

use super::super::expr::SqlExpr;
use super::helpers;
use super::{
    CastTarget, Capabilities, IntervalUnit, PercentileSpec, SqlDialect, StringOp, WindowKind,
    WindowSpec,
};
use crate::model::types::Granularity;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stddev: true,
            supports_variance: true,
            supports_percentile: false,
            supports_percentile_subqueries: true,
            supports_window_functions: true,
            supports_frame_clause: true,
            supports_lateral_joins: true,
            supports_aggregate_filter: false,
        }
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_placeholder(&self, index: usize) -> String {
        helpers::placeholder_question(index)
    }

    fn build_time_dimension(&self, granularity: Granularity, expr: SqlExpr) -> SqlExpr {
        if granularity == Granularity::Week {
            // Truncate to the Monday of the week containing `expr`.
            return SqlExpr::call(
                "DATE_SUB",
                vec![
                    SqlExpr::call("DATE", vec![expr.clone()], false),
                    SqlExpr::Interval {
                        amount: Box::new(SqlExpr::call("WEEKDAY", vec![expr], false)),
                        unit: "DAY",
                    },
                ],
                false,
            );
        }
        let format_mask = match granularity {
            Granularity::Second => "%Y-%m-%d %H:%i:%s",
            Granularity::Minute => "%Y-%m-%d %H:%i:00",
            Granularity::Hour => "%Y-%m-%d %H:00:00",
            Granularity::Day => "%Y-%m-%d 00:00:00",
            Granularity::Month => "%Y-%m-01 00:00:00",
            Granularity::Quarter => "%Y-%m-01 00:00:00",
            Granularity::Year => "%Y-01-01 00:00:00",
            Granularity::Week => unreachable!("handled above"),
        };
        let formatted = SqlExpr::call(
            "DATE_FORMAT",
            vec![expr, SqlExpr::raw(format!("'{}'", format_mask))],
            false,
        );
        SqlExpr::call(
            "STR_TO_DATE",
            vec![formatted, SqlExpr::raw("'%Y-%m-%d %H:%i:%s'")],
            false,
        )
    }

    fn build_string_condition(&self, expr: SqlExpr, op: StringOp, value: SqlExpr) -> SqlExpr {
        match op {
            StringOp::Contains | StringOp::StartsWith | StringOp::EndsWith | StringOp::Like => {
                expr.infix("LIKE", value)
            }
            StringOp::NotContains | StringOp::NotLike => expr.infix("LIKE", value).not(),
            StringOp::ILike => SqlExpr::call("LOWER", vec![expr], false)
                .infix("LIKE", SqlExpr::call("LOWER", vec![value], false)),
            StringOp::Regex => expr.infix("REGEXP", value),
            StringOp::NotRegex => expr.infix("REGEXP", value).not(),
        }
    }

    fn cast(&self, expr: SqlExpr, target: CastTarget) -> SqlExpr {
        let ty = match target {
            CastTarget::Timestamp => "DATETIME",
            CastTarget::Decimal => "DECIMAL(18,4)",
            CastTarget::Integer => "SIGNED",
        };
        expr.cast(ty)
    }

    fn date_add(&self, expr: SqlExpr, n: i64, unit: IntervalUnit) -> SqlExpr {
        SqlExpr::call(
            "DATE_ADD",
            vec![
                expr,
                SqlExpr::raw(format!("INTERVAL {} {}", n, helpers::interval_unit_keyword_mysql(unit))),
            ],
            false,
        )
    }

    fn date_diff(&self, unit: IntervalUnit, start: SqlExpr, end: SqlExpr) -> SqlExpr {
        SqlExpr::call(
            "TIMESTAMPDIFF",
            vec![SqlExpr::raw(helpers::interval_unit_keyword_mysql(unit)), start, end],
            false,
        )
    }

    fn build_percentile(&self, _expr: SqlExpr, _spec: PercentileSpec) -> Option<SqlExpr> {
        None
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
