//! SQLite SQL dialect.
//!
//! SQLite is the most restricted target:
//! - timestamps are stored as unix-epoch integers
//!   ([`SqlDialect::is_timestamp_integer`] returns `true`), bucketed via
//!   `datetime(...)`/`strftime(...)` modifiers rather than `DATE_TRUNC`
//! - no `STDDEV`/`VARIANCE`/percentile aggregates, no window functions -
//!   all three degrade to NULL with a warning
//! - integer division truncates, so calculated-measure templates are
//!   promoted to floating point before splicing (`preprocess_template`)

use super::super::expr::{BinaryOperator, Literal, SqlExpr};
use super::helpers;
use super::{
    CastTarget, Capabilities, IntervalUnit, PercentileSpec, SqlDialect, StringOp, WindowKind,
    WindowSpec,
};
use crate::model::types::Granularity;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stddev: false,
            supports_variance: false,
            supports_percentile: false,
            supports_percentile_subqueries: true,
            supports_window_functions: false,
            supports_frame_clause: false,
            supports_lateral_joins: false,
            supports_aggregate_filter: false,
        }
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_placeholder(&self, index: usize) -> String {
        helpers::placeholder_question(index)
    }

    fn is_timestamp_integer(&self) -> bool {
        true
    }

    fn build_time_dimension(&self, granularity: Granularity, expr: SqlExpr) -> SqlExpr {
        let truncated = match granularity {
            Granularity::Second => strftime(expr, "%Y-%m-%d %H:%M:%S"),
            Granularity::Minute => strftime(expr, "%Y-%m-%d %H:%M:00"),
            Granularity::Hour => strftime(expr, "%Y-%m-%d %H:00:00"),
            Granularity::Day => datetime_modifier(expr, "start of day"),
            Granularity::Week => datetime_modifiers(expr, &["weekday 1", "-7 days"]),
            Granularity::Month => datetime_modifier(expr, "start of month"),
            Granularity::Quarter => quarter_start(expr),
            Granularity::Year => datetime_modifier(expr, "start of year"),
        };
        epoch_seconds(truncated).cast("INTEGER")
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
            CastTarget::Timestamp => "INTEGER",
            CastTarget::Decimal => "REAL",
            CastTarget::Integer => "INTEGER",
        };
        expr.cast(ty)
    }

    fn date_add(&self, expr: SqlExpr, n: i64, unit: IntervalUnit) -> SqlExpr {
        let modifier = format!("{:+} {}", n, helpers::sqlite_modifier_unit(unit));
        epoch_seconds(datetime_modifier(expr, &modifier)).cast("INTEGER")
    }

    fn date_diff(&self, unit: IntervalUnit, start: SqlExpr, end: SqlExpr) -> SqlExpr {
        let delta_seconds = end.infix("-", start);
        let divisor = match unit {
            IntervalUnit::Second => 1.0,
            IntervalUnit::Minute => 60.0,
            IntervalUnit::Hour => 3600.0,
            IntervalUnit::Day | IntervalUnit::Week => 86400.0,
            IntervalUnit::Month | IntervalUnit::Quarter => 2_592_000.0,
            IntervalUnit::Year => 31_536_000.0,
        };
        let scaled = match unit {
            IntervalUnit::Week => delta_seconds.infix("/", SqlExpr::Literal(Literal::Float(604_800.0))),
            IntervalUnit::Quarter => delta_seconds.infix("/", SqlExpr::Literal(Literal::Float(7_776_000.0))),
            _ => delta_seconds.infix("/", SqlExpr::Literal(Literal::Float(divisor))),
        };
        scaled.cast("INTEGER")
    }

    fn build_percentile(&self, _expr: SqlExpr, _spec: PercentileSpec) -> Option<SqlExpr> {
        None
    }

    fn build_stddev(&self, _expr: SqlExpr, _sample: bool) -> Option<SqlExpr> {
        None
    }

    fn build_variance(&self, _expr: SqlExpr, _sample: bool) -> Option<SqlExpr> {
        None
    }

    fn build_window_function(
        &self,
        _kind: WindowKind,
        _arg: Option<SqlExpr>,
        _spec: WindowSpec,
    ) -> Option<SqlExpr> {
        None
    }

    fn preprocess_template(&self, expr: SqlExpr) -> SqlExpr {
        promote_integer_division(expr)
    }
}

fn strftime(expr: SqlExpr, format_mask: &str) -> SqlExpr {
    SqlExpr::call(
        "STRFTIME",
        vec![SqlExpr::raw(format!("'{}'", format_mask)), as_datetime(expr)],
        false,
    )
}

fn datetime_modifier(expr: SqlExpr, modifier: &str) -> SqlExpr {
    SqlExpr::call(
        "DATETIME",
        vec![expr, SqlExpr::raw("'unixepoch'"), SqlExpr::raw(format!("'{}'", modifier))],
        false,
    )
}

fn datetime_modifiers(expr: SqlExpr, modifiers: &[&str]) -> SqlExpr {
    let mut args = vec![expr, SqlExpr::raw("'unixepoch'")];
    args.extend(modifiers.iter().map(|m| SqlExpr::raw(format!("'{}'", m))));
    SqlExpr::call("DATETIME", args, false)
}

fn as_datetime(expr: SqlExpr) -> SqlExpr {
    SqlExpr::call("DATETIME", vec![expr, SqlExpr::raw("'unixepoch'")], false)
}

/// `strftime('%s', ...)` - converts a datetime text value back to unix epoch.
fn epoch_seconds(datetime_expr: SqlExpr) -> SqlExpr {
    SqlExpr::call("STRFTIME", vec![SqlExpr::raw("'%s'"), datetime_expr], false)
}

/// Truncate to the first day of the quarter containing `expr`.
fn quarter_start(expr: SqlExpr) -> SqlExpr {
    let month = SqlExpr::call("STRFTIME", vec![SqlExpr::raw("'%m'"), as_datetime(expr.clone())], false)
        .cast("INTEGER");
    let months_into_quarter = month
        .infix("-", SqlExpr::Literal(Literal::Int(1)))
        .infix("/", SqlExpr::Literal(Literal::Int(3)))
        .infix("*", SqlExpr::Literal(Literal::Int(3)));
    let modifier_text = months_into_quarter
        .cast("TEXT")
        .concat(SqlExpr::Literal(Literal::Str(" months".into())));
    SqlExpr::call(
        "DATETIME",
        vec![expr, SqlExpr::raw("'unixepoch'"), SqlExpr::raw("'start of year'"), modifier_text],
        false,
    )
}

/// Rewrite `int_col / int_col` into `int_col * 1.0 / int_col` so SQLite's
/// truncating integer division doesn't corrupt calculated-measure ratios.
fn promote_integer_division(expr: SqlExpr) -> SqlExpr {
    match expr {
        SqlExpr::BinaryOp {
            left,
            op: BinaryOperator::Div,
            right,
        } => {
            let left = promote_integer_division(*left);
            let right = promote_integer_division(*right);
            SqlExpr::BinaryOp {
                left: Box::new(SqlExpr::BinaryOp {
                    left: Box::new(left),
                    op: BinaryOperator::Mul,
                    right: Box::new(SqlExpr::Literal(Literal::Float(1.0))),
                }),
                op: BinaryOperator::Div,
                right: Box::new(right),
            }
        }
        SqlExpr::BinaryOp { left, op, right } => SqlExpr::BinaryOp {
            left: Box::new(promote_integer_division(*left)),
            op,
            right: Box::new(promote_integer_division(*right)),
        },
        SqlExpr::Call { name, args, distinct } => SqlExpr::Call {
            name,
            args: args.into_iter().map(promote_integer_division).collect(),
            distinct,
        },
        SqlExpr::Paren(inner) => SqlExpr::Paren(Box::new(promote_integer_division(*inner))),
        other => other,
    }
}
