//! Dialect adapters.
//!
//! One implementation per target engine. Each dialect resolves the
//! operations whose SQL spelling differs across engines - time bucketing,
//! string matching, casting, null-safe aggregation, statistics, window
//! functions, intervals - behind a single trait so the rest of the
//! compiler never branches on engine identity.
//!
//! A method returning `None` signals "unsupported - the caller degrades"
//! (see [`Capabilities`]).

mod duckdb;
mod helpers;
mod mysql;
mod postgres;
mod sqlite;

pub use duckdb::DuckDb as DuckDbDialect;
pub use mysql::MySql as MySqlDialect;
pub use postgres::Postgres as PostgresDialect;
pub use sqlite::Sqlite as SqliteDialect;

use super::expr::SqlExpr;
use crate::model::types::Granularity;

/// Interval/date-diff unit, shared by `date_add` and `date_diff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// String-matching operator family handled by [`SqlDialect::build_string_condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Like,
    NotLike,
    ILike,
    Regex,
    NotRegex,
}

/// Target type for [`SqlDialect::cast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    Timestamp,
    Decimal,
    Integer,
}

/// Statistical aggregate family handled by [`SqlDialect::build_percentile`] et al.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Stddev,
    StddevSamp,
    Variance,
    VarianceSamp,
    Percentile(PercentileSpec),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSpec {
    /// 0.0-1.0. `median` is `0.5`, `p95` is `0.95`, etc.
    pub fraction: f64,
    pub use_sample: bool,
}

/// A single window function kind plus its call-site argument, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Lag,
    Lead,
    Rank,
    DenseRank,
    RowNumber,
    NTile,
    FirstValue,
    LastValue,
    MovingAvg,
    MovingSum,
}

/// Frame clause for window functions (`MovingAvg`/`MovingSum` and similar).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub preceding: Option<u32>,
    pub following: Option<u32>,
}

/// Configuration shared by every window-function emission.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub partition_by: Vec<SqlExpr>,
    pub order_by: Vec<(SqlExpr, bool)>,
    pub offset: Option<i64>,
    pub default_value: Option<SqlExpr>,
    pub n_tile: Option<u32>,
    pub frame: Option<WindowFrame>,
}

/// What an engine can and cannot do - queried by the builders to decide
/// between emitting a real expression and degrading to NULL+warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_stddev: bool,
    pub supports_variance: bool,
    pub supports_percentile: bool,
    pub supports_percentile_subqueries: bool,
    pub supports_window_functions: bool,
    pub supports_frame_clause: bool,
    pub supports_lateral_joins: bool,
    pub supports_aggregate_filter: bool,
}

/// Per-engine SQL generation strategy.
pub trait SqlDialect: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    // === Identifiers & literals ===

    fn quote_identifier(&self, ident: &str) -> String;

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn format_bool(&self, b: bool) -> &'static str;

    /// Render the Nth (0-based) bound parameter as this dialect's placeholder.
    fn format_placeholder(&self, index: usize) -> String;

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Remap a function name for this dialect (case-insensitive match on `name`).
    fn remap_function(&self, _name: &str) -> Option<&'static str> {
        None
    }

    // === Time bucketing ===

    /// `DATE_TRUNC`-equivalent: bucket `expr` to `granularity`.
    fn build_time_dimension(&self, granularity: Granularity, expr: SqlExpr) -> SqlExpr;

    /// Whether this dialect stores the given time column as epoch seconds
    /// (SQLite) rather than milliseconds/native timestamp.
    fn is_timestamp_integer(&self) -> bool {
        false
    }

    // === String matching ===

    fn build_string_condition(&self, expr: SqlExpr, op: StringOp, value: SqlExpr) -> SqlExpr;

    // === Casting ===

    fn cast(&self, expr: SqlExpr, target: CastTarget) -> SqlExpr;

    // === Null-safe aggregation ===

    /// `AVG` wrapped so division-by-zero/NULL groups degrade to NULL instead
    /// of propagating a dialect error.
    fn build_avg(&self, expr: SqlExpr) -> SqlExpr {
        SqlExpr::call("AVG", vec![expr], false)
    }

    /// `CASE WHEN cond THEN a ELSE b END`.
    fn build_case_when(&self, branches: Vec<(SqlExpr, SqlExpr)>, else_: Option<SqlExpr>) -> SqlExpr {
        SqlExpr::Case {
            operand: None,
            when_then: branches,
            else_: else_.map(Box::new),
        }
    }

    /// `COUNT(...) FILTER (WHERE ...)` when supported, else the caller
    /// should fall back to wrapping the aggregate argument in CASE WHEN.
    fn build_conditional_aggregate(
        &self,
        agg_call: SqlExpr,
        condition: SqlExpr,
    ) -> Option<SqlExpr> {
        if !self.capabilities().supports_aggregate_filter {
            return None;
        }
        Some(SqlExpr::AggregateFilter {
            aggregate: Box::new(agg_call),
            condition: Box::new(condition),
        })
    }

    // === Intervals / date math ===

    /// `expr + n * unit`, used for relative date ranges and funnel/cohort math.
    fn date_add(&self, expr: SqlExpr, n: i64, unit: IntervalUnit) -> SqlExpr;

    /// Whole-unit difference `end - start` expressed in `unit`.
    fn date_diff(&self, unit: IntervalUnit, start: SqlExpr, end: SqlExpr) -> SqlExpr;

    /// `end - start` in seconds, used by time-to-event measures.
    fn time_diff_seconds(&self, start: SqlExpr, end: SqlExpr) -> SqlExpr {
        self.date_diff(IntervalUnit::Second, start, end)
    }

    // === Statistics ===

    fn build_stddev(&self, expr: SqlExpr, sample: bool) -> Option<SqlExpr> {
        if !self.capabilities().supports_stddev {
            return None;
        }
        let fn_name = if sample { "STDDEV_SAMP" } else { "STDDEV_POP" };
        Some(SqlExpr::call(fn_name, vec![expr], false))
    }

    fn build_variance(&self, expr: SqlExpr, sample: bool) -> Option<SqlExpr> {
        if !self.capabilities().supports_variance {
            return None;
        }
        let fn_name = if sample { "VAR_SAMP" } else { "VAR_POP" };
        Some(SqlExpr::call(fn_name, vec![expr], false))
    }

    fn build_percentile(&self, expr: SqlExpr, spec: PercentileSpec) -> Option<SqlExpr>;

    // === Window functions ===

    fn build_window_function(&self, kind: WindowKind, arg: Option<SqlExpr>, spec: WindowSpec) -> Option<SqlExpr>;

    // === Calculated-measure template preprocessing ===

    /// Engine-specific rewrite applied to a fully-substituted calculated
    /// measure expression before it's spliced into the SELECT list.
    ///
    /// SQLite promotes integer division (`/` between integer columns
    /// truncates); other dialects are identity transforms here.
    fn preprocess_template(&self, expr: SqlExpr) -> SqlExpr {
        expr
    }
}

/// Shared `OVER (...)` assembly used by dialects whose window-function
/// syntax matches the SQL standard (Postgres, DuckDB, MySQL 8+).
pub(super) fn build_standard_window_function(
    kind: WindowKind,
    arg: Option<SqlExpr>,
    spec: WindowSpec,
) -> Option<SqlExpr> {
    use super::expr::Literal;

    let function = match kind {
        WindowKind::Lag => SqlExpr::call("LAG", lag_lead_args(arg?, &spec), false),
        WindowKind::Lead => SqlExpr::call("LEAD", lag_lead_args(arg?, &spec), false),
        WindowKind::Rank => SqlExpr::call("RANK", vec![], false),
        WindowKind::DenseRank => SqlExpr::call("DENSE_RANK", vec![], false),
        WindowKind::RowNumber => SqlExpr::call("ROW_NUMBER", vec![], false),
        WindowKind::NTile => SqlExpr::call(
            "NTILE",
            vec![SqlExpr::Literal(Literal::Int(spec.n_tile.unwrap_or(4) as i64))],
            false,
        ),
        WindowKind::FirstValue => SqlExpr::call("FIRST_VALUE", vec![arg?], false),
        WindowKind::LastValue => SqlExpr::call("LAST_VALUE", vec![arg?], false),
        WindowKind::MovingAvg => SqlExpr::call("AVG", vec![arg?], false),
        WindowKind::MovingSum => SqlExpr::call("SUM", vec![arg?], false),
    };

    Some(SqlExpr::Window {
        function: Box::new(function),
        partition_by: spec.partition_by,
        order_by: spec
            .order_by
            .into_iter()
            .map(|(e, asc)| (e, if asc { super::expr::SortDir::Asc } else { super::expr::SortDir::Desc }))
            .collect(),
        frame: spec.frame.map(render_frame),
    })
}

fn lag_lead_args(arg: SqlExpr, spec: &WindowSpec) -> Vec<SqlExpr> {
    use super::expr::Literal;
    let mut args = vec![arg];
    if let Some(offset) = spec.offset {
        args.push(SqlExpr::Literal(Literal::Int(offset)));
        if let Some(default) = &spec.default_value {
            args.push(default.clone());
        }
    }
    args
}

fn render_frame(frame: WindowFrame) -> String {
    let preceding = match frame.preceding {
        Some(n) => format!("{} PRECEDING", n),
        None => "UNBOUNDED PRECEDING".into(),
    };
    let following = match frame.following {
        Some(0) | None => "CURRENT ROW".into(),
        Some(n) => format!("{} FOLLOWING", n),
    };
    format!("ROWS BETWEEN {} AND {}", preceding, following)
}

/// Supported target engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
    Sqlite,
    DuckDb,
}

impl Dialect {
    pub fn adapter(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &PostgresDialect,
            Dialect::MySql => &MySqlDialect,
            Dialect::Sqlite => &SqliteDialect,
            Dialect::DuckDb => &DuckDbDialect,
        }
    }

    pub fn quote_identifier(&self, ident: &str) -> String {
        self.adapter().quote_identifier(ident)
    }

    pub fn format_bool(&self, b: bool) -> &'static str {
        self.adapter().format_bool(b)
    }

    pub fn format_placeholder(&self, index: usize) -> String {
        self.adapter().format_placeholder(index)
    }

    pub fn quote_string(&self, s: &str) -> String {
        self.adapter().quote_string(s)
    }

    pub fn concat_operator(&self) -> &'static str {
        self.adapter().concat_operator()
    }

    pub fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.adapter().remap_function(name)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter().capabilities()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.adapter().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::DuckDb.to_string(), "duckdb");
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
        assert_eq!(Dialect::MySql.to_string(), "mysql");
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_quote_identifier_per_dialect() {
        assert_eq!(Dialect::DuckDb.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::MySql.quote_identifier("users"), "`users`");
        assert_eq!(Dialect::Sqlite.quote_identifier("users"), "\"users\"");
    }

    #[test]
    fn test_capabilities_mysql_degraded() {
        let caps = Dialect::MySql.capabilities();
        assert!(!caps.supports_percentile);
        assert!(caps.supports_stddev);
    }

    #[test]
    fn test_capabilities_sqlite_degraded() {
        let caps = Dialect::Sqlite.capabilities();
        assert!(!caps.supports_stddev);
        assert!(!caps.supports_variance);
        assert!(!caps.supports_percentile);
        assert!(!caps.supports_window_functions);
    }
}
