//! Shared helper functions for dialect implementations.

use super::IntervalUnit;

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, SQLite.
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL.
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

/// PostgreSQL/DuckDB numbered placeholders: `$1`, `$2`, ...
pub fn placeholder_dollar(index: usize) -> String {
    format!("${}", index + 1)
}

/// MySQL/SQLite positional placeholders: `?`.
pub fn placeholder_question(_index: usize) -> String {
    "?".into()
}

/// `INTERVAL 'n unit'` keyword text, shared by Postgres/DuckDB.
pub fn interval_unit_keyword(unit: IntervalUnit) -> &'static str {
    match unit {
        IntervalUnit::Second => "second",
        IntervalUnit::Minute => "minute",
        IntervalUnit::Hour => "hour",
        IntervalUnit::Day => "day",
        IntervalUnit::Week => "week",
        IntervalUnit::Month => "month",
        IntervalUnit::Quarter => "quarter",
        IntervalUnit::Year => "year",
    }
}

/// MySQL `INTERVAL n UNIT` keyword spelling (no quotes, upper-case unit).
pub fn interval_unit_keyword_mysql(unit: IntervalUnit) -> &'static str {
    match unit {
        IntervalUnit::Second => "SECOND",
        IntervalUnit::Minute => "MINUTE",
        IntervalUnit::Hour => "HOUR",
        IntervalUnit::Day => "DAY",
        IntervalUnit::Week => "WEEK",
        IntervalUnit::Month => "MONTH",
        IntervalUnit::Quarter => "QUARTER",
        IntervalUnit::Year => "YEAR",
    }
}

/// SQLite `strftime`/date modifier unit spelling, e.g. `+1 day`.
pub fn sqlite_modifier_unit(unit: IntervalUnit) -> &'static str {
    match unit {
        IntervalUnit::Second => "seconds",
        IntervalUnit::Minute => "minutes",
        IntervalUnit::Hour => "hours",
        IntervalUnit::Day => "days",
        IntervalUnit::Week => "days", // caller multiplies n by 7
        IntervalUnit::Month => "months",
        IntervalUnit::Quarter => "months", // caller multiplies n by 3
        IntervalUnit::Year => "years",
    }
}
