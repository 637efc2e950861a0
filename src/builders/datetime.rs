//! DateTimeBuilder - relative/absolute date ranges, granularity
//! bucketing, and cross-dialect date-value normalization.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::model::types::Granularity;
use crate::query::semantic_query::DateRangeInput;
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::SqlExpr;

/// Builds time-dimension bucketing expressions and resolves date ranges.
/// A pure function of its inputs and the injected `now` (repeated parses -
/// `parseRelativeDateRange` is a function of `(now, s)`).
pub struct DateTimeBuilder {
    pub now: DateTime<Utc>,
}

impl DateTimeBuilder {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// `buildTimeDimensionExpression`: resolve the base expr, then
    /// dispatch to the dialect's `DATE_TRUNC`-equivalent. With no
    /// granularity, the raw expression passes through unchanged.
    pub fn build_time_dimension_expression(
        &self,
        dialect: &dyn SqlDialect,
        base: SqlExpr,
        granularity: Option<Granularity>,
    ) -> SqlExpr {
        match granularity {
            Some(g) => dialect.build_time_dimension(g, base),
            None => base,
        }
    }

    /// Recognizes the exhaustive relative-phrase set, UTC-anchored,
    /// weeks running Monday-Sunday. Returns `None` for anything outside the
    /// closed vocabulary.
    pub fn parse_relative_date_range(&self, text: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let phrase = text.trim().to_lowercase();
        let today = self.now.date_naive();

        let range = match phrase.as_str() {
            "today" => (today, today),
            "yesterday" => {
                let d = today - Duration::days(1);
                (d, d)
            }
            "this week" => {
                let start = monday_of(today);
                (start, start + Duration::days(6))
            }
            "last week" => {
                let start = monday_of(today) - Duration::days(7);
                (start, start + Duration::days(6))
            }
            "this month" => {
                let start = month_start(today);
                (start, month_end(start))
            }
            "last month" => {
                let this_start = month_start(today);
                let last_end = this_start - Duration::days(1);
                let last_start = month_start(last_end);
                (last_start, last_end)
            }
            "this quarter" => {
                let start = quarter_start(today);
                (start, quarter_end(start))
            }
            "last quarter" => {
                let this_start = quarter_start(today);
                let last_end = this_start - Duration::days(1);
                let last_start = quarter_start(last_end);
                (last_start, quarter_end(last_start))
            }
            "this year" => (year_start(today), year_end(today)),
            "last year" => {
                let start = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).unwrap();
                (start, NaiveDate::from_ymd_opt(today.year() - 1, 12, 31).unwrap())
            }
            "last 12 months" => (shift_months(today, -12) + Duration::days(1), today),
            _ => return self.parse_last_n(&phrase, today),
        };

        Some(day_bounds(range.0, range.1))
    }

    /// `last N days|weeks|months|years`.
    fn parse_last_n(&self, phrase: &str, today: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut parts = phrase.split_whitespace();
        if parts.next()? != "last" {
            return None;
        }
        let n: i64 = parts.next()?.parse().ok()?;
        let unit = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let start = match unit {
            "days" | "day" => today - Duration::days(n - 1),
            "weeks" | "week" => today - Duration::days(n * 7 - 1),
            "months" | "month" => shift_months(today, -n) + Duration::days(1),
            "years" | "year" => shift_months(today, -n * 12) + Duration::days(1),
            _ => return None,
        };
        Some(day_bounds(start, today))
    }

    /// `normalizeDate`: accepts `YYYY-MM-DD`, an ISO8601 timestamp, an
    /// epoch number, or a native date `Value`; returns the representation
    /// the dialect's bound parameter wants - epoch seconds for SQLite,
    /// ISO text otherwise.
    pub fn normalize_date(&self, value: &Value, dialect: &dyn SqlDialect) -> Result<Value> {
        let dt = self.parse_any_date(value)?;
        Ok(self.render_for_dialect(dt, dialect))
    }

    fn render_for_dialect(&self, dt: DateTime<Utc>, dialect: &dyn SqlDialect) -> Value {
        if dialect.is_timestamp_integer() {
            Value::from(dt.timestamp())
        } else {
            Value::from(dt.to_rfc3339())
        }
    }

    fn parse_any_date(&self, value: &Value) -> Result<DateTime<Utc>> {
        match value {
            Value::String(s) => self.parse_date_string(s),
            Value::Number(n) => {
                let epoch = n.as_i64().ok_or_else(|| CompileError::InvalidDateRange {
                    member: String::new(),
                    reason: format!("non-integer epoch value {}", n),
                })?;
                Ok(Utc.timestamp_opt(epoch, 0).single().ok_or_else(|| CompileError::InvalidDateRange {
                    member: String::new(),
                    reason: format!("out-of-range epoch {}", epoch),
                })?)
            }
            other => Err(CompileError::InvalidDateRange {
                member: String::new(),
                reason: format!("cannot interpret {:?} as a date", other),
            }),
        }
    }

    fn parse_date_string(&self, s: &str) -> Result<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Some(parsed) = self.parse_relative_date_range(s) {
            return Ok(parsed.0);
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
        Err(CompileError::InvalidDateRange {
            member: String::new(),
            reason: format!("unrecognized date value '{}'", s),
        })
    }

    /// `buildDateRangeCondition`: resolves any [`DateRangeInput`]
    /// shape into a `BETWEEN` predicate against the already-resolved column
    /// expression. Relative phrases are parsed first; a date-only bound
    /// expands to `[00:00:00, 23:59:59.999]` UTC.
    pub fn build_date_range_condition(
        &self,
        dialect: &dyn SqlDialect,
        expr: SqlExpr,
        range: &DateRangeInput,
    ) -> Result<SqlExpr> {
        let (start, end) = self.resolve_range(range)?;
        let low = self.bind(start, dialect);
        let high = self.bind(end, dialect);
        Ok(SqlExpr::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        })
    }

    /// Resolve any [`DateRangeInput`] to concrete UTC bounds without
    /// binding them - used both by `build_date_range_condition` and by the
    /// planner when propagating a time filter into a CTE subquery.
    pub fn resolve_range(&self, range: &DateRangeInput) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match range {
            DateRangeInput::Relative(phrase) => {
                self.parse_relative_date_range(phrase).ok_or_else(|| CompileError::InvalidDateRange {
                    member: String::new(),
                    reason: format!("unrecognized relative date phrase '{}'", phrase),
                })
            }
            DateRangeInput::Absolute(start, end) => {
                let start = self.parse_date_string(start)?;
                let end = self.expand_end_if_date_only(end)?;
                Ok((start, end))
            }
            DateRangeInput::Single(date) => {
                let start = self.parse_date_string(date)?;
                Ok(day_bounds(start.date_naive(), start.date_naive()))
            }
        }
    }

    /// A date-only upper bound (`inDateRange`'s rule) extends to
    /// end-of-day; a full timestamp passes through unchanged.
    fn expand_end_if_date_only(&self, end: &str) -> Result<DateTime<Utc>> {
        if let Ok(date) = NaiveDate::parse_from_str(end, "%Y-%m-%d") {
            Ok(Utc.from_utc_datetime(&date.and_time(end_of_day())))
        } else {
            self.parse_date_string(end)
        }
    }

    fn bind(&self, dt: DateTime<Utc>, dialect: &dyn SqlDialect) -> SqlExpr {
        SqlExpr::Param(self.render_for_dialect(dt, dialect))
    }
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday();
    date - Duration::days(weekday as i64)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap()
}

fn month_end(start: NaiveDate) -> NaiveDate {
    shift_months(start, 1) - Duration::days(1)
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    let quarter_month = ((date.month0() / 3) * 3) + 1;
    NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap()
}

fn quarter_end(start: NaiveDate) -> NaiveDate {
    shift_months(start, 3) - Duration::days(1)
}

fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap()
}

fn year_end(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap()
}

/// Shift `date` by `n` months, clamping to the last valid day when the
/// target month is shorter (e.g. Jan 31 - 1 month -> Dec 31, not an error).
fn shift_months(date: NaiveDate, n: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + n;
    let year = total.div_euclid(12);
    let month0 = total.rem_euclid(12);
    let mut day = date.day();
    loop {
        if let Some(d) = NaiveDate::from_ymd_opt(year, (month0 + 1) as u32, day) {
            return d;
        }
        day -= 1;
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap()
}

fn day_bounds(start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)),
        Utc.from_utc_datetime(&end.and_time(end_of_day())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        // Wednesday, 2024-06-12.
        Utc.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_last_7_days() {
        let builder = DateTimeBuilder::new(fixed_now());
        let (start, end) = builder.parse_relative_date_range("last 7 days").unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 6).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        assert_eq!(end.time(), end_of_day());
    }

    #[test]
    fn test_this_week_starts_monday() {
        let builder = DateTimeBuilder::new(fixed_now());
        let (start, end) = builder.parse_relative_date_range("this week").unwrap();
        assert_eq!(start.weekday(), chrono::Weekday::Mon);
        assert_eq!(end.weekday(), chrono::Weekday::Sun);
    }

    #[test]
    fn test_last_month_crosses_year_boundary() {
        let builder = DateTimeBuilder::new(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        let (start, end) = builder.parse_relative_date_range("last month").unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_idempotent_parse() {
        let builder = DateTimeBuilder::new(fixed_now());
        let first = builder.parse_relative_date_range("last quarter");
        let second = builder.parse_relative_date_range("last quarter");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unrecognized_phrase_returns_none() {
        let builder = DateTimeBuilder::new(fixed_now());
        assert!(builder.parse_relative_date_range("next sprint").is_none());
    }
}
