//! FilterBuilder - dispatches each [`FilterOperator`] to a predicate
//! over an already-resolved column expression.

use serde_json::Value;

use super::datetime::DateTimeBuilder;
use crate::error::{CompileError, Result};
use crate::model::types::DataType;
use crate::query::semantic_query::{DateRangeInput, FilterCondition, FilterOperator};
use crate::sql::dialect::{SqlDialect, StringOp};
use crate::sql::expr::SqlExpr;

pub struct FilterBuilder<'a> {
    pub dialect: &'a dyn SqlDialect,
    pub datetime: &'a DateTimeBuilder,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, datetime: &'a DateTimeBuilder) -> Self {
        Self { dialect, datetime }
    }

    /// Build the predicate for one [`FilterCondition`] against `expr`, the
    /// already-resolved dimension/measure expression. `data_type` drives
    /// time-value normalization and array-operator gating.
    pub fn build(&self, expr: SqlExpr, data_type: DataType, condition: &FilterCondition) -> Result<SqlExpr> {
        if let Some(range) = &condition.date_range {
            if condition.operator != FilterOperator::InDateRange {
                return Err(CompileError::InvalidDateRange {
                    member: condition.member.clone(),
                    reason: "dateRange is only valid with operator 'inDateRange'".into(),
                });
            }
            if data_type != DataType::Time {
                return Err(CompileError::InvalidDateRange {
                    member: condition.member.clone(),
                    reason: "dateRange is only valid on a time-typed field".into(),
                });
            }
            return self.datetime.build_date_range_condition(self.dialect, expr, range);
        }

        if condition.operator.is_array_operator() {
            // Array operators are PostgreSQL-only; other dialects
            // silently no-op, matching the source's degrade-not-abort
            // posture for dialect-unsupported predicate shapes.
            if self.dialect.name() != "postgres" {
                return Ok(SqlExpr::Literal(crate::sql::expr::Literal::Bool(true)));
            }
        }

        let values = self.clean_values(&condition.values, data_type)?;

        match condition.operator {
            FilterOperator::Equals => self.equals(expr, values, false),
            FilterOperator::NotEquals => self.equals(expr, values, true),
            FilterOperator::Set => Ok(SqlExpr::IsNull { expr: Box::new(expr), negated: true }),
            FilterOperator::NotSet => Ok(SqlExpr::IsNull { expr: Box::new(expr), negated: false }),
            FilterOperator::IsEmpty => Ok(self.is_empty(expr, false)),
            FilterOperator::IsNotEmpty => Ok(self.is_empty(expr, true)),
            FilterOperator::Contains => self.string_op(expr, StringOp::Contains, values, |v| format!("%{}%", escape_like(&v))),
            FilterOperator::NotContains => {
                self.string_op(expr, StringOp::NotContains, values, |v| format!("%{}%", escape_like(&v)))
            }
            FilterOperator::StartsWith => self.string_op(expr, StringOp::StartsWith, values, |v| format!("{}%", escape_like(&v))),
            FilterOperator::EndsWith => self.string_op(expr, StringOp::EndsWith, values, |v| format!("%{}", escape_like(&v))),
            FilterOperator::Like => self.string_op(expr, StringOp::Like, values, |v| v),
            FilterOperator::NotLike => self.string_op(expr, StringOp::NotLike, values, |v| v),
            FilterOperator::ILike => self.string_op(expr, StringOp::ILike, values, |v| v),
            FilterOperator::Regex => self.string_op(expr, StringOp::Regex, values, |v| v),
            FilterOperator::NotRegex => self.string_op(expr, StringOp::NotRegex, values, |v| v),
            FilterOperator::Gt => self.comparison(expr, values, crate::sql::expr::BinaryOperator::Gt),
            FilterOperator::Gte => self.comparison(expr, values, crate::sql::expr::BinaryOperator::Gte),
            FilterOperator::Lt => self.comparison(expr, values, crate::sql::expr::BinaryOperator::Lt),
            FilterOperator::Lte => self.comparison(expr, values, crate::sql::expr::BinaryOperator::Lte),
            FilterOperator::In => self.list_op(expr, values, false),
            FilterOperator::NotIn => self.list_op(expr, values, true),
            FilterOperator::Between => self.between(expr, values, false),
            FilterOperator::NotBetween => self.between(expr, values, true),
            FilterOperator::BeforeDate => self.comparison(expr, values, crate::sql::expr::BinaryOperator::Lt),
            FilterOperator::AfterDate => self.comparison(expr, values, crate::sql::expr::BinaryOperator::Gt),
            FilterOperator::InDateRange => Err(CompileError::InvalidDateRange {
                member: condition.member.clone(),
                reason: "inDateRange requires a dateRange value".into(),
            }),
            FilterOperator::ArrayContains => Ok(expr.infix("@>", self.array_literal(values))),
            FilterOperator::ArrayContained => Ok(expr.infix("<@", self.array_literal(values))),
            FilterOperator::ArrayOverlaps => Ok(expr.infix("&&", self.array_literal(values))),
        }
    }

    /// Drop null/undefined, empty-string, and NUL-byte-bearing values
    ///, normalizing remaining time values.
    fn clean_values(&self, values: &[Value], data_type: DataType) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(values.len());
        for v in values {
            if is_dropped(v) {
                continue;
            }
            if data_type == DataType::Time {
                out.push(self.datetime.normalize_date(v, self.dialect)?);
            } else {
                out.push(v.clone());
            }
        }
        Ok(out)
    }

    fn equals(&self, expr: SqlExpr, values: Vec<Value>, negated: bool) -> Result<SqlExpr> {
        if values.is_empty() {
            // `equals` with zero remaining values evaluates to FALSE;
            // `notEquals` against nothing is vacuously TRUE.
            return Ok(SqlExpr::Literal(crate::sql::expr::Literal::Bool(negated)));
        }
        if values.len() == 1 {
            let param = SqlExpr::Param(values.into_iter().next().unwrap());
            return Ok(if negated {
                expr.eq(param).not()
            } else {
                expr.eq(param)
            });
        }
        self.list_op(expr, values, negated)
    }

    fn list_op(&self, expr: SqlExpr, values: Vec<Value>, negated: bool) -> Result<SqlExpr> {
        if values.is_empty() {
            return Ok(SqlExpr::Literal(crate::sql::expr::Literal::Bool(negated)));
        }
        Ok(SqlExpr::In {
            expr: Box::new(expr),
            list: values.into_iter().map(SqlExpr::Param).collect(),
            negated,
        })
    }

    fn comparison(&self, expr: SqlExpr, mut values: Vec<Value>, op: crate::sql::expr::BinaryOperator) -> Result<SqlExpr> {
        // All candidate values were dropped by `clean_values` - degrade to a no-op predicate rather than
        // abort the whole compilation over one bad value.
        let Some(value) = values.pop() else {
            return Ok(SqlExpr::Literal(crate::sql::expr::Literal::Bool(true)));
        };
        Ok(SqlExpr::BinaryOp {
            left: Box::new(expr),
            op,
            right: Box::new(SqlExpr::Param(value)),
        })
    }

    fn between(&self, expr: SqlExpr, mut values: Vec<Value>, negated: bool) -> Result<SqlExpr> {
        if values.len() < 2 {
            return Ok(SqlExpr::Literal(crate::sql::expr::Literal::Bool(true)));
        }
        let high = values.pop().unwrap();
        let low = values.pop().unwrap();
        Ok(SqlExpr::Between {
            expr: Box::new(expr),
            low: Box::new(SqlExpr::Param(low)),
            high: Box::new(SqlExpr::Param(high)),
            negated,
        })
    }

    fn is_empty(&self, expr: SqlExpr, negated: bool) -> SqlExpr {
        let null_check = SqlExpr::IsNull { expr: Box::new(expr.clone()), negated: false };
        let empty_check = expr.eq(SqlExpr::Param(Value::from("")));
        let combined = null_check.or(empty_check);
        if negated {
            combined.not()
        } else {
            combined
        }
    }

    fn string_op(
        &self,
        expr: SqlExpr,
        op: StringOp,
        values: Vec<Value>,
        pattern: impl Fn(String) -> String,
    ) -> Result<SqlExpr> {
        let Some(value) = values.into_iter().next().and_then(|v| v.as_str().map(|s| s.to_string())) else {
            return Ok(SqlExpr::Literal(crate::sql::expr::Literal::Bool(true)));
        };
        let literal = match op {
            StringOp::Contains | StringOp::NotContains | StringOp::StartsWith | StringOp::EndsWith => {
                pattern(value)
            }
            _ => value,
        };
        Ok(self.dialect.build_string_condition(expr, op, SqlExpr::Param(Value::from(literal))))
    }

    fn array_literal(&self, values: Vec<Value>) -> SqlExpr {
        SqlExpr::Param(Value::Array(values))
    }
}

fn is_dropped(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s.contains('\0'),
        _ => false,
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::PostgresDialect;
    use chrono::Utc;
    use serde_json::json;

    fn builder() -> (PostgresDialect, DateTimeBuilder) {
        (PostgresDialect, DateTimeBuilder::new(Utc::now()))
    }

    #[test]
    fn test_nul_byte_value_is_dropped() {
        let (dialect, dt) = builder();
        let fb = FilterBuilder::new(&dialect, &dt);
        let cond = FilterCondition::new(
            "Employees.name",
            FilterOperator::Equals,
            vec![json!("abc\u{0}; DROP TABLE employees;--")],
        );
        let sql = fb.build(SqlExpr::column("name"), DataType::String, &cond).unwrap();
        let mut b = crate::sql::expr::Binder::new(crate::sql::dialect::Dialect::Postgres);
        let text = sql.to_tokens(crate::sql::dialect::Dialect::Postgres, &mut b).serialize(crate::sql::dialect::Dialect::Postgres);
        assert!(!text.contains("DROP TABLE"));
        assert!(b.params().is_empty());
    }

    #[test]
    fn test_equals_empty_values_is_false() {
        let (dialect, dt) = builder();
        let fb = FilterBuilder::new(&dialect, &dt);
        let cond = FilterCondition::new("Employees.name", FilterOperator::Equals, vec![json!(null)]);
        let sql = fb.build(SqlExpr::column("name"), DataType::String, &cond).unwrap();
        assert_eq!(sql, SqlExpr::Literal(crate::sql::expr::Literal::Bool(false)));
    }

    #[test]
    fn test_date_range_on_non_time_field_errors() {
        let (dialect, dt) = builder();
        let fb = FilterBuilder::new(&dialect, &dt);
        let mut cond = FilterCondition::new("Employees.name", FilterOperator::InDateRange, vec![]);
        cond.date_range = Some(DateRangeInput::Relative("today".into()));
        let result = fb.build(SqlExpr::column("name"), DataType::String, &cond);
        assert!(matches!(result, Err(CompileError::InvalidDateRange { .. })));
    }
}
