//! The compiler's inbound query shape.

use serde_json::Value;

use crate::model::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// The exhaustive filter operator universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Like,
    NotLike,
    ILike,
    Regex,
    NotRegex,
    Gt,
    Gte,
    Lt,
    Lte,
    Set,
    NotSet,
    InDateRange,
    BeforeDate,
    AfterDate,
    Between,
    NotBetween,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
    ArrayContains,
    ArrayContained,
    ArrayOverlaps,
}

impl FilterOperator {
    /// Array operators are PostgreSQL-only.
    pub fn is_array_operator(&self) -> bool {
        matches!(
            self,
            FilterOperator::ArrayContains | FilterOperator::ArrayContained | FilterOperator::ArrayOverlaps
        )
    }
}

/// A relative phrase, an absolute two-bound range, or a single date-only
/// string.
#[derive(Debug, Clone)]
pub enum DateRangeInput {
    Relative(String),
    Absolute(String, String),
    Single(String),
}

#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub member: String,
    pub operator: FilterOperator,
    pub values: Vec<Value>,
    /// Only valid alongside `operator == InDateRange` on a time field.
    pub date_range: Option<DateRangeInput>,
}

impl FilterCondition {
    pub fn new(member: impl Into<String>, operator: FilterOperator, values: Vec<Value>) -> Self {
        Self {
            member: member.into(),
            operator,
            values,
            date_range: None,
        }
    }
}

/// A filter tree node. `And`/`Or` nodes are never cached by the Filter
/// Cache - only leaf conditions are.
#[derive(Debug, Clone)]
pub enum FilterNode {
    Condition(FilterCondition),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

#[derive(Debug, Clone)]
pub struct TimeDimensionRequest {
    pub dimension: String,
    pub granularity: Option<Granularity>,
    pub date_range: Option<DateRangeInput>,
}

#[derive(Debug, Clone, Default)]
pub struct SemanticQuery {
    pub measures: Vec<String>,
    pub dimensions: Vec<String>,
    pub time_dimensions: Vec<TimeDimensionRequest>,
    pub filters: Vec<FilterNode>,
    /// Explicit ordering, preserving declaration order.
    pub order: Vec<(String, OrderDirection)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SemanticQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every member this query references, across measures, dimensions,
    /// time dimensions, filters, and order - used by the public surface to validate
    /// against the registry before planning.
    pub fn all_members(&self) -> Vec<&str> {
        let mut members: Vec<&str> = Vec::new();
        members.extend(self.measures.iter().map(String::as_str));
        members.extend(self.dimensions.iter().map(String::as_str));
        members.extend(self.time_dimensions.iter().map(|t| t.dimension.as_str()));
        members.extend(self.order.iter().map(|(field, _)| field.as_str()));
        fn walk<'a>(node: &'a FilterNode, out: &mut Vec<&'a str>) {
            match node {
                FilterNode::Condition(c) => out.push(&c.member),
                FilterNode::And(children) | FilterNode::Or(children) => {
                    for child in children {
                        walk(child, out);
                    }
                }
            }
        }
        for node in &self.filters {
            walk(node, &mut members);
        }
        members
    }
}
