//! Filter Cache.
//!
//! A content-addressed store keyed by a deterministic serialization of a
//! [`FilterCondition`] - member, operator, and canonicalized values/date
//! range. On a hit, [`FilterCache::get_or_build`] returns the fragment
//! already built for an identical condition seen earlier in this
//! compilation (e.g. the same filter appearing once in a CTE's `WHERE` and
//! again as a propagating-filter subquery predicate) instead of invoking
//! the builder a second time.
//!
//! This cache guarantees fragment *shape* reuse; it does not by itself
//! guarantee that bound values appear once in the final parameter list -
//! that's [`crate::sql::expr::Binder`]'s job, since two conditions can bind
//! an identical value without being identical conditions. `And`/`Or` nodes
//! are never cached here - only leaf [`FilterCondition`]s are.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::query::semantic_query::{DateRangeInput, FilterCondition, FilterOperator};
use crate::sql::expr::SqlExpr;

#[derive(Debug, Default)]
pub struct FilterCache {
    store: HashMap<String, SqlExpr>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached fragment for `condition` if one exists, otherwise
    /// invoke `build` and cache its result under `condition`'s key.
    pub fn get_or_build(&mut self, condition: &FilterCondition, build: impl FnOnce() -> SqlExpr) -> SqlExpr {
        let key = Self::key_for(condition);
        if let Some(cached) = self.store.get(&key) {
            return cached.clone();
        }
        let built = build();
        self.store.insert(key, built.clone());
        built
    }

    /// Deterministic digest over a condition's member, operator, and
    /// canonicalized values/date range. Two conditions that are
    /// semantically identical always hash to the same key regardless of
    /// the order their `Value`s arrived in the request payload, since
    /// `serde_json::Value`'s own `Serialize` impl already sorts object
    /// keys; we additionally fold each value into the digest independently
    /// rather than joining them as text, so no value can smuggle a
    /// delimiter and collide with a differently-shaped condition.
    fn key_for(condition: &FilterCondition) -> String {
        let mut hasher = Sha256::new();
        hasher.update(condition.member.as_bytes());
        hasher.update([0u8]);
        hasher.update(operator_tag(condition.operator).as_bytes());
        hasher.update([0u8]);
        for value in &condition.values {
            let bytes = serde_json::to_vec(value).unwrap_or_default();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        hasher.update([0u8]);
        match &condition.date_range {
            Some(DateRangeInput::Relative(phrase)) => {
                hasher.update(b"relative:");
                hasher.update(phrase.as_bytes());
            }
            Some(DateRangeInput::Absolute(start, end)) => {
                hasher.update(b"absolute:");
                hasher.update(start.as_bytes());
                hasher.update([0u8]);
                hasher.update(end.as_bytes());
            }
            Some(DateRangeInput::Single(date)) => {
                hasher.update(b"single:");
                hasher.update(date.as_bytes());
            }
            None => {
                hasher.update(b"none");
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

fn operator_tag(op: FilterOperator) -> &'static str {
    match op {
        FilterOperator::Equals => "equals",
        FilterOperator::NotEquals => "notEquals",
        FilterOperator::Contains => "contains",
        FilterOperator::NotContains => "notContains",
        FilterOperator::StartsWith => "startsWith",
        FilterOperator::EndsWith => "endsWith",
        FilterOperator::Like => "like",
        FilterOperator::NotLike => "notLike",
        FilterOperator::ILike => "iLike",
        FilterOperator::Regex => "regex",
        FilterOperator::NotRegex => "notRegex",
        FilterOperator::Gt => "gt",
        FilterOperator::Gte => "gte",
        FilterOperator::Lt => "lt",
        FilterOperator::Lte => "lte",
        FilterOperator::Set => "set",
        FilterOperator::NotSet => "notSet",
        FilterOperator::InDateRange => "inDateRange",
        FilterOperator::BeforeDate => "beforeDate",
        FilterOperator::AfterDate => "afterDate",
        FilterOperator::Between => "between",
        FilterOperator::NotBetween => "notBetween",
        FilterOperator::In => "in",
        FilterOperator::NotIn => "notIn",
        FilterOperator::IsEmpty => "isEmpty",
        FilterOperator::IsNotEmpty => "isNotEmpty",
        FilterOperator::ArrayContains => "arrayContains",
        FilterOperator::ArrayContained => "arrayContained",
        FilterOperator::ArrayOverlaps => "arrayOverlaps",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition() -> FilterCondition {
        FilterCondition::new("Employees.status", FilterOperator::Equals, vec![json!("active")])
    }

    #[test]
    fn test_identical_conditions_share_one_build() {
        let mut cache = FilterCache::new();
        let mut calls = 0;
        let first = cache.get_or_build(&condition(), || {
            calls += 1;
            SqlExpr::raw("marker")
        });
        let second = cache.get_or_build(&condition(), || {
            calls += 1;
            SqlExpr::raw("marker")
        });
        assert_eq!(calls, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_values_produce_different_keys() {
        let mut cache = FilterCache::new();
        let a = FilterCondition::new("Employees.status", FilterOperator::Equals, vec![json!("active")]);
        let b = FilterCondition::new("Employees.status", FilterOperator::Equals, vec![json!("inactive")]);
        assert_ne!(FilterCache::key_for(&a), FilterCache::key_for(&b));
        let built_a = cache.get_or_build(&a, || SqlExpr::raw("a"));
        let built_b = cache.get_or_build(&b, || SqlExpr::raw("b"));
        assert_ne!(built_a, built_b);
    }

    #[test]
    fn test_different_operator_same_values_do_not_collide() {
        let a = FilterCondition::new("Employees.status", FilterOperator::Equals, vec![json!("active")]);
        let b = FilterCondition::new("Employees.status", FilterOperator::NotEquals, vec![json!("active")]);
        assert_ne!(FilterCache::key_for(&a), FilterCache::key_for(&b));
    }
}
