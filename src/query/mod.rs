//! Query input, per-request context, and the compiler-internal plan.

pub mod context;
pub mod plan;
pub mod semantic_query;

pub use context::{QueryContext, SecurityContext};
pub use plan::{cte_alias, CteInfo, CteJoinKey, PlannedJoin, PropagatingFilter, QueryPlan};
pub use semantic_query::{
    DateRangeInput, FilterCondition, FilterNode, FilterOperator, OrderDirection, SemanticQuery,
    TimeDimensionRequest,
};
