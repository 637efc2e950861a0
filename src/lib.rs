//! # semsql
//!
//! A semantic query compiler: accepts a declarative query expressed
//! against a user-defined semantic model (cubes with measures, dimensions,
//! joins, and row-level security) and compiles it into a single
//! parameterized SQL statement for one of several relational engines.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        SemanticQuery + CubeRegistry + QueryContext       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compile - validates members]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Query Planner - join graph, pre-aggregation CTE        │
//! │        decisions, filter propagation                     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [cte_builder, then executor]
//! ┌─────────────────────────────────────────────────────────┐
//! │       Expression Builders via Dialect Adapter            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          Select (sql::select) -> (sql, params)           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The compiler is a pure function of its inputs: no I/O, no
//! suspension, safe to run concurrently across independent compilations
//! against a shared, read-only [`model::CubeRegistry`].

pub mod builders;
pub mod calc_measure;
pub mod compile;
pub mod cte_builder;
pub mod error;
pub mod executor;
pub mod filter_cache;
pub mod model;
pub mod planner;
pub mod query;
pub mod resolver;
pub mod sql;
pub mod template;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::builders::{DateTimeBuilder, FilterBuilder};
    pub use crate::compile::{compile, explain, Annotation, CompileOutput};
    pub use crate::error::{CompileError, Result, Warning};
    pub use crate::model::{
        AggregateType, Cube, CubeJoin, CubeRegistry, CubeRelation, DataType, Dimension, Granularity,
        Measure, Relationship, StatisticalType, WindowType,
    };
    pub use crate::query::{
        FilterCondition, FilterNode, FilterOperator, OrderDirection, QueryContext, SecurityContext,
        SemanticQuery, TimeDimensionRequest,
    };
    pub use crate::sql::{Dialect, SqlDialect};
}

// Also exported at crate root for convenience.
pub use compile::{compile, explain, CompileOutput};
pub use error::{CompileError, Result};
pub use model::CubeRegistry;
pub use query::{QueryContext, SemanticQuery};
pub use sql::Dialect;
