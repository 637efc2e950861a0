//! The semantic model: cubes, dimensions, measures, joins, and the
//! registry that owns them.

pub mod cube;
pub mod dimension;
pub mod join;
pub mod measure;
pub mod registry;
pub mod types;

pub use cube::{Cube, CubeRelation, RelationResolver};
pub use dimension::{column_resolver, Dimension, ExprResolver};
pub use join::{CubeJoin, JoinKeyPair, Relationship, ThroughJoin};
pub use measure::{AggregateType, Measure, StatisticalConfig, StatisticalType, WindowConfig, WindowType};
pub use registry::CubeRegistry;
pub use types::{DataType, Granularity};
