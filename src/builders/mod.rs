//! Expression Builders - the four pure builders shared by the CTE
//! Builder and the Query Executor.

pub mod datetime;
pub mod filter;
pub mod group_by;
pub mod measure;

pub use datetime::DateTimeBuilder;
pub use filter::FilterBuilder;
pub use group_by::{resolve_group_by_column, should_emit_group_by};
pub use measure::{categorize_for_post_aggregation, Categorized, MeasureBuilder, MeasureScope};
