//! SQL generation module.
//!
//! Everything the compiler emits passes through this module:
//!
//! - [`expr`] - the parameterized expression algebra and its `Binder`
//! - [`select`] - SELECT/CTE statement assembly
//! - [`token`] - dialect-agnostic token rendering
//! - [`dialect`] - per-engine `SqlDialect` adapters

pub mod dialect;
pub mod expr;
pub mod select;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{Binder, BinaryOperator, Literal, SortDir, SqlExpr, TemplatePart, UnaryOperator};
pub use select::{Cte, Join, JoinType, Select, SelectItem, TableRef};
pub use token::{Token, TokenStream};
