//! Crate-wide error type.
//!
//! Every variant here aborts compilation. Recoverable conditions
//! (`UnsupportedFeature` degrading to NULL, `InvalidInputValue` dropping a
//! value) never construct a [`CompileError`] - they're handled in place and
//! surfaced as [`crate::compile::Warning`]s instead.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("unknown member '{0}'")]
    UnknownMember(String),

    #[error("no join path connects cube '{from}' to cube '{to}'")]
    UnreachableCube { from: String, to: String },

    #[error("cycle in calculated measures: {0}")]
    CalculatedMeasureCycle(String),

    #[error("invalid calculated-measure template: {0}")]
    InvalidTemplate(String),

    #[error("calculated measure references unresolved member '{0}'")]
    UnresolvedMember(String),

    #[error("invalid date range on '{member}': {reason}")]
    InvalidDateRange { member: String, reason: String },

    #[error("order field '{0}' is not present in the selection")]
    InvalidOrderField(String),

    #[error("limit must be non-negative, got {0}")]
    InvalidLimit(i64),

    #[error("offset must be non-negative, got {0}")]
    InvalidOffset(i64),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// A non-aborting "Recovered" condition: a dialect capability gap or a
/// dropped input value. Surfaced alongside a successful [`crate::compile::CompileResult`]
/// rather than raised, and also logged via `tracing::warn!` at the call site.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Warning {
    pub cube: String,
    pub member: String,
    pub message: String,
}

impl Warning {
    pub fn new(cube: impl Into<String>, member: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            cube: cube.into(),
            member: member.into(),
            message: message.into(),
        }
    }
}
