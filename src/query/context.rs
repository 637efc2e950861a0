//! Per-request query context.

use serde_json::Value;

/// Opaque, per-request security payload threaded into every `cube.sql(ctx)`
/// call. The compiler never inspects its contents - only a cube's own
/// relation resolver does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityContext(pub Value);

impl SecurityContext {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Immutable for the lifetime of one compilation.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub db: String,
    pub security_context: SecurityContext,
}

impl QueryContext {
    pub fn new(db: impl Into<String>, security_context: SecurityContext) -> Self {
        Self {
            db: db.into(),
            security_context,
        }
    }
}
