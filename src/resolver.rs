//! Expression Resolver.
//!
//! Evaluates a cube's `sql`/dimension/measure expressions - which may be
//! closures over a [`QueryContext`] - into immutable SQL fragments.
//!
//! Isolation is structural here: every [`ExprResolver`] returns a freshly
//! constructed, owned [`SqlExpr`] tree (never a reference into shared
//! state), so calling the same resolver twice - once for a CTE, once for
//! the outer query - can never let one call's fragment mutate the other's.
//! The one additional guarantee this module adds is operator-precedence
//! isolation: a multi-node fragment gets parenthesized before it's handed
//! to a caller that will splice it into a larger expression, so the
//! caller never needs to reason about the resolved fragment's internal
//! operator precedence.

use crate::model::dimension::ExprResolver;
use crate::model::{Cube, CubeRelation};
use crate::query::context::QueryContext;
use crate::sql::expr::SqlExpr;

/// Resolve a single expression closure, parenthesizing the result when it
/// isn't already an atomic term.
pub fn resolve(resolver: &ExprResolver, ctx: &QueryContext) -> SqlExpr {
    isolate(resolver(ctx))
}

/// Resolve a cube's row-level-secured base relation.
pub fn resolve_relation(cube: &Cube, ctx: &QueryContext) -> CubeRelation {
    (cube.sql)(ctx)
}

/// Resolve a named dimension on `cube`.
pub fn resolve_dimension(cube: &Cube, dimension_name: &str, ctx: &QueryContext) -> Option<SqlExpr> {
    cube.dimensions.get(dimension_name).map(|dim| resolve(&dim.sql, ctx))
}

fn isolate(expr: SqlExpr) -> SqlExpr {
    match expr {
        atomic @ (SqlExpr::Column { .. }
        | SqlExpr::Literal(_)
        | SqlExpr::Param(_)
        | SqlExpr::Star
        | SqlExpr::Raw(_)
        | SqlExpr::Paren(_)) => atomic,
        other => SqlExpr::Paren(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::query::context::SecurityContext;

    #[test]
    fn test_resolving_same_closure_twice_yields_independent_fragments() {
        let resolver = column_resolver("employees", "organisation_id");
        let ctx = QueryContext::new("db", SecurityContext::default());
        let first = resolve(&resolver, &ctx);
        let second = resolve(&resolver, &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn test_atomic_fragment_is_not_wrapped() {
        let resolver = column_resolver("employees", "id");
        let ctx = QueryContext::new("db", SecurityContext::default());
        let resolved = resolve(&resolver, &ctx);
        assert!(matches!(resolved, SqlExpr::Column { .. }));
    }
}
