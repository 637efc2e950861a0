//! Calculated Measure Resolver.
//!
//! Builds a dependency graph over calculated measures reachable from a
//! requested set and topologically sorts it so [`crate::builders::measure::MeasureBuilder`]
//! can build each one after every fragment it references already exists.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::error::{CompileError, Result};
use crate::model::{CubeRegistry, Measure};
use crate::template;

/// The build order for every calculated measure transitively reachable from
/// `requested` (qualified `Cube.member` names) - dependencies always precede
/// their dependents. Non-calculated members are walked (so their calculated
/// dependents are discovered) but never appear in the returned order; callers
/// resolve those directly.
pub fn resolve_order(registry: &CubeRegistry, requested: &[String]) -> Result<Vec<String>> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut nodes: HashMap<String, petgraph::graph::NodeIndex> = HashMap::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<String> = requested.to_vec();

    let mut node_of = |name: &str, graph: &mut DiGraph<String, ()>, nodes: &mut HashMap<String, petgraph::graph::NodeIndex>| {
        *nodes.entry(name.to_string()).or_insert_with(|| graph.add_node(name.to_string()))
    };

    while let Some(qualified) = stack.pop() {
        if !visited.insert(qualified.clone()) {
            continue;
        }
        let Ok((cube, member)) = registry.resolve_member(&qualified) else {
            continue;
        };
        let Some(measure) = cube.measures.get(member) else {
            continue;
        };
        node_of(&qualified, &mut graph, &mut nodes);
        let Measure::Calculated { calculated_sql } = measure else {
            continue;
        };
        let cube_name = cube.name.clone();
        for reference in template::extract_references(calculated_sql)? {
            let dep_qualified = if reference.contains('.') {
                reference
            } else {
                format!("{}.{}", cube_name, reference)
            };
            let dep_node = node_of(&dep_qualified, &mut graph, &mut nodes);
            let this_node = node_of(&qualified, &mut graph, &mut nodes);
            graph.add_edge(dep_node, this_node, ());
            stack.push(dep_qualified);
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| CompileError::CalculatedMeasureCycle(graph[cycle.node_id()].clone()))?;

    Ok(order
        .into_iter()
        .map(|idx| graph[idx].clone())
        .filter(|name| is_calculated(registry, name))
        .collect())
}

fn is_calculated(registry: &CubeRegistry, qualified: &str) -> bool {
    registry
        .resolve_member(qualified)
        .ok()
        .and_then(|(cube, member)| cube.measures.get(member))
        .map(Measure::is_calculated)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dimension::column_resolver;
    use crate::model::{Cube, CubeRegistry, Measure};

    fn registry_with_chain() -> CubeRegistry {
        let mut registry = CubeRegistry::new();
        let cube = Cube::new("Employees", std::sync::Arc::new(|_ctx| crate::model::CubeRelation {
            from: crate::sql::select::TableRef::new("employees", None),
            where_: None,
        }))
        .with_measure("count", Measure::aggregate(crate::model::AggregateType::Count, column_resolver("employees", "id")))
        .with_measure("activeCount", Measure::aggregate(crate::model::AggregateType::Count, column_resolver("employees", "id")))
        .with_measure(
            "activePercentage",
            Measure::Calculated {
                calculated_sql: "100.0 * {activeCount} / {count}".into(),
            },
        );
        registry.register(cube);
        registry
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let registry = registry_with_chain();
        let order = resolve_order(&registry, &["Employees.activePercentage".to_string()]).unwrap();
        assert_eq!(order, vec!["Employees.activePercentage".to_string()]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut registry = CubeRegistry::new();
        let cube = Cube::new("Employees", std::sync::Arc::new(|_ctx| crate::model::CubeRelation {
            from: crate::sql::select::TableRef::new("employees", None),
            where_: None,
        }))
        .with_measure("a", Measure::Calculated { calculated_sql: "{b}".into() })
        .with_measure("b", Measure::Calculated { calculated_sql: "{a}".into() });
        registry.register(cube);
        let result = resolve_order(&registry, &["Employees.a".to_string()]);
        assert!(matches!(result, Err(CompileError::CalculatedMeasureCycle(_))));
    }
}
