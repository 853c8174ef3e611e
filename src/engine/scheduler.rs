use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::engine::error::GraphError;
use crate::engine::graph::WorkflowGraph;

/// Topological sort using Kahn's algorithm.
///
/// Among nodes that are ready at the same time the one declared first runs
/// first, so the order is reproducible. Fails instead of returning a partial
/// order when the graph contains a cycle.
pub fn topological_order(graph: &WorkflowGraph) -> Result<Vec<String>, GraphError> {
    let index: HashMap<&str, usize> = graph
        .order()
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    // Validate edge endpoints and build in-degrees
    let mut in_degree = vec![0usize; index.len()];
    for (from, targets) in graph.edges() {
        for to in targets {
            let Some(&to_idx) = index.get(to.as_str()) else {
                return Err(GraphError::UnknownNode {
                    from: from.clone(),
                    to: to.clone(),
                    missing: to.clone(),
                });
            };
            if !index.contains_key(from.as_str()) {
                return Err(GraphError::UnknownNode {
                    from: from.clone(),
                    to: to.clone(),
                    missing: from.clone(),
                });
            }
            in_degree[to_idx] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let ids = graph.order();
    let mut order = Vec::with_capacity(ids.len());

    while let Some(Reverse(i)) = ready.pop() {
        let id = &ids[i];
        order.push(id.clone());
        for next in graph.successors(id) {
            let j = index[next.as_str()];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() < ids.len() {
        let remaining = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, id)| id.clone())
            .collect();
        return Err(GraphError::Unschedulable(remaining));
    }

    Ok(order)
}
