//! Workflow graph: one node per step, edges from strict declaration order
//! plus producer → consumer wiring inferred from module IO contracts.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::error::{GraphError, WorkflowError};
use crate::engine::params::Params;
use crate::engine::types::{NodeStatus, Step};
use crate::modules::{Metadata, ModuleRegistry};

/// Node id for a step. Derived from the step name so that checkpoints and
/// persisted state line up across runs of the same workflow.
pub fn node_id(step_name: &str) -> String {
    format!("node-{}", step_name)
}

/// Runtime representation of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub step: Step,
    pub status: NodeStatus,
    /// Parameters as last resolved for execution.
    #[serde(default)]
    pub inputs: Params,
    #[serde(default)]
    pub outputs: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowNode {
    pub fn new(step: Step) -> Self {
        Self {
            id: node_id(&step.name),
            step,
            status: NodeStatus::Pending,
            inputs: Params::new(),
            outputs: Default::default(),
            metadata: Metadata::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowGraph {
    nodes: HashMap<String, WorkflowNode>,
    edges: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for `steps`.
    ///
    /// `global_input` satisfies the `input` of the first step, so no
    /// producer is searched for it.
    pub fn build(
        steps: &[Step],
        global_input: Option<&str>,
        registry: &ModuleRegistry,
    ) -> Result<Self, WorkflowError> {
        let mut graph = Self::new();
        let mut contracts = Vec::with_capacity(steps.len());

        for step in steps {
            let module = registry
                .get(&step.module)
                .map_err(|_| WorkflowError::UnknownModule {
                    step: step.name.clone(),
                    module: step.module.clone(),
                })?;
            contracts.push(module.io());
            graph.add_node(WorkflowNode::new(step.clone()))?;
        }

        for i in 1..steps.len() {
            graph.add_edge(&node_id(&steps[i - 1].name), &node_id(&steps[i].name))?;
        }

        let has_global_input = global_input.is_some_and(|s| !s.is_empty());
        for (i, step) in steps.iter().enumerate() {
            for required in &contracts[i].required_inputs {
                if step.parameters.has_value(&required.name) {
                    continue;
                }
                if i == 0 && has_global_input && required.name == "input" {
                    continue;
                }

                for (j, earlier) in steps[..i].iter().enumerate() {
                    if contracts[j].produced_outputs.iter().any(|out| out.feeds(required)) {
                        debug!(
                            from = %earlier.name,
                            to = %step.name,
                            input = %required.name,
                            "Inferred dependency"
                        );
                        graph.add_edge(&node_id(&earlier.name), &node_id(&step.name))?;
                    }
                }
            }
        }

        Ok(graph)
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.order.push(node.id.clone());
        self.edges.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Add `from -> to`. Rejects unknown endpoints and edges closing a cycle;
    /// adding an existing edge is a no-op.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        for endpoint in [from, to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::UnknownNode {
                    from: from.to_string(),
                    to: to.to_string(),
                    missing: endpoint.to_string(),
                });
            }
        }

        if from == to || self.has_path(to, from) {
            return Err(GraphError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let targets = self.edges.entry(from.to_string()).or_default();
        if !targets.iter().any(|t| t == to) {
            targets.push(to.to_string());
        }
        Ok(())
    }

    /// Whether `to` is reachable from `from`.
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.edges.get(current) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct successors of `id`.
    pub fn successors(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.successors(from).iter().any(|t| t == to)
    }

    pub fn edges(&self) -> &HashMap<String, Vec<String>> {
        &self.edges
    }

    /// Node ids in declaration order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Declaration index of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|n| n == id)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_edge_unchecked(&mut self, from: &str, to: &str) {
        self.edges.entry(from.to_string()).or_default().push(to.to_string());
    }
}
