use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::graph::{WorkflowGraph, WorkflowNode, node_id};
use crate::engine::params::Params;
use crate::engine::types::{
    EventType, NodeStatus, Step, WorkflowEvent, WorkflowStatus,
};
use crate::modules::{Metadata, ModuleResult};

/// Live state of one workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    pub graph: WorkflowGraph,
    /// Global input bindings (e.g. the workflow-level `input`).
    pub inputs: HashMap<String, String>,
    /// Global output bindings (the run output directory).
    pub outputs: HashMap<String, String>,
    pub output_dir: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    pub current_node: Option<String>,
    pub history: Vec<WorkflowEvent>,
}

impl WorkflowState {
    pub fn new(name: &str, graph: WorkflowGraph, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let mut outputs = HashMap::new();
        outputs.insert("output".to_string(), output_dir.to_string_lossy().to_string());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            graph,
            inputs: HashMap::new(),
            outputs,
            output_dir,
            start_time: Utc::now(),
            end_time: None,
            status: WorkflowStatus::Pending,
            current_node: None,
            history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.graph.node(id)
    }

    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        self.graph.node(id).map(|n| n.status)
    }

    /// Add `node` if the state graph does not know it yet.
    pub fn ensure_node(&mut self, node: &WorkflowNode) {
        if !self.graph.contains(&node.id) {
            let mut fresh = WorkflowNode::new(node.step.clone());
            fresh.id = node.id.clone();
            // Ids are unique here, so insertion cannot fail
            let _ = self.graph.add_node(fresh);
        }
    }

    pub fn record(&mut self, event: WorkflowEvent) {
        self.history.push(event);
    }

    /// Mark a node running and record its `started` event.
    pub fn begin_node(&mut self, id: &str) {
        self.status = WorkflowStatus::Running;
        self.current_node = Some(id.to_string());
        let step_name = match self.graph.node_mut(id) {
            Some(node) => {
                node.status = NodeStatus::Running;
                node.error = None;
                node.step.name.clone()
            }
            None => id.to_string(),
        };
        self.record(WorkflowEvent::new(
            id,
            EventType::Started,
            format!("Step '{}' started", step_name),
        ));
    }

    pub fn set_node_inputs(&mut self, id: &str, inputs: Params) {
        if let Some(node) = self.graph.node_mut(id) {
            node.inputs = inputs;
        }
    }

    /// Record a successful module result.
    pub fn complete_node(&mut self, id: &str, result: ModuleResult) {
        let step_name = match self.graph.node_mut(id) {
            Some(node) => {
                node.status = NodeStatus::Complete;
                node.outputs = result.outputs;
                node.metadata = result.metadata;
                node.error = None;
                node.step.name.clone()
            }
            None => id.to_string(),
        };
        self.record(
            WorkflowEvent::new(
                id,
                EventType::Completed,
                format!("Step '{}' completed", step_name),
            )
            .with_data(result.statistics),
        );
    }

    /// Mark a node and the run failed. The `failed` event is recorded
    /// separately with [`WorkflowState::record_failure`].
    pub fn fail_node(&mut self, id: &str, error: &str) {
        if let Some(node) = self.graph.node_mut(id) {
            node.status = NodeStatus::Failed;
            node.error = Some(error.to_string());
        }
        self.status = WorkflowStatus::Failed;
        self.end_time = Some(Utc::now());
    }

    /// Mark a node skipped. Its error message is kept for reference.
    pub fn skip_node(&mut self, id: &str) {
        if let Some(node) = self.graph.node_mut(id) {
            node.status = NodeStatus::Skipped;
        }
    }

    pub fn record_failure(&mut self, id: &str, error: &str) {
        self.record(WorkflowEvent::new(id, EventType::Failed, error));
    }

    /// Mark the run complete.
    pub fn finish(&mut self) {
        self.status = WorkflowStatus::Complete;
        self.current_node = None;
        self.end_time = Some(Utc::now());
    }

    /// Adopt the node records of a checkpoint snapshot.
    ///
    /// Run identity, output bindings and history stay those of the live run,
    /// and nodes listed in `keep` (already finished in this run) keep their
    /// live records.
    pub fn restore_from(&mut self, snapshot: &WorkflowState, keep: &[String]) {
        let mut graph = snapshot.graph.clone();
        for id in keep {
            if let Some(live) = self.graph.node(id) {
                match graph.node_mut(id) {
                    Some(node) => *node = live.clone(),
                    None => {
                        let _ = graph.add_node(live.clone());
                    }
                }
            }
        }
        self.graph = graph;
        for (k, v) in &snapshot.inputs {
            self.inputs.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self.status = WorkflowStatus::Running;
        self.end_time = None;
    }

    /// Output paths of completed nodes declared before `id`, newest first.
    pub fn earlier_outputs(&self, id: &str) -> Vec<(&str, &BTreeMap<String, String>)> {
        let end = self.graph.position(id).unwrap_or(self.graph.len());
        self.graph.order()[..end]
            .iter()
            .rev()
            .filter_map(|nid| self.graph.node(nid))
            .filter(|n| n.status == NodeStatus::Complete)
            .map(|n| (n.id.as_str(), &n.outputs))
            .collect()
    }

    /// On-disk summary of this state.
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            current_node: self.current_node.clone(),
            inputs: self.inputs.clone(),
            nodes: self
                .graph
                .nodes()
                .map(|n| NodeSummary {
                    id: n.id.clone(),
                    step_name: n.step.name.clone(),
                    module: n.step.module.clone(),
                    status: n.status,
                    inputs: n.inputs.clone(),
                    outputs: n.outputs.clone(),
                    metadata: n.metadata.clone(),
                    error: n.error.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a state from its on-disk summary. The restored graph carries
    /// nodes only; ordering edges come from the graph of the resumed run.
    pub fn from_summary(summary: StateSummary, output_dir: &Path) -> Self {
        let mut graph = WorkflowGraph::new();
        for entry in summary.nodes {
            let mut node = WorkflowNode::new(Step::new(&entry.step_name, &entry.module));
            if !entry.id.is_empty() {
                node.id = entry.id;
            } else {
                node.id = node_id(&entry.step_name);
            }
            node.status = entry.status;
            node.inputs = entry.inputs;
            node.outputs = entry.outputs;
            node.metadata = entry.metadata;
            node.error = entry.error;
            // Duplicate entries in a hand-edited file keep the first one
            let _ = graph.add_node(node);
        }

        let mut state = Self::new(&summary.name, graph, output_dir);
        state.id = summary.id;
        state.inputs = summary.inputs;
        state.status = summary.status;
        state.start_time = summary.start_time;
        state.end_time = summary.end_time;
        state.current_node = summary.current_node;
        state
    }
}

/// Persisted form of a run, written to the run output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    #[serde(default)]
    pub id: String,
    pub step_name: String,
    pub module: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub inputs: Params,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_of(names: &[&str]) -> WorkflowState {
        let mut graph = WorkflowGraph::new();
        for name in names {
            graph.add_node(WorkflowNode::new(Step::new(name, "noop"))).unwrap();
        }
        WorkflowState::new("test", graph, "/runs/1")
    }

    #[test]
    fn test_lifecycle_events() {
        let mut state = state_of(&["a"]);
        state.begin_node("node-a");
        assert_eq!(state.node_status("node-a"), Some(NodeStatus::Running));
        assert_eq!(state.current_node.as_deref(), Some("node-a"));

        state.complete_node("node-a", ModuleResult::new().with_output("audio", "/runs/1/a.wav"));
        state.finish();

        let types: Vec<EventType> = state.history.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Started, EventType::Completed]);
        assert!(state.is_terminal());
        assert_eq!(state.node("node-a").unwrap().outputs["audio"], "/runs/1/a.wav");
    }

    #[test]
    fn test_failure_keeps_outputs_empty() {
        let mut state = state_of(&["a"]);
        state.begin_node("node-a");
        state.fail_node("node-a", "boom");
        assert_eq!(state.status, WorkflowStatus::Failed);
        let node = state.node("node-a").unwrap();
        assert!(node.outputs.is_empty());
        assert_eq!(node.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_skip_keeps_error() {
        let mut state = state_of(&["a"]);
        state.begin_node("node-a");
        state.fail_node("node-a", "boom");
        state.skip_node("node-a");
        let node = state.node("node-a").unwrap();
        assert_eq!(node.status, NodeStatus::Skipped);
        assert_eq!(node.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_earlier_outputs_newest_first() {
        let mut state = state_of(&["a", "b", "c"]);
        state.complete_node("node-a", ModuleResult::new().with_output("x", "a.wav"));
        state.complete_node("node-b", ModuleResult::new().with_output("x", "b.wav"));
        let earlier = state.earlier_outputs("node-c");
        let ids: Vec<&str> = earlier.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["node-b", "node-a"]);
    }

    #[test]
    fn test_restore_keeps_live_nodes_and_history() {
        let snapshot = state_of(&["a", "b"]);
        let mut live = snapshot.clone();
        live.begin_node("node-a");
        live.complete_node("node-a", ModuleResult::new().with_output("x", "a.wav"));
        let history_len = live.history.len();

        live.restore_from(&snapshot, &["node-a".to_string()]);
        assert_eq!(live.node_status("node-a"), Some(NodeStatus::Complete));
        assert_eq!(live.node_status("node-b"), Some(NodeStatus::Pending));
        assert_eq!(live.history.len(), history_len);
    }
}
