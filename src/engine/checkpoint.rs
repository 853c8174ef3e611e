use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::engine::state::WorkflowState;

/// Snapshot of a run taken for one node.
#[derive(Debug, Clone)]
pub struct WorkflowCheckpoint {
    pub node_id: String,
    pub state: WorkflowState,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

/// In-memory checkpoints keyed by node id.
///
/// Has its own lock so checkpoint writes never wait on readers of the run
/// state.
#[derive(Default)]
pub struct CheckpointStore {
    checkpoints: RwLock<HashMap<String, WorkflowCheckpoint>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot for `node_id`, replacing any previous one.
    /// Returns the new retry count.
    pub async fn save(&self, node_id: &str, state: WorkflowState) -> u32 {
        let mut checkpoints = self.checkpoints.write().await;
        let retry_count = checkpoints
            .get(node_id)
            .map(|previous| previous.retry_count + 1)
            .unwrap_or(0);

        checkpoints.insert(
            node_id.to_string(),
            WorkflowCheckpoint {
                node_id: node_id.to_string(),
                state,
                timestamp: Utc::now(),
                retry_count,
            },
        );
        debug!(node = %node_id, retry_count, "Saved checkpoint");
        retry_count
    }

    pub async fn get(&self, node_id: &str) -> Option<WorkflowCheckpoint> {
        self.checkpoints.read().await.get(node_id).cloned()
    }

    pub async fn clear(&self, node_id: &str) {
        if self.checkpoints.write().await.remove(node_id).is_some() {
            debug!(node = %node_id, "Cleared checkpoint");
        }
    }

    pub async fn clear_all(&self) {
        self.checkpoints.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }

    /// Node ids that currently hold a checkpoint, sorted.
    pub async fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.checkpoints.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
