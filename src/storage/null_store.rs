use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::state::StateSummary;
use crate::storage::{StateStore, state_file_name};

/// In-memory state store. Holds summaries only for the lifetime of the
/// store instance; nothing touches the filesystem.
#[derive(Default)]
pub struct NullStateStore {
    summaries: Mutex<HashMap<PathBuf, StateSummary>>,
}

impl NullStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(output_dir: &Path, workflow_name: &str) -> PathBuf {
        output_dir.join(state_file_name(workflow_name))
    }

    /// Number of summaries held.
    pub fn len(&self) -> usize {
        self.summaries.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for NullStateStore {
    async fn save(&self, output_dir: &Path, summary: &StateSummary) -> Result<()> {
        self.summaries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?
            .insert(Self::key(output_dir, &summary.name), summary.clone());
        Ok(())
    }

    async fn load(&self, output_dir: &Path, workflow_name: &str) -> Result<Option<StateSummary>> {
        let summaries = self
            .summaries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        Ok(summaries.get(&Self::key(output_dir, workflow_name)).cloned())
    }
}
