use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::engine::state::StateSummary;
use crate::storage::{StateStore, candidate_file_names, state_file_name};

/// File-based JSON state store. Each run's summary is written into that
/// run's output directory.
#[derive(Debug, Default, Clone)]
pub struct JsonStateStore;

impl JsonStateStore {
    pub fn new() -> Self {
        Self
    }

    /// Path the summary of `workflow_name` is written to.
    pub fn state_path(output_dir: &Path, workflow_name: &str) -> PathBuf {
        output_dir.join(state_file_name(workflow_name))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn save(&self, output_dir: &Path, summary: &StateSummary) -> Result<()> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create output dir: {}", output_dir.display()))?;

        let path = Self::state_path(output_dir, &summary.name);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(summary)?;
        tokio::fs::write(&tmp_path, &data)
            .await
            .with_context(|| format!("Failed to write state file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(path = %path.display(), "Persisted run state");
        Ok(())
    }

    async fn load(&self, output_dir: &Path, workflow_name: &str) -> Result<Option<StateSummary>> {
        for name in candidate_file_names(workflow_name) {
            let path = output_dir.join(&name);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }

            let data = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            let summary: StateSummary = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

            debug!(path = %path.display(), "Loaded run state");
            return Ok(Some(summary));
        }
        Ok(None)
    }
}
