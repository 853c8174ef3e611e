pub mod json_store;
pub mod null_store;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::state::StateSummary;

/// Trait for run-state persistence. A summary lives alongside the outputs of
/// the run it describes.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Write the summary for a run into its output directory.
    async fn save(&self, output_dir: &Path, summary: &StateSummary) -> Result<()>;

    /// Load the summary of `workflow_name` from `output_dir`, if one exists.
    async fn load(&self, output_dir: &Path, workflow_name: &str) -> Result<Option<StateSummary>>;
}

/// File name of the state summary for a workflow.
pub fn state_file_name(workflow_name: &str) -> String {
    format!("{}_state.json", sanitize(workflow_name))
}

/// File names tried, in order, when looking for an existing summary.
pub fn candidate_file_names(workflow_name: &str) -> Vec<String> {
    let mut names = vec![
        state_file_name(workflow_name),
        format!("{}_state.json", workflow_name),
        "workflow_state.json".to_string(),
    ];
    names.dedup();
    names
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "workflow".to_string()
    } else {
        cleaned
    }
}
