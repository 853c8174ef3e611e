//! Tests for StateStore implementations: JsonStateStore and NullStateStore.

use std::collections::BTreeMap;

use reelflow::engine::graph::{WorkflowGraph, WorkflowNode};
use reelflow::engine::params::Params;
use reelflow::engine::state::{StateSummary, WorkflowState};
use reelflow::engine::types::*;
use reelflow::modules::ModuleResult;
use reelflow::storage::StateStore;
use reelflow::storage::json_store::JsonStateStore;
use reelflow::storage::null_store::NullStateStore;

fn sample_state(name: &str, dir: &std::path::Path) -> WorkflowState {
    let mut graph = WorkflowGraph::new();
    for (step, module) in [("audio", "extract-audio"), ("parts", "split"), ("text", "clean-text")] {
        graph
            .add_node(WorkflowNode::new(Step::new(step, module)))
            .unwrap();
    }
    let mut state = WorkflowState::new(name, graph, dir);

    state.begin_node("node-audio");
    let mut inputs = Params::new();
    inputs.insert("input", "./clip.mp4");
    state.set_node_inputs("node-audio", inputs);
    state.complete_node(
        "node-audio",
        ModuleResult::new()
            .with_output("audio", "/runs/1/audio.wav")
            .with_metadata("codec", "pcm_s16le")
            .with_statistic("bytes", 1024u64),
    );

    state.begin_node("node-parts");
    state.fail_node("node-parts", "ffmpeg exited with code 1");
    state.record_failure("node-parts", "ffmpeg exited with code 1");
    state
}

fn assert_equivalent(a: &StateSummary, b: &StateSummary) {
    assert_eq!(a.id, b.id);
    assert_eq!(a.status, b.status);
    assert_eq!(a.nodes.len(), b.nodes.len());
    for (x, y) in a.nodes.iter().zip(&b.nodes) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.status, y.status);
        assert_eq!(x.outputs, y.outputs);
        assert_eq!(x.metadata, y.metadata);
        assert_eq!(x.error, y.error);
    }
}

// ===== JsonStateStore =====

#[tokio::test]
async fn json_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new();
    let summary = sample_state("Shorts", dir.path()).summary();

    store.save(dir.path(), &summary).await.unwrap();
    let loaded = store.load(dir.path(), "Shorts").await.unwrap().unwrap();

    assert_equivalent(&summary, &loaded);
    assert_eq!(loaded, summary);
    assert_eq!(loaded.status, WorkflowStatus::Failed);
    assert_eq!(loaded.nodes[0].status, NodeStatus::Complete);
    assert_eq!(loaded.nodes[1].status, NodeStatus::Failed);
    assert_eq!(loaded.nodes[2].status, NodeStatus::Pending);
}

#[tokio::test]
async fn json_store_writes_sanitized_file_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new();
    let summary = sample_state("Shorts Pipeline", dir.path()).summary();

    store.save(dir.path(), &summary).await.unwrap();

    let path = JsonStateStore::state_path(dir.path(), "Shorts Pipeline");
    assert_eq!(path, dir.path().join("shorts_pipeline_state.json"));
    assert!(path.exists());
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["shorts_pipeline_state.json"]);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["status"], "failed");
    assert_eq!(raw["nodes"][0]["step_name"], "audio");
    assert_eq!(raw["nodes"][0]["outputs"]["audio"], "/runs/1/audio.wav");
}

#[tokio::test]
async fn json_store_load_falls_back_to_legacy_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new();
    let summary = sample_state("Shorts", dir.path()).summary();
    let json = serde_json::to_string(&summary).unwrap();

    std::fs::write(dir.path().join("workflow_state.json"), &json).unwrap();
    let loaded = store.load(dir.path(), "Shorts").await.unwrap().unwrap();
    assert_equivalent(&summary, &loaded);

    std::fs::write(dir.path().join("Shorts_state.json"), &json.replace("failed", "complete")).unwrap();
    let loaded = store.load(dir.path(), "Shorts").await.unwrap().unwrap();
    assert_eq!(loaded.status, WorkflowStatus::Complete);
}

#[tokio::test]
async fn json_store_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStateStore::new();
    assert!(store.load(dir.path(), "nothing").await.unwrap().is_none());
}

#[tokio::test]
async fn json_store_corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken_state.json"), "{ not json").unwrap();

    let err = JsonStateStore::new()
        .load(dir.path(), "broken")
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse state file"));
}

#[tokio::test]
async fn json_store_creates_missing_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("runs").join("20260101_000000");
    let summary = sample_state("nested", &nested).summary();

    JsonStateStore::new().save(&nested, &summary).await.unwrap();
    assert!(nested.join("nested_state.json").exists());
}

// ===== Summary round trip into a live state =====

#[tokio::test]
async fn summary_restores_into_equivalent_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = sample_state("restore", dir.path());

    let restored = WorkflowState::from_summary(state.summary(), dir.path());

    assert_eq!(restored.id, state.id);
    assert_eq!(restored.status, state.status);
    assert_eq!(restored.output_dir, dir.path());
    assert_eq!(restored.graph.order(), state.graph.order());
    let audio = restored.node("node-audio").unwrap();
    assert_eq!(
        audio.outputs,
        BTreeMap::from([("audio".to_string(), "/runs/1/audio.wav".to_string())])
    );
    assert_eq!(audio.inputs.get_str("input").unwrap(), Some("./clip.mp4"));
    assert_eq!(audio.metadata["codec"], "pcm_s16le");
    assert_eq!(
        restored.node("node-parts").unwrap().error.as_deref(),
        Some("ffmpeg exited with code 1")
    );
}

// ===== NullStateStore =====

#[tokio::test]
async fn null_store_round_trip() {
    let store = NullStateStore::new();
    assert!(store.is_empty());
    let dir = std::path::Path::new("/virtual/run");
    let summary = sample_state("mem", dir).summary();

    store.save(dir, &summary).await.unwrap();
    assert_eq!(store.len(), 1);

    let loaded = store.load(dir, "mem").await.unwrap().unwrap();
    assert_eq!(loaded, summary);
    assert!(store.load(dir, "other").await.unwrap().is_none());
    assert!(store.load(std::path::Path::new("/elsewhere"), "mem").await.unwrap().is_none());
}

#[tokio::test]
async fn null_store_overwrites_per_run() {
    let store = NullStateStore::new();
    let dir = std::path::Path::new("/virtual/run");
    let mut state = sample_state("mem", dir);

    store.save(dir, &state.summary()).await.unwrap();
    state.finish();
    store.save(dir, &state.summary()).await.unwrap();

    assert_eq!(store.len(), 1);
    let loaded = store.load(dir, "mem").await.unwrap().unwrap();
    assert_eq!(loaded.status, WorkflowStatus::Complete);
}
