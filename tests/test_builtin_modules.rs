//! End-to-end runs of the built-in modules through the engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use reelflow::engine::WorkflowEngine;
use reelflow::engine::error::WorkflowError;
use reelflow::engine::types::*;
use reelflow::modules::ModuleRegistry;
use reelflow::storage::json_store::JsonStateStore;

fn engine() -> WorkflowEngine {
    let registry = ModuleRegistry::with_builtins().unwrap();
    WorkflowEngine::new(Arc::new(registry), Arc::new(JsonStateStore::new()))
}

const TRANSCRIPT: &str = "[Music]\nWelcome   back to the   Channel\n\n\n\n[laughs] Today we cut SHORTS\n";

#[tokio::test]
async fn clean_text_writes_cleaned_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("talk.txt");
    std::fs::write(&source, TRANSCRIPT).unwrap();

    let wf = Workflow {
        name: "transcript".to_string(),
        description: String::new(),
        input: Some(source.to_string_lossy().to_string()),
        output: dir.path().join("runs").to_string_lossy().to_string(),
        steps: vec![Step::new("clean", "clean-text")],
    };

    let state = engine().execute(&wf, CancellationToken::new()).await.unwrap();

    let expected = state.output_dir.join("talk.clean.txt");
    let node = state.node("node-clean").unwrap();
    assert_eq!(node.status, NodeStatus::Complete);
    assert_eq!(
        node.outputs.get("text").map(String::as_str),
        expected.to_str()
    );
    assert_eq!(
        std::fs::read_to_string(&expected).unwrap(),
        "Welcome back to the Channel\n\nToday we cut SHORTS\n"
    );

    let completed = state
        .history
        .iter()
        .find(|e| e.event_type == EventType::Completed)
        .unwrap();
    assert_eq!(completed.data["lines_in"], 6);
    assert_eq!(completed.data["lines_out"], 3);
}

#[tokio::test]
async fn chained_clean_text_steps_are_wired() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("talk.txt");
    std::fs::write(&source, TRANSCRIPT).unwrap();

    let wf = Workflow::from_yaml_str(&format!(
        r#"
name: chained
input: {}
output: {}
steps:
  - name: strip
    module: clean-text
  - name: lower
    module: clean-text
    parameters:
      lowercase: true
      outputFile: ${{output}}/final.txt
"#,
        source.display(),
        dir.path().join("runs").display()
    ))
    .unwrap();

    let state = engine().execute(&wf, CancellationToken::new()).await.unwrap();

    let first = state.output_dir.join("talk.clean.txt");
    let lower = state.node("node-lower").unwrap();
    assert_eq!(lower.inputs.get_str("input").unwrap(), first.to_str());
    assert_eq!(
        std::fs::read_to_string(state.output_dir.join("final.txt")).unwrap(),
        "welcome back to the channel\n\ntoday we cut shorts\n"
    );
}

#[tokio::test]
async fn missing_transcript_fails_with_step_context() {
    let dir = tempfile::tempdir().unwrap();
    let wf = Workflow {
        name: "missing".to_string(),
        description: String::new(),
        input: Some(dir.path().join("absent.txt").to_string_lossy().to_string()),
        output: dir.path().to_string_lossy().to_string(),
        steps: vec![Step::new("clean", "clean-text")],
    };

    let err = engine()
        .execute(&wf, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        WorkflowError::StepFailed { step, module, message } => {
            assert_eq!(step, "clean");
            assert_eq!(module, "clean-text");
            assert!(message.contains("Failed to read transcript"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn extract_audio_failure_is_reported() {
    // Fails whether or not ffmpeg is installed: the input does not exist
    let dir = tempfile::tempdir().unwrap();
    let wf = Workflow {
        name: "audio".to_string(),
        description: String::new(),
        input: Some(dir.path().join("absent.mp4").to_string_lossy().to_string()),
        output: dir.path().to_string_lossy().to_string(),
        steps: vec![Step::new("audio", "extract-audio")],
    };

    let engine = engine();
    let err = engine
        .execute(&wf, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::StepFailed { ref module, .. } if module == "extract-audio"
    ));
    assert_eq!(
        engine.checkpoints().node_ids().await,
        vec!["node-audio".to_string()]
    );
}
