//! Tests for workflow spec parsing and the core value types.

use reelflow::engine::error::WorkflowError;
use reelflow::engine::params::{ParamError, ParamValue};
use reelflow::engine::types::*;

const SPEC: &str = r#"
name: shorts
description: Extract audio and clean the transcript
input: ./video.mp4
output: ./runs
steps:
  - name: audio
    module: extract-audio
    parameters:
      outputFile: ${output}/audio.wav
      sampleRate: 16000
  - name: parts
    module: split
    params:
      segmentSeconds: 300
      copy: true
"#;

#[test]
fn parse_full_spec() {
    let wf = Workflow::from_yaml_str(SPEC).unwrap();

    assert_eq!(wf.name, "shorts");
    assert_eq!(wf.input.as_deref(), Some("./video.mp4"));
    assert_eq!(wf.output, "./runs");
    assert_eq!(wf.steps.len(), 2);
    assert_eq!(wf.steps[0].module, "extract-audio");
    assert_eq!(
        wf.steps[0].parameters.get_str("outputFile").unwrap(),
        Some("${output}/audio.wav")
    );
    assert_eq!(wf.steps[0].parameters.get_u64("sampleRate").unwrap(), Some(16000));
    // `params` is accepted as an alias
    assert_eq!(wf.steps[1].parameters.get_u64("segmentSeconds").unwrap(), Some(300));
    assert_eq!(wf.steps[1].parameters.get_bool("copy").unwrap(), Some(true));
    assert_eq!(wf.step_index("parts"), Some(1));
    assert_eq!(wf.step_index("nope"), None);
}

#[test]
fn output_defaults_and_input_is_optional() {
    let wf = Workflow::from_yaml_str(
        "name: minimal\nsteps:\n  - name: a\n    module: clean-text\n",
    )
    .unwrap();
    assert_eq!(wf.output, "./output");
    assert!(wf.input.is_none());
    assert!(wf.steps[0].parameters.is_empty());
}

#[test]
fn malformed_yaml_rejected() {
    let err = Workflow::from_yaml_str("name: [unterminated").unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse workflow YAML"));
}

#[test]
fn missing_steps_field_rejected() {
    assert!(Workflow::from_yaml_str("name: nothing\n").is_err());
}

#[test]
fn structural_errors_are_config_errors() {
    let cases = [
        ("name: ''\nsteps:\n  - name: a\n    module: m\n", "name is empty"),
        ("name: w\nsteps: []\n", "declares no steps"),
        ("name: w\nsteps:\n  - name: ''\n    module: m\n", "has no name"),
        ("name: w\nsteps:\n  - name: a\n    module: ''\n", "has no module"),
        (
            "name: w\nsteps:\n  - name: a\n    module: m\n  - name: a\n    module: m\n",
            "duplicate step name 'a'",
        ),
    ];

    for (yaml, expected) in cases {
        let wf: Workflow = serde_yml::from_str(yaml).unwrap();
        match wf.validate() {
            Err(WorkflowError::Config(msg)) => assert!(msg.contains(expected), "{msg}"),
            other => panic!("expected config error for {yaml:?}, got {other:?}"),
        }
    }
}

#[test]
fn workflow_load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shorts.yaml");
    std::fs::write(&path, SPEC).unwrap();

    let wf = Workflow::load(&path).unwrap();
    assert_eq!(wf.name, "shorts");

    let err = Workflow::load(dir.path().join("missing.yaml")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read workflow spec"));
}

#[test]
fn param_accessors_report_type_errors() {
    let wf = Workflow::from_yaml_str(SPEC).unwrap();
    let params = &wf.steps[0].parameters;

    assert!(matches!(
        params.get_bool("sampleRate"),
        Err(ParamError::WrongType { .. })
    ));
    assert_eq!(
        params.require_str("language"),
        Err(ParamError::Missing("language".to_string()))
    );
    assert_eq!(params.get_f64("sampleRate").unwrap(), Some(16000.0));
    assert!(matches!(params.get("sampleRate"), Some(ParamValue::Number(_))));
}

#[test]
fn statuses_serialize_lowercase() {
    assert_eq!(serde_json::to_string(&NodeStatus::Complete).unwrap(), "\"complete\"");
    assert_eq!(serde_json::to_string(&WorkflowStatus::Failed).unwrap(), "\"failed\"");
    assert_eq!(serde_json::to_string(&EventType::Started).unwrap(), "\"started\"");
    assert_eq!(NodeStatus::Skipped.to_string(), "skipped");
    assert!(WorkflowStatus::Complete.is_terminal());
    assert!(!WorkflowStatus::Running.is_terminal());
}

#[test]
fn events_get_unique_ids() {
    let a = WorkflowEvent::new("node-a", EventType::Started, "Step 'a' started");
    let b = WorkflowEvent::new("node-a", EventType::Started, "Step 'a' started");
    assert_ne!(a.id, b.id);
    assert_eq!(a.node_id, "node-a");
    assert!(a.data.is_empty());
}
