use tracing::debug;

use crate::engine::params::{ParamValue, Params};
use crate::engine::state::WorkflowState;
use crate::modules::{IoContract, pattern_matches};

/// Token replaced with the run output directory in string parameters.
pub const OUTPUT_PLACEHOLDER: &str = "${output}";

/// Replace the output placeholder in every string parameter, once.
pub fn substitute_output(params: &mut Params, output_dir: &str) {
    for (_, value) in params.iter_mut() {
        value.map_strings(&|s: &str| {
            s.contains(OUTPUT_PLACEHOLDER)
                .then(|| s.replace(OUTPUT_PLACEHOLDER, output_dir))
        });
    }
}

/// Whether a parameter key names a filesystem path.
pub fn is_path_key(key: &str) -> bool {
    key == "input"
        || key == "output"
        || ["Path", "File", "Dir", "_path", "_file", "_dir"]
            .iter()
            .any(|suffix| key.len() > suffix.len() && key.ends_with(suffix))
}

/// Prefix a bare relative path with `./`.
pub fn normalize_path(value: &str) -> Option<String> {
    if value.is_empty()
        || value.starts_with('/')
        || value.starts_with("./")
        || value.starts_with("../")
        || value.starts_with('~')
        || value.contains("://")
        || value.contains(OUTPUT_PLACEHOLDER)
        || is_windows_absolute(value)
    {
        return None;
    }
    Some(format!("./{}", value))
}

fn is_windows_absolute(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Prefix relative values of path-like top-level keys.
pub fn normalize_path_params(params: &mut Params) {
    for (key, value) in params.iter_mut() {
        if !is_path_key(key) {
            continue;
        }
        if let ParamValue::String(s) = value
            && let Some(prefixed) = normalize_path(s)
        {
            *s = prefixed;
        }
    }
}

/// First output of an earlier completed node matching one of `patterns`.
///
/// Nodes are scanned newest first; within a node outputs are taken in name
/// order.
pub fn find_upstream_output(
    state: &WorkflowState,
    node_id: &str,
    patterns: &[String],
) -> Option<String> {
    if patterns.is_empty() {
        return None;
    }
    state
        .earlier_outputs(node_id)
        .into_iter()
        .flat_map(|(_, outputs)| outputs.values())
        .find(|path| patterns.iter().any(|p| pattern_matches(p, path)))
        .cloned()
}

/// Resolve the parameters a node will be executed with.
///
/// The first node of the run gets the workflow-level input; later nodes
/// without an explicit `input` are wired to the newest matching upstream
/// output. Global inputs applied here are recorded into `state`.
pub fn resolve_params(
    step_params: &Params,
    node_id: &str,
    contract: &IoContract,
    state: &mut WorkflowState,
    global_input: Option<&str>,
) -> Params {
    let output_dir = state.output_dir.to_string_lossy().to_string();
    let mut params = step_params.clone();
    substitute_output(&mut params, &output_dir);

    let is_first = state.graph.position(node_id).is_none_or(|pos| pos == 0);
    if is_first {
        if let Some(input) = global_input.filter(|s| !s.is_empty()) {
            params.insert("input", input);
            state.inputs.insert("input".to_string(), input.to_string());
        }
    } else if !params.has_value("input") {
        let patterns = contract.input_patterns("input");
        if let Some(path) = find_upstream_output(state, node_id, patterns) {
            debug!(node = %node_id, input = %path, "Wired input from upstream output");
            params.insert("input", path);
        }
    }

    normalize_path_params(&mut params);
    params
}
