use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::checkpoint::CheckpointStore;
use crate::engine::error::{GraphError, WorkflowError};
use crate::engine::graph::{WorkflowGraph, node_id};
use crate::engine::params::{ParamError, Params};
use crate::engine::resolve::{OUTPUT_PLACEHOLDER, resolve_params, substitute_output};
use crate::engine::scheduler::topological_order;
use crate::engine::state::WorkflowState;
use crate::engine::types::*;
use crate::modules::{ExecContext, Module, ModuleRegistry, ModuleResult};
use crate::storage::StateStore;

/// Default per-step deadline. Media encoding and model calls can be slow.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline applied to every module call.
    pub step_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// Result of a pre-flight check: what would run, in which order, and which
/// steps reject their parameters.
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Step names in execution order.
    pub order: Vec<String>,
    /// `(from, to)` step name pairs, in declaration order of `from`.
    pub dependencies: Vec<(String, String)>,
    pub problems: Vec<(String, ParamError)>,
}

/// The core workflow execution engine.
pub struct WorkflowEngine {
    registry: Arc<ModuleRegistry>,
    store: Arc<dyn StateStore>,
    checkpoints: CheckpointStore,
    state: RwLock<Option<WorkflowState>>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<ModuleRegistry>, store: Arc<dyn StateStore>) -> Self {
        Self {
            registry,
            store,
            checkpoints: CheckpointStore::new(),
            state: RwLock::new(None),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Snapshot of the current (or last) run.
    pub async fn state(&self) -> Option<WorkflowState> {
        self.state.read().await.clone()
    }

    /// Build the graph and order for `workflow` and validate step parameters
    /// without executing anything.
    pub fn plan(&self, workflow: &Workflow) -> Result<ExecutionPlan, WorkflowError> {
        workflow.validate()?;
        let graph = WorkflowGraph::build(&workflow.steps, workflow.input.as_deref(), &self.registry)?;
        let order = topological_order(&graph)?;

        let step_name = |id: &str| {
            graph
                .node(id)
                .map(|n| n.step.name.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let mut dependencies = Vec::new();
        for from in graph.order() {
            for to in graph.successors(from) {
                dependencies.push((step_name(from), step_name(to)));
            }
        }

        let mut problems = Vec::new();
        for step in &workflow.steps {
            let module = self.registry.get(&step.module)?;
            // Inputs and outputs are only known at run time
            let mut params = step.parameters.clone();
            if !params.has_value("input") {
                params.insert("input", "${input}");
            }
            params.insert("output", OUTPUT_PLACEHOLDER);
            if let Err(e) = module.validate(&params) {
                problems.push((step.name.clone(), e));
            }
        }

        Ok(ExecutionPlan {
            order: order.iter().map(|id| step_name(id)).collect(),
            dependencies,
            problems,
        })
    }

    /// Execute a workflow from its first step in a fresh output directory.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> Result<WorkflowState, WorkflowError> {
        workflow.validate()?;
        let graph = WorkflowGraph::build(&workflow.steps, workflow.input.as_deref(), &self.registry)?;
        let order = topological_order(&graph)?;

        let output_dir = run_output_dir(&workflow.output);
        let state = WorkflowState::new(&workflow.name, graph.clone(), output_dir);

        self.run(workflow, &graph, &order, state, cancel).await
    }

    /// Resume a workflow from `from_step` inside an existing output directory.
    ///
    /// When a persisted state is found, nodes it marks complete are not run
    /// again (the named step always is). Without one, the named step and
    /// everything after it run as a fresh suffix.
    pub async fn execute_retry(
        &self,
        workflow: &Workflow,
        from_step: &str,
        output_dir: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<WorkflowState, WorkflowError> {
        workflow.validate()?;
        let output_dir = output_dir.as_ref();
        let dir = output_dir.to_string_lossy().to_string();

        let start = workflow
            .step_index(from_step)
            .ok_or_else(|| WorkflowError::StepNotFound(from_step.to_string()))?;

        let mut resumed = workflow.clone();
        resumed.steps = resumed.steps.split_off(start);
        for step in &mut resumed.steps {
            substitute_output(&mut step.parameters, &dir);
        }

        let graph = WorkflowGraph::build(&resumed.steps, resumed.input.as_deref(), &self.registry)?;
        let order = topological_order(&graph)?;
        let target = node_id(from_step);

        let previous = self
            .store
            .load(output_dir, &workflow.name)
            .await
            .map_err(WorkflowError::Persistence)?;

        let state = match previous {
            Some(summary) => {
                info!(
                    run_id = %summary.id,
                    status = %summary.status,
                    from = %from_step,
                    "Resuming from persisted state"
                );
                let mut state = WorkflowState::from_summary(summary, output_dir);
                for node in graph.nodes() {
                    state.ensure_node(node);
                }

                let failed: Vec<String> = state
                    .graph
                    .nodes()
                    .filter(|n| n.status == NodeStatus::Failed)
                    .map(|n| n.id.clone())
                    .collect();
                // Failed steps before the resume point are skipped, not retried
                for id in failed.iter().filter(|id| !order.contains(id)) {
                    warn!(node = %id, from = %from_step, "Resuming past a failed step, marking it skipped");
                    state.skip_node(id);
                }
                for id in failed.iter().filter(|id| order.contains(id)) {
                    self.checkpoints.save(id, state.clone()).await;
                }

                if let Some(node) = state.graph.node_mut(&target) {
                    node.status = NodeStatus::Pending;
                    node.error = None;
                }
                state
            }
            None => {
                info!(from = %from_step, "No persisted state found, running remaining steps fresh");
                let state = WorkflowState::new(&workflow.name, graph.clone(), output_dir);
                for id in &order {
                    self.checkpoints.save(id, state.clone()).await;
                }
                state
            }
        };

        self.run(&resumed, &graph, &order, state, cancel).await
    }

    async fn run(
        &self,
        workflow: &Workflow,
        graph: &WorkflowGraph,
        order: &[String],
        mut initial: WorkflowState,
        cancel: CancellationToken,
    ) -> Result<WorkflowState, WorkflowError> {
        tokio::fs::create_dir_all(&initial.output_dir).await?;

        initial.status = WorkflowStatus::Running;
        initial.end_time = None;
        let run_id = initial.id.clone();
        let output_dir = initial.output_dir.clone();
        *self.state.write().await = Some(initial);

        info!(
            run_id = %run_id,
            workflow = %workflow.name,
            steps = order.len(),
            output_dir = %output_dir.display(),
            "Starting workflow execution"
        );

        // Nodes finished during this run survive checkpoint restores
        let mut finished: Vec<String> = Vec::new();

        for id in order {
            let node = graph.node(id).ok_or_else(|| GraphError::UnknownNode {
                from: id.clone(),
                to: id.clone(),
                missing: id.clone(),
            })?;
            let step = &node.step;
            let module = self
                .registry
                .get(&step.module)
                .map_err(|_| WorkflowError::UnknownModule {
                    step: step.name.clone(),
                    module: step.module.clone(),
                })?;
            let contract = module.io();
            let checkpoint = self.checkpoints.get(id).await;

            let params = {
                let mut guard = self.state.write().await;
                let state = guard.as_mut().ok_or(WorkflowError::NoActiveRun)?;

                if let Some(checkpoint) = &checkpoint {
                    info!(
                        step = %step.name,
                        retry_count = checkpoint.retry_count,
                        "Restoring state from checkpoint"
                    );
                    state.restore_from(&checkpoint.state, &finished);
                }
                state.ensure_node(node);

                if state.node_status(id) == Some(NodeStatus::Complete) {
                    info!(step = %step.name, "Step already complete, skipping");
                    continue;
                }

                state.begin_node(id);
                let mut params = resolve_params(
                    &step.parameters,
                    id,
                    &contract,
                    state,
                    workflow.input.as_deref(),
                );
                params.insert("output", output_dir.to_string_lossy().to_string());
                state.set_node_inputs(id, params.clone());
                params
            };

            info!(step = %step.name, module = %step.module, "Running step");

            let outcome = match module.validate(&params) {
                Ok(()) => {
                    self.invoke(module.as_ref(), step, &params, &run_id, &output_dir, &cancel)
                        .await
                }
                Err(source) => Err(WorkflowError::Validation {
                    step: step.name.clone(),
                    module: step.module.clone(),
                    source,
                }),
            };

            match outcome {
                Ok(result) => {
                    let produced = result.outputs.len();
                    {
                        let mut guard = self.state.write().await;
                        let state = guard.as_mut().ok_or(WorkflowError::NoActiveRun)?;
                        state.complete_node(id, result);
                    }
                    self.checkpoints.clear(id).await;
                    finished.push(id.clone());
                    info!(step = %step.name, outputs = produced, "Step completed");
                }
                Err(err) => {
                    let message = err.to_string();
                    error!(
                        step = %step.name,
                        module = %step.module,
                        error = %message,
                        "Step failed"
                    );
                    self.fail(id, &message, &output_dir).await?;
                    return Err(err);
                }
            }
        }

        let final_state = {
            let mut guard = self.state.write().await;
            let state = guard.as_mut().ok_or(WorkflowError::NoActiveRun)?;
            state.finish();
            state.clone()
        };

        self.store
            .save(&output_dir, &final_state.summary())
            .await
            .map_err(WorkflowError::Persistence)?;

        info!(run_id = %run_id, status = %final_state.status, "Workflow execution complete");
        Ok(final_state)
    }

    /// Record a node failure: mark it, checkpoint it, log the event and
    /// persist the summary.
    async fn fail(&self, id: &str, message: &str, output_dir: &Path) -> Result<(), WorkflowError> {
        let snapshot = {
            let mut guard = self.state.write().await;
            let state = guard.as_mut().ok_or(WorkflowError::NoActiveRun)?;
            state.fail_node(id, message);
            state.clone()
        };

        let retry_count = self.checkpoints.save(id, snapshot).await;

        let summary = {
            let mut guard = self.state.write().await;
            let state = guard.as_mut().ok_or(WorkflowError::NoActiveRun)?;
            state.record_failure(id, message);
            state.summary()
        };

        if let Err(e) = self.store.save(output_dir, &summary).await {
            warn!(error = %format!("{:#}", e), "Failed to persist run state");
        }

        info!(node = %id, retry_count, "Checkpoint saved, resume with retry");
        Ok(())
    }

    /// Call the module under the step deadline, racing cancellation.
    async fn invoke(
        &self,
        module: &dyn Module,
        step: &Step,
        params: &Params,
        run_id: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ModuleResult, WorkflowError> {
        let cancelled = || WorkflowError::Cancelled {
            step: step.name.clone(),
            module: step.module.clone(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let timeout = self.config.step_timeout;
        let now = Instant::now();
        let ctx = ExecContext {
            run_id: run_id.to_string(),
            step: step.name.clone(),
            output_dir: output_dir.to_path_buf(),
            deadline: now.checked_add(timeout).unwrap_or(now),
            cancel: cancel.child_token(),
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled()),
            outcome = tokio::time::timeout(timeout, module.execute(&ctx, params)) => match outcome {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(WorkflowError::StepFailed {
                    step: step.name.clone(),
                    module: step.module.clone(),
                    message: format!("{:#}", e),
                }),
                Err(_) => Err(WorkflowError::TimedOut {
                    step: step.name.clone(),
                    module: step.module.clone(),
                    timeout_s: timeout.as_secs(),
                }),
            },
        }
    }
}

/// Output directory of a fresh run: a timestamped directory under `root`.
///
/// A short random suffix keeps runs started within the same second apart.
pub fn run_output_dir(root: &str) -> PathBuf {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    Path::new(root).join(format!(
        "{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    ))
}
