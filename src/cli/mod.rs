pub mod config;

pub use config::ReelflowConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::WorkflowEngine;
use crate::engine::error::WorkflowError;
use crate::engine::state::WorkflowState;
use crate::engine::types::{NodeStatus, Workflow};
use crate::modules::ModuleRegistry;
use crate::storage::json_store::JsonStateStore;

const DEFAULT_OUTPUT: &str = "./output";

#[derive(Parser)]
#[command(name = "reelflow", version, about = "Media processing workflow runner")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to the config file (default: auto-detect reelflow.yaml in cwd)
    #[arg(long, global = true, env = "REELFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow spec from its first step
    Run {
        /// Path to the workflow YAML spec
        spec: PathBuf,

        /// Override the workflow's global input
        #[arg(short, long)]
        input: Option<String>,

        /// Override the root output directory
        #[arg(short, long)]
        output: Option<String>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Resume a workflow from a named step inside an existing run directory
    Retry {
        /// Path to the workflow YAML spec
        spec: PathBuf,

        /// Step to resume from
        #[arg(long = "from")]
        from_step: String,

        /// Output directory of the run being resumed
        #[arg(long)]
        output_dir: PathBuf,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow spec without executing
    Validate {
        /// Path to the workflow YAML spec
        spec: PathBuf,
    },

    /// List available modules
    Modules,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let dotenv = load_dotenv(cli.dotenv.as_deref());
    let config = ReelflowConfig::load(cli.config.as_deref())?;
    init_tracing(config.log_level.as_deref());
    if let Some(path) = dotenv {
        info!("Loaded env from {}", path.display());
    }

    match cli.command {
        Commands::Run {
            spec,
            input,
            output,
            verbose,
        } => cmd_run(&config, spec, input, output, verbose).await,
        Commands::Retry {
            spec,
            from_step,
            output_dir,
            verbose,
        } => cmd_retry(&config, spec, from_step, output_dir, verbose).await,
        Commands::Validate { spec } => cmd_validate(spec),
        Commands::Modules => cmd_modules(),
    }
}

/// `RUST_LOG` wins over the configured level, which wins over `info`.
fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (warn if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
                None
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => Some(path),
            Err(dotenvy::Error::Io(_)) => None,
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
                None
            }
        },
    }
}

fn build_engine(config: &ReelflowConfig) -> Result<WorkflowEngine> {
    let registry = ModuleRegistry::with_builtins()?;
    Ok(
        WorkflowEngine::new(Arc::new(registry), Arc::new(JsonStateStore::new()))
            .with_config(config.engine_config()),
    )
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running step");
            token.cancel();
        }
    });
    cancel
}

fn load_workflow(spec: &Path) -> Result<Workflow> {
    Workflow::load(spec).with_context(|| format!("Failed to load workflow: {}", spec.display()))
}

async fn cmd_run(
    config: &ReelflowConfig,
    spec: PathBuf,
    input: Option<String>,
    output: Option<String>,
    verbose: bool,
) -> Result<()> {
    let mut workflow = load_workflow(&spec)?;

    if let Some(input) = input {
        workflow.input = Some(input);
    }
    match (output, &config.output_root) {
        (Some(output), _) => workflow.output = output,
        (None, Some(root)) if workflow.output == DEFAULT_OUTPUT => workflow.output = root.clone(),
        _ => {}
    }

    println!(
        "Workflow: {} ({} steps)",
        workflow.name,
        workflow.steps.len()
    );
    if verbose && !workflow.description.is_empty() {
        println!("{}", workflow.description);
    }

    let engine = build_engine(config)?;
    let result = engine.execute(&workflow, cancel_on_ctrl_c()).await;
    report(&engine, result, verbose).await
}

async fn cmd_retry(
    config: &ReelflowConfig,
    spec: PathBuf,
    from_step: String,
    output_dir: PathBuf,
    verbose: bool,
) -> Result<()> {
    let workflow = load_workflow(&spec)?;

    println!(
        "Workflow: {} (resuming from '{}' in {})",
        workflow.name,
        from_step,
        output_dir.display()
    );

    let engine = build_engine(config)?;
    let result = engine
        .execute_retry(&workflow, &from_step, &output_dir, cancel_on_ctrl_c())
        .await;
    report(&engine, result, verbose).await
}

/// Print the outcome of a run. On failure the last known state is printed
/// along with a hint for resuming.
async fn report(
    engine: &WorkflowEngine,
    result: Result<WorkflowState, WorkflowError>,
    verbose: bool,
) -> Result<()> {
    match result {
        Ok(state) => {
            print_state(&state, verbose);
            Ok(())
        }
        Err(err) => {
            if let Some(state) = engine.state().await {
                print_state(&state, verbose);
                if let Some(step) = err.step() {
                    println!(
                        "\nResume with: reelflow retry <spec> --from {} --output-dir {}",
                        step,
                        state.output_dir.display()
                    );
                }
            }
            Err(err.into())
        }
    }
}

fn print_state(state: &WorkflowState, verbose: bool) {
    println!("\nRun ID: {}", state.id);
    println!("Status: {}", state.status);
    println!("Output: {}", state.output_dir.display());

    println!("\nSteps:");
    for node in state.graph.nodes() {
        let status_icon = match node.status {
            NodeStatus::Complete => "✓",
            NodeStatus::Failed => "✗",
            NodeStatus::Skipped => "⊘",
            NodeStatus::Running => "⟳",
            NodeStatus::Pending => "○",
        };
        println!("  {} {} [{}]", status_icon, node.step.name, node.step.module);
        for (name, path) in &node.outputs {
            println!("    {}: {}", name, path);
        }
        if let Some(ref err) = node.error {
            println!("    Error: {}", err);
        }
        if verbose && !node.metadata.is_empty() {
            for (key, value) in &node.metadata {
                println!("    {} = {}", key, value);
            }
        }
    }

    if verbose && let Some(end) = state.end_time {
        let duration = end - state.start_time;
        println!("\nDuration: {}ms", duration.num_milliseconds());
    }
}

fn cmd_validate(spec: PathBuf) -> Result<()> {
    let workflow = load_workflow(&spec)?;
    let registry = ModuleRegistry::with_builtins()?;
    let engine = WorkflowEngine::new(Arc::new(registry), Arc::new(JsonStateStore::new()));

    println!("Workflow: {}", workflow.name);
    println!("Steps: {}", workflow.steps.len());

    let plan = match engine.plan(&workflow) {
        Ok(plan) => plan,
        Err(e) => {
            println!("Validation: FAILED");
            println!("  - {}", e);
            return Err(e.into());
        }
    };

    if plan.problems.is_empty() {
        println!("Validation: OK");
    } else {
        println!("Validation: FAILED");
        for (step, err) in &plan.problems {
            println!("  - Step '{}': {}", step, err);
        }
    }

    println!("\nExecution order:");
    for (index, name) in plan.order.iter().enumerate() {
        let deps: Vec<&str> = plan
            .dependencies
            .iter()
            .filter(|(_, to)| to == name)
            .map(|(from, _)| from.as_str())
            .collect();
        let deps = if deps.is_empty() {
            String::from("(no dependencies)")
        } else {
            format!("depends on: {}", deps.join(", "))
        };
        println!("  {}. {} {}", index + 1, name, deps);
    }

    if !plan.problems.is_empty() {
        anyhow::bail!("{} validation error(s) found", plan.problems.len());
    }
    Ok(())
}

fn cmd_modules() -> Result<()> {
    let registry = ModuleRegistry::with_builtins()?;
    let modules = registry.list();

    println!("{:<20} DESCRIPTION", "MODULE");
    println!("{}", "-".repeat(60));

    for module in &modules {
        println!("{:<20} {}", module.name(), module.description());
        let io = module.io();
        for input in &io.required_inputs {
            println!(
                "{:<20}   in:  {} ({}) {}",
                "",
                input.name,
                input.io_type,
                input.patterns.join(" ")
            );
        }
        for output in &io.produced_outputs {
            println!(
                "{:<20}   out: {} ({}) {}",
                "",
                output.name,
                output.io_type,
                output.patterns.join(" ")
            );
        }
    }

    println!("\nTotal: {} module(s)", modules.len());
    Ok(())
}
