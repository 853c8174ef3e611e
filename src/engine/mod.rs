pub mod checkpoint;
pub mod error;
pub mod executor;
pub mod graph;
pub mod params;
pub mod resolve;
pub mod scheduler;
pub mod state;
pub mod types;

pub use executor::{EngineConfig, ExecutionPlan, WorkflowEngine};
