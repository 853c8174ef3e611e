//! Scriptable modules shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reelflow::engine::params::{ParamError, Params};
use reelflow::engine::types::{Step, Workflow};
use reelflow::modules::{
    ExecContext, IoContract, IoSpec, IoType, Module, ModuleRegistry, ModuleResult,
};

/// Step names in the order modules were executed.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct MockModule {
    name: String,
    contract: IoContract,
    /// (output name, file name written under the run output dir)
    produces: Vec<(String, String)>,
    required_params: Vec<String>,
    fail: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Params>>,
    journal: Option<Journal>,
}

impl MockModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            contract: IoContract::default(),
            produces: Vec::new(),
            required_params: Vec::new(),
            fail: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    pub fn requires(mut self, input: &str, io_type: IoType, patterns: &[&str]) -> Self {
        self.contract
            .required_inputs
            .push(IoSpec::new(input, "", io_type, patterns));
        self
    }

    pub fn produces(mut self, output: &str, io_type: IoType, patterns: &[&str], file: &str) -> Self {
        self.contract
            .produced_outputs
            .push(IoSpec::new(output, "", io_type, patterns));
        self.produces.push((output.to_string(), file.to_string()));
        self
    }

    pub fn requires_param(mut self, key: &str) -> Self {
        self.required_params.push(key.to_string());
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Parameters of the last call.
    pub fn last_params(&self) -> Option<Params> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Module for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test module"
    }

    fn io(&self) -> IoContract {
        self.contract.clone()
    }

    fn validate(&self, params: &Params) -> Result<(), ParamError> {
        for key in &self.required_params {
            params.require_str(key)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext, params: &Params) -> anyhow::Result<ModuleResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(params.clone());
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(ctx.step.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("{} exploded", self.name);
        }

        let mut result = ModuleResult::new().with_statistic("calls", self.calls() as u64);
        for (output, file) in &self.produces {
            let path = ctx.output_dir.join(file);
            tokio::fs::write(&path, b"data").await?;
            result = result.with_output(output, path.to_string_lossy().to_string());
        }
        Ok(result)
    }
}

/// Register `modules` in a fresh registry.
pub fn registry(modules: &[Arc<MockModule>]) -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::new();
    for module in modules {
        registry.register(module.clone()).unwrap();
    }
    Arc::new(registry)
}

/// Workflow whose steps are named after their modules.
pub fn workflow(name: &str, input: Option<&str>, output: &Path, modules: &[&str]) -> Workflow {
    Workflow {
        name: name.to_string(),
        description: String::new(),
        input: input.map(str::to_string),
        output: output.to_string_lossy().to_string(),
        steps: modules.iter().map(|m| Step::new(m, m)).collect(),
    }
}
