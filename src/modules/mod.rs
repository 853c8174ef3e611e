pub mod builtin;
pub mod contract;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

pub use contract::{
    ExecContext, IoContract, IoSpec, IoType, Metadata, ModuleResult, pattern_matches,
};

use crate::engine::error::RegistryError;
use crate::engine::params::{ParamError, Params};

/// Trait that every capability module implements.
#[async_trait]
pub trait Module: Send + Sync {
    /// Module identifier used in workflow specs (e.g., "extract-audio").
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Declared inputs and outputs, used to infer step wiring.
    fn io(&self) -> IoContract;

    /// Check parameters without touching the filesystem or network.
    fn validate(&self, params: &Params) -> Result<(), ParamError>;

    /// Run the module with fully resolved parameters.
    async fn execute(&self, ctx: &ExecContext, params: &Params) -> Result<ModuleResult>;
}

/// Registry of available modules.
///
/// Lookups share a read lock; registration takes the write lock.
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<dyn Module>>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with all built-in modules registered.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let registry = Self::new();
        builtin::register_all(&registry)?;
        Ok(registry)
    }

    /// Register a module. Names are unique and case-sensitive.
    pub fn register(&self, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        module
            .io()
            .check()
            .map_err(|reason| RegistryError::InvalidContract {
                module: name.clone(),
                reason,
            })?;

        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        modules.insert(name, module);
        Ok(())
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Module>, RegistryError> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered modules sorted by name.
    pub fn list(&self) -> Vec<Arc<dyn Module>> {
        let mut entries: Vec<Arc<dyn Module>> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }
}
