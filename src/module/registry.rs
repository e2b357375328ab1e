//! ModuleRegistry - module factories by name (lock-free via DashMap)

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::design::{Design, DesignModule, DESIGN_MODULE_NAME};
use super::Module;
use crate::error::{Result, StepflowError};

/// Creates a fresh, unconfigured module instance
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Registry of module factories
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: Arc<DashMap<String, ModuleFactory>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `name`
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        debug!(module = name, "registering module");
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Register the design module for a parsed design
    pub fn register_design(&self, design: Arc<Design>) {
        self.register(DESIGN_MODULE_NAME, move || {
            Box::new(DesignModule::new(Arc::clone(&design)))
        });
    }

    /// New unconfigured instance of module `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn Module>> {
        // Clone the factory out so the shard lock is not held while it runs
        let factory = self
            .factories
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| StepflowError::UnknownModule {
                name: name.to_string(),
            })?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}
