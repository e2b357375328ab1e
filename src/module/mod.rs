//! Module contract
//!
//! A [`Module`] is one pluggable unit of pipeline work. Its lifecycle:
//!
//! ```text
//! Unconfigured --configure()--> Configured --execute(ctx)--> ... (once per context)
//! ```
//!
//! Ports are only meaningful once configured. `execute` reports its outcome
//! by sealing the [`TaskStatus`]; returning an error (or panicking) is
//! captured by the runner as a failed result.

mod design;
mod parameter;
mod registry;
mod requirement;

pub use design::{Design, DesignModule, Sample, DESIGN_MODULE_NAME};
pub use parameter::Parameter;
pub use registry::{ModuleFactory, ModuleRegistry};
pub use requirement::{Requirement, RequirementKind, Version};

use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::context::TaskContext;
use crate::error::{Result, StepflowError};
use crate::format::DataFormatRegistry;
use crate::port::{InputPorts, OutputPorts};
use crate::settings::Settings;
use crate::step::StepKind;
use crate::task::{TaskLogger, TaskStatus};

static NO_INPUTS: Lazy<InputPorts> = Lazy::new(InputPorts::empty);
static NO_OUTPUTS: Lazy<OutputPorts> = Lazy::new(OutputPorts::empty);

/// How a scheduler may run tasks of a module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelizationMode {
    /// Tasks may run concurrently, one core each
    #[default]
    Standard,
    /// The module parallelizes internally; run its tasks one at a time
    OwnParallelization,
    /// Lightweight tasks, no dedicated resources needed
    NotNeeded,
}

impl ParallelizationMode {
    /// Whether several tasks of the module may run at the same time
    pub fn allows_concurrent_tasks(self) -> bool {
        !matches!(self, ParallelizationMode::OwnParallelization)
    }
}

/// What a module sees while being configured
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationContext<'a> {
    pub step_id: &'a str,
    pub step_kind: StepKind,
    pub working_dir: &'a Path,
    pub settings: &'a Settings,
    pub formats: &'a DataFormatRegistry,
}

/// A unit of pipeline work
///
/// Modules that return `true` from [`Module::reuse_instance`] are configured
/// once and shared by every task of the step, so `execute` must keep all
/// per-task state in the context and status it is given.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn version(&self) -> Version;

    /// Oldest engine version able to run this module
    fn required_runtime_version(&self) -> Version {
        Version::new(0, 1, 0)
    }

    fn requirements(&self) -> Vec<Requirement> {
        Vec::new()
    }

    /// Declared input ports (empty until configured)
    fn input_ports(&self) -> &InputPorts {
        &NO_INPUTS
    }

    /// Declared output ports (empty until configured)
    fn output_ports(&self) -> &OutputPorts {
        &NO_OUTPUTS
    }

    /// Validate parameters and declare ports. Called once per instance.
    fn configure(&mut self, ctx: &ConfigurationContext<'_>, params: &[Parameter]) -> Result<()>;

    /// Run one task and seal its result on `status`
    fn execute(
        &self,
        context: &TaskContext,
        status: &mut TaskStatus,
        log: &TaskLogger,
    ) -> anyhow::Result<()>;

    fn parallelization_mode(&self) -> ParallelizationMode {
        ParallelizationMode::Standard
    }

    /// Share one configured instance across all tasks of a step
    fn reuse_instance(&self) -> bool {
        false
    }

    /// Whether tasks of this module get their own log file
    fn create_log_files(&self) -> bool {
        true
    }
}

/// Fail when the module needs a newer engine
pub fn check_runtime_version(module: &dyn Module) -> Result<()> {
    let required = module.required_runtime_version();
    let current = Version::runtime();
    if required > current {
        return Err(StepflowError::IncompatibleRuntime {
            module: module.name().to_string(),
            required: required.to_string(),
            current: current.to_string(),
        });
    }
    Ok(())
}

/// Mandatory requirements missing on this host
pub fn missing_requirements(module: &dyn Module) -> Vec<Requirement> {
    module
        .requirements()
        .into_iter()
        .filter(|r| !r.is_optional() && !r.is_available())
        .collect()
}
