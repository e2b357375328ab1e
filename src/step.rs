//! Workflow steps
//!
//! A [`Step`] is a configured module placed in a workflow: its id, its
//! directories and the ports its module declared. The serializable part lives
//! in [`StepInfo`], shared by every task context of the step.
//!
//! Instance policy:
//!
//! | Module | Instance per task |
//! |--------|-------------------|
//! | `reuse_instance() == true` | one configured instance, shared |
//! | otherwise | fresh instance from the registry, configured again |

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::data::naming;
use crate::error::{Result, StepflowError};
use crate::format::DataFormatRegistry;
use crate::module::{
    check_runtime_version, ConfigurationContext, Module, ModuleRegistry, ParallelizationMode,
    Parameter, Version,
};
use crate::port::{InputPorts, OutputPorts};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Bootstrap step feeding the design files
    Design,
    /// Step producing data from no input (indexes, descriptions)
    Generator,
    #[default]
    Standard,
}

/// Serializable description of a configured step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    id: String,
    kind: StepKind,
    module: String,
    module_version: Version,
    #[serde(default)]
    parameters: Vec<Parameter>,
    working_dir: PathBuf,
    output_dir: PathBuf,
    task_dir: PathBuf,
    inputs: InputPorts,
    outputs: OutputPorts,
    create_log_files: bool,
    parallelization: ParallelizationMode,
    reuse_instance: bool,
}

impl StepInfo {
    /// Step `id` running `module`, every directory set to the current one
    pub fn new(id: &str, module: &str, inputs: InputPorts, outputs: OutputPorts) -> Result<Self> {
        validate_step_id(id)?;
        Ok(Self {
            id: id.to_string(),
            kind: StepKind::Standard,
            module: module.to_string(),
            module_version: Version::new(0, 0, 0),
            parameters: Vec::new(),
            working_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            task_dir: PathBuf::from("."),
            inputs,
            outputs,
            create_log_files: true,
            parallelization: ParallelizationMode::Standard,
            reuse_instance: false,
        })
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    /// Use `dir` as working, output and task directory
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.working_dir = dir.clone();
        self.output_dir = dir.clone();
        self.task_dir = dir;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_task_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task_dir = dir.into();
        self
    }

    pub fn with_create_log_files(mut self, create: bool) -> Self {
        self.create_log_files = create;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn module_version(&self) -> Version {
        self.module_version
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Private area where tasks write their files
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Shared area downstream steps read from
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where per-task log files go
    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    pub fn inputs(&self) -> &InputPorts {
        &self.inputs
    }

    pub fn outputs(&self) -> &OutputPorts {
        &self.outputs
    }

    /// Whether the step allows per-task log files
    pub fn create_log_files(&self) -> bool {
        self.create_log_files
    }

    pub fn parallelization_mode(&self) -> ParallelizationMode {
        self.parallelization
    }

    pub fn reuse_instance(&self) -> bool {
        self.reuse_instance
    }

    /// Whether output files must be linked from the working to the output area
    ///
    /// Directories are compared after resolving symlinks and relative parts.
    pub fn links_outputs(&self) -> bool {
        self.kind != StepKind::Design && !same_dir(&self.working_dir, &self.output_dir)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl fmt::Display for StepInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.module)
    }
}

enum ModuleInstance {
    Shared(Arc<dyn Module>),
    PerTask,
}

/// A configured step, able to hand out module instances to tasks
pub struct Step {
    info: Arc<StepInfo>,
    instance: ModuleInstance,
    registry: ModuleRegistry,
    settings: Arc<Settings>,
    formats: Arc<DataFormatRegistry>,
}

impl Step {
    pub fn builder(id: &str, module: &str) -> StepBuilder {
        StepBuilder {
            id: id.to_string(),
            module: module.to_string(),
            kind: StepKind::Standard,
            working_dir: None,
            output_dir: None,
            task_dir: None,
            parameters: Vec::new(),
            create_log_files: true,
        }
    }

    /// Re-attach a step described by `info`, e.g. after reading a context
    /// in another process
    pub fn from_info(
        info: Arc<StepInfo>,
        registry: &ModuleRegistry,
        settings: Arc<Settings>,
        formats: Arc<DataFormatRegistry>,
    ) -> Result<Self> {
        let module = configure_module(&info, registry, &settings, &formats)?;
        let instance = if module.reuse_instance() {
            ModuleInstance::Shared(Arc::from(module))
        } else {
            ModuleInstance::PerTask
        };
        Ok(Self {
            info,
            instance,
            registry: registry.clone(),
            settings,
            formats,
        })
    }

    pub fn info(&self) -> &Arc<StepInfo> {
        &self.info
    }

    pub fn id(&self) -> &str {
        self.info.id()
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn formats(&self) -> &Arc<DataFormatRegistry> {
        &self.formats
    }

    /// Module instance for one task
    pub fn module_for_task(&self) -> Result<Arc<dyn Module>> {
        match &self.instance {
            ModuleInstance::Shared(module) => Ok(Arc::clone(module)),
            ModuleInstance::PerTask => {
                let module =
                    configure_module(&self.info, &self.registry, &self.settings, &self.formats)?;
                Ok(Arc::from(module))
            }
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("info", &self.info)
            .field("shared", &matches!(self.instance, ModuleInstance::Shared(_)))
            .finish()
    }
}

/// Builder for [`Step`]
#[derive(Debug, Clone)]
pub struct StepBuilder {
    id: String,
    module: String,
    kind: StepKind,
    working_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    task_dir: Option<PathBuf>,
    parameters: Vec<Parameter>,
    create_log_files: bool,
}

impl StepBuilder {
    pub fn kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Defaults to the working directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Defaults to the working directory
    pub fn task_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task_dir = Some(dir.into());
        self
    }

    pub fn parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn create_log_files(mut self, create: bool) -> Self {
        self.create_log_files = create;
        self
    }

    /// Create and configure the module, then freeze the step
    #[instrument(skip_all, fields(step = %self.id, module = %self.module))]
    pub fn build(
        self,
        registry: &ModuleRegistry,
        settings: Arc<Settings>,
        formats: Arc<DataFormatRegistry>,
    ) -> Result<Step> {
        validate_step_id(&self.id)?;

        let working_dir = self.working_dir.unwrap_or_else(|| PathBuf::from("."));
        let mut info = StepInfo::new(&self.id, &self.module, InputPorts::empty(), OutputPorts::empty())?
            .with_kind(self.kind)
            .with_output_dir(self.output_dir.unwrap_or_else(|| working_dir.clone()))
            .with_task_dir(self.task_dir.unwrap_or_else(|| working_dir.clone()))
            .with_working_dir(working_dir);
        info.parameters = self.parameters;

        let module = configure_module(&info, registry, &settings, &formats)?;
        check_runtime_version(module.as_ref())?;

        info.module_version = module.version();
        info.inputs = module.input_ports().clone();
        info.outputs = module.output_ports().clone();
        info.create_log_files = self.create_log_files && module.create_log_files();
        info.parallelization = module.parallelization_mode();
        info.reuse_instance = module.reuse_instance();

        debug!(
            inputs = info.inputs.len(),
            outputs = info.outputs.len(),
            reuse = info.reuse_instance,
            "step configured"
        );

        let instance = if info.reuse_instance {
            ModuleInstance::Shared(Arc::from(module))
        } else {
            ModuleInstance::PerTask
        };

        Ok(Step {
            info: Arc::new(info),
            instance,
            registry: registry.clone(),
            settings,
            formats,
        })
    }
}

fn validate_step_id(id: &str) -> Result<()> {
    if naming::is_step_id_valid(id) {
        Ok(())
    } else {
        Err(StepflowError::InvalidStepId {
            id: id.to_string(),
            reason: "use lowercase letters and digits only".into(),
        })
    }
}

fn configure_module(
    info: &StepInfo,
    registry: &ModuleRegistry,
    settings: &Settings,
    formats: &DataFormatRegistry,
) -> Result<Box<dyn Module>> {
    let mut module = registry.create(info.module_name())?;
    let ctx = ConfigurationContext {
        step_id: info.id(),
        step_kind: info.kind(),
        working_dir: info.working_dir(),
        settings,
        formats,
    };
    module.configure(&ctx, info.parameters())?;
    Ok(module)
}
