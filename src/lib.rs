//! Stepflow - task execution core for multi-step data-processing pipelines
//!
//! Modules declare typed ports, a task context binds concrete data to them,
//! and a task runner executes the module in isolation, seals a result and
//! hands one token per output port back to the scheduler.
//!
//! ```text
//! Step (configured Module) ──► TaskContext ──► TaskRunner::run()
//!                                                 │
//!                                      TaskResult ┴ Token × outputs ──► TokenSink
//! ```

pub mod context;
pub mod data;
pub mod error;
pub mod format;
pub mod module;
pub mod port;
pub mod settings;
pub mod step;
pub mod task;

pub use context::{ContextId, OutputData, TaskContext};
pub use data::{Data, DataFile, DataMetadata, FileNaming};
pub use error::{ErrorClass, FixSuggestion, Result, StepflowError};
pub use format::{CompressionType, DataFormat, DataFormatRegistry};
pub use module::{
    ConfigurationContext, Design, DesignModule, Module, ModuleRegistry, ParallelizationMode,
    Parameter, Requirement, Sample, Version,
};
pub use port::{InputPort, InputPorts, OutputPort, OutputPorts, PortName, PortSetBuilder};
pub use settings::Settings;
pub use step::{Step, StepInfo, StepKind};
pub use task::{
    CollectingSink, FailureKind, NoopSink, TaskFailure, TaskLogger, TaskResult, TaskRunner,
    TaskStatus, Token, TokenSink,
};
