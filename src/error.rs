//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - SF-010-029: Configuration errors (parameters, ports, formats, names)
//! - SF-030-039: Programming errors (broken engine/caller invariants)
//! - SF-040-049: Persistence errors (context/result streams)
//! - SF-050-059: Settings errors
//!
//! Per-task runtime failures are never returned through this type: they are
//! captured as data in a [`TaskResult`](crate::task::TaskResult).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StepflowError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Broad error classes, matching how callers are expected to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Raised while configuring modules or building ports. Fix the workflow.
    Configuration,
    /// A caller or engine invariant is broken. Abort.
    Programming,
    /// A persisted context or result could not be read or written.
    Persistence,
    /// Settings could not be loaded.
    Settings,
}

#[derive(Error, Debug)]
pub enum StepflowError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (010-029)
    // ═══════════════════════════════════════════
    #[error("[SF-010] Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("[SF-011] Invalid port name '{name}': {reason}")]
    InvalidPortName { name: String, reason: String },

    #[error("[SF-012] Duplicate port '{name}' in the same port set")]
    DuplicatePort { name: String },

    #[error("[SF-013] Step '{step_id}' has no {direction} port with format '{format}'")]
    PortFormatNotFound {
        step_id: String,
        direction: &'static str,
        format: String,
    },

    #[error("[SF-014] Step '{step_id}' has more than one {direction} port with format '{format}': {candidates}")]
    AmbiguousPortFormat {
        step_id: String,
        direction: &'static str,
        format: String,
        candidates: String,
    },

    #[error("[SF-015] Unknown data format '{name}'")]
    UnknownFormat { name: String },

    #[error("[SF-016] Unknown module '{name}'")]
    UnknownModule { name: String },

    #[error("[SF-017] Invalid step id '{id}': {reason}")]
    InvalidStepId { id: String, reason: String },

    #[error("[SF-018] Invalid data name '{name}': {reason}")]
    InvalidDataName { name: String, reason: String },

    #[error("[SF-019] Invalid file name '{filename}': {reason}")]
    InvalidFileName { filename: String, reason: String },

    #[error("[SF-020] Data '{data}' of format '{format}' cannot hold more than {max} file(s)")]
    TooManyFiles {
        data: String,
        format: String,
        max: usize,
    },

    #[error("[SF-021] Data '{data}' is not a list")]
    NotAList { data: String },

    #[error("[SF-022] Data list '{list}' already contains an element named '{name}'")]
    DuplicateDataName { list: String, name: String },

    #[error("[SF-023] Invalid version '{version}'")]
    InvalidVersion { version: String },

    #[error("[SF-024] Module '{module}' requires runtime {required}, current is {current}")]
    IncompatibleRuntime {
        module: String,
        required: String,
        current: String,
    },

    #[error("[SF-025] Data format '{name}' is already registered")]
    DuplicateFormat { name: String },

    #[error("[SF-026] Data '{data}' is a list and holds no files itself")]
    ListHoldsNoFiles { data: String },

    // ═══════════════════════════════════════════
    // PROGRAMMING ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[SF-030] Task context #{context_id} has already been run")]
    ContextAlreadyRun { context_id: u64 },

    #[error("[SF-031] Tokens of task context #{context_id} have already been sent")]
    TokensAlreadySent { context_id: u64 },

    #[error("[SF-032] Unknown {direction} port '{port}' for step '{step_id}'")]
    UnknownPort {
        step_id: String,
        direction: &'static str,
        port: String,
    },

    #[error("[SF-033] Result of task context #{context_id} has already been sealed")]
    ResultAlreadySealed { context_id: u64 },

    #[error("[SF-034] Task context #{context_id} has no result yet")]
    ResultNotAvailable { context_id: u64 },

    #[error("[SF-035] Result of context #{result_context_id} cannot be used for context #{context_id}")]
    ResultContextMismatch {
        context_id: u64,
        result_context_id: u64,
    },

    #[error("[SF-036] Step '{step_id}': {direction} port '{port}' has no bound data")]
    MissingBinding {
        step_id: String,
        direction: &'static str,
        port: String,
    },

    #[error("[SF-037] Output port '{port}' of step '{step_id}' is already open in this task")]
    OutputInUse { step_id: String, port: String },

    // ═══════════════════════════════════════════
    // PERSISTENCE ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[SF-040] Incompatible stream version: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: String },

    #[error("[SF-041] Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("[SF-042] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[SF-043] Context id {id} is out of range")]
    InvalidContextId { id: u64 },

    // ═══════════════════════════════════════════
    // SETTINGS ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[SF-050] Failed to parse settings: {0}")]
    SettingsParse(#[from] serde_yaml::Error),

    #[error("[SF-051] Invalid log level '{level}'")]
    InvalidLogLevel { level: String },
}

impl StepflowError {
    /// Class of this error
    pub fn class(&self) -> ErrorClass {
        use StepflowError::*;
        match self {
            InvalidParameter { .. }
            | InvalidPortName { .. }
            | DuplicatePort { .. }
            | PortFormatNotFound { .. }
            | AmbiguousPortFormat { .. }
            | UnknownFormat { .. }
            | UnknownModule { .. }
            | InvalidStepId { .. }
            | InvalidDataName { .. }
            | InvalidFileName { .. }
            | TooManyFiles { .. }
            | NotAList { .. }
            | DuplicateDataName { .. }
            | InvalidVersion { .. }
            | IncompatibleRuntime { .. }
            | DuplicateFormat { .. }
            | ListHoldsNoFiles { .. } => ErrorClass::Configuration,
            ContextAlreadyRun { .. }
            | TokensAlreadySent { .. }
            | UnknownPort { .. }
            | ResultAlreadySealed { .. }
            | ResultNotAvailable { .. }
            | ResultContextMismatch { .. }
            | MissingBinding { .. }
            | OutputInUse { .. } => ErrorClass::Programming,
            VersionMismatch { .. } | Serialization(_) | Io(_) | InvalidContextId { .. } => {
                ErrorClass::Persistence
            }
            SettingsParse(_) | InvalidLogLevel { .. } => ErrorClass::Settings,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }

    pub fn is_programming(&self) -> bool {
        self.class() == ErrorClass::Programming
    }

    /// Error code like `SF-030`
    pub fn code(&self) -> &'static str {
        use StepflowError::*;
        match self {
            InvalidParameter { .. } => "SF-010",
            InvalidPortName { .. } => "SF-011",
            DuplicatePort { .. } => "SF-012",
            PortFormatNotFound { .. } => "SF-013",
            AmbiguousPortFormat { .. } => "SF-014",
            UnknownFormat { .. } => "SF-015",
            UnknownModule { .. } => "SF-016",
            InvalidStepId { .. } => "SF-017",
            InvalidDataName { .. } => "SF-018",
            InvalidFileName { .. } => "SF-019",
            TooManyFiles { .. } => "SF-020",
            NotAList { .. } => "SF-021",
            DuplicateDataName { .. } => "SF-022",
            InvalidVersion { .. } => "SF-023",
            IncompatibleRuntime { .. } => "SF-024",
            DuplicateFormat { .. } => "SF-025",
            ListHoldsNoFiles { .. } => "SF-026",
            ContextAlreadyRun { .. } => "SF-030",
            TokensAlreadySent { .. } => "SF-031",
            UnknownPort { .. } => "SF-032",
            ResultAlreadySealed { .. } => "SF-033",
            ResultNotAvailable { .. } => "SF-034",
            ResultContextMismatch { .. } => "SF-035",
            MissingBinding { .. } => "SF-036",
            OutputInUse { .. } => "SF-037",
            VersionMismatch { .. } => "SF-040",
            Serialization(_) => "SF-041",
            Io(_) => "SF-042",
            InvalidContextId { .. } => "SF-043",
            SettingsParse(_) => "SF-050",
            InvalidLogLevel { .. } => "SF-051",
        }
    }
}

impl FixSuggestion for StepflowError {
    fn fix_suggestion(&self) -> Option<&str> {
        use StepflowError::*;
        match self {
            InvalidParameter { .. } => Some("Check the parameter name and value in the step definition"),
            InvalidPortName { .. } => Some("Port names use lowercase letters and digits only"),
            DuplicatePort { .. } => Some("Give each port of a set a unique name"),
            PortFormatNotFound { .. } => Some("Look the port up by name, or declare a port with this format"),
            AmbiguousPortFormat { .. } => Some("Several ports share this format: look the port up by name"),
            UnknownFormat { .. } => Some("Register the format before declaring ports"),
            UnknownModule { .. } => Some("Register the module factory before building the step"),
            InvalidStepId { .. } => Some("Step ids use lowercase letters and digits only"),
            InvalidDataName { .. } => Some("Data names use letters and digits only (see to_valid_name)"),
            InvalidFileName { .. } => {
                Some("Expected <step>_<port>_<prefix>_<data>[_fileN][_partN].<ext>")
            }
            TooManyFiles { .. } => Some("Use a multi-file format or fewer files"),
            NotAList { .. } => Some("Declare the port as a list port"),
            DuplicateDataName { .. } => Some("Use unique names for list elements"),
            InvalidVersion { .. } => Some("Use MAJOR.MINOR.PATCH"),
            IncompatibleRuntime { .. } => Some("Upgrade the runtime or use an older module"),
            DuplicateFormat { .. } => Some("Register each format once, before declaring ports"),
            ListHoldsNoFiles { .. } => Some("Add files to the list elements instead"),
            ContextAlreadyRun { .. } => Some("Create a new task context for each run"),
            TokensAlreadySent { .. } => Some("Tokens are sent by run(); do not send them again"),
            UnknownPort { .. } => Some("Use a port declared by the module"),
            ResultAlreadySealed { .. } => Some("Create exactly one result per task"),
            ResultNotAvailable { .. } => Some("Run the task before reading its result"),
            ResultContextMismatch { .. } => Some("Pair each result with the context that produced it"),
            MissingBinding { .. } => Some("Bind data to every declared port when creating the context"),
            OutputInUse { .. } => Some("Drop the first handle before opening the port again"),
            VersionMismatch { .. } => Some("Re-create the stream with the same engine version"),
            Serialization(_) => Some("Check the stream is a complete stepflow JSON document"),
            Io(_) => Some("Check file path and permissions"),
            InvalidContextId { .. } => Some("The stream is corrupt: re-create the context"),
            SettingsParse(_) => Some("Check YAML syntax: indentation and quoting"),
            InvalidLogLevel { .. } => Some("Use one of: trace, debug, info, warn, error"),
        }
    }
}
