//! Task contexts
//!
//! A [`TaskContext`] binds one invocation's data to the ports of a step:
//! read-only data for every input port, a write target for every output
//! port. Bindings are stored in arenas indexed by port index, so a declared
//! port always has exactly one slot.
//!
//! ```text
//! TaskContext #12 "sampleA-sampleB"
//!   inputs  [0] reads1 -> Data "sampleA"     (read-only)
//!           [1] reads2 -> Data "sampleB"
//!   outputs [0] output -> Mutex<Data>        (written by the module)
//! ```
//!
//! A context runs at most once and sends its tokens at most once; both are
//! guarded by atomic flags so the checks hold when the context is shared.

mod output;
mod persist;

pub use output::OutputData;
pub use persist::STREAM_FORMAT_VERSION;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use crate::data::Data;
use crate::error::{Result, StepflowError};
use crate::format::DataFormat;
use crate::port::{Direction, In, Out};
use crate::settings::Settings;
use crate::step::StepInfo;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically assigned context id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Keep ids handed out later above `self`
    fn reserve(self) -> Result<()> {
        let next = self
            .0
            .checked_add(1)
            .ok_or(StepflowError::InvalidContextId { id: self.0 })?;
        NEXT_CONTEXT_ID.fetch_max(next, Ordering::Relaxed);
        Ok(())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One invocation's data binding
pub struct TaskContext {
    id: ContextId,
    step: Arc<StepInfo>,
    settings: Arc<Settings>,
    name: RwLock<Option<String>>,
    default_name: OnceCell<String>,
    inputs: Vec<Data>,
    outputs: Vec<Mutex<Data>>,
    ran: AtomicBool,
    tokens_sent: AtomicBool,
}

impl TaskContext {
    /// Start binding data to the ports of `step`
    pub fn builder(step: Arc<StepInfo>, settings: Arc<Settings>) -> TaskContextBuilder {
        let inputs = vec![None; step.inputs().len()];
        TaskContextBuilder {
            step,
            settings,
            name: None,
            inputs,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn step(&self) -> &Arc<StepInfo> {
        &self.step
    }

    pub fn step_id(&self) -> &str {
        self.step.id()
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Explicit name if set, else a name derived from the inputs
    pub fn name(&self) -> String {
        if let Some(name) = self.name.read().as_ref() {
            return name.clone();
        }
        self.default_name
            .get_or_init(|| default_context_name(self.id, &self.inputs))
            .clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = Some(name.trim().to_string());
    }

    /// `<stepId>_context#<contextId>`, shared by the task's log and stream files
    pub fn task_prefix(&self) -> String {
        format!("{}_context#{}", self.step.id(), self.id)
    }

    // ═══════════════════════════════════════════════════════════════
    // Inputs
    // ═══════════════════════════════════════════════════════════════

    /// Data bound to input port `port`
    pub fn input_data(&self, port: &str) -> Result<&Data> {
        let index = self.input_index(port)?;
        Ok(&self.inputs[index])
    }

    /// Data bound to the single input port of `format`
    pub fn input_data_by_format(&self, format: &DataFormat) -> Result<&Data> {
        let port = self.step.inputs().by_format(self.step.id(), format)?;
        Ok(&self.inputs[port.index()])
    }

    // ═══════════════════════════════════════════════════════════════
    // Outputs
    // ═══════════════════════════════════════════════════════════════

    /// Write handle on output port `port`, naming its data `data_name`
    ///
    /// An empty `data_name` keeps the current name.
    pub fn output_data(&self, port: &str, data_name: &str) -> Result<OutputData<'_>> {
        let index = self.output_index(port)?;
        self.open_output(index, data_name)
    }

    /// Write handle on the single output port of `format`
    pub fn output_data_by_format(
        &self,
        format: &DataFormat,
        data_name: &str,
    ) -> Result<OutputData<'_>> {
        let port = self.step.outputs().by_format(self.step.id(), format)?;
        self.open_output(port.index(), data_name)
    }

    /// Write handle on output port `port`, named after `origin`
    pub fn output_data_from(&self, port: &str, origin: &Data) -> Result<OutputData<'_>> {
        self.output_data(port, origin.name())
    }

    /// Snapshot of the data written to output port `port`
    ///
    /// Fails while a write handle on the port is open.
    pub fn output_snapshot(&self, port: &str) -> Result<Data> {
        let index = self.output_index(port)?;
        Ok(self.lock_output(index)?.clone())
    }

    fn open_output(&self, index: usize, data_name: &str) -> Result<OutputData<'_>> {
        let port = self
            .step
            .outputs()
            .at(index)
            .ok_or_else(|| self.unknown_port::<Out>(&index.to_string()))?;
        let mut guard = self.lock_output(index)?;
        if !data_name.is_empty() && guard.name() != data_name {
            guard.set_name(data_name)?;
        }
        Ok(OutputData::new(guard, self, port))
    }

    /// Never blocks: re-opening a port the task already holds is an error
    fn lock_output(&self, index: usize) -> Result<MutexGuard<'_, Data>> {
        self.outputs[index].try_lock().ok_or_else(|| {
            let port = self
                .step
                .outputs()
                .at(index)
                .map(|p| p.name().to_string())
                .unwrap_or_else(|| index.to_string());
            StepflowError::OutputInUse {
                step_id: self.step.id().to_string(),
                port,
            }
        })
    }

    fn input_index(&self, port: &str) -> Result<usize> {
        self.step
            .inputs()
            .get(port)
            .map(|p| p.index())
            .ok_or_else(|| self.unknown_port::<In>(port))
    }

    fn output_index(&self, port: &str) -> Result<usize> {
        self.step
            .outputs()
            .get(port)
            .map(|p| p.index())
            .ok_or_else(|| self.unknown_port::<Out>(port))
    }

    fn unknown_port<D: Direction>(&self, port: &str) -> StepflowError {
        StepflowError::UnknownPort {
            step_id: self.step.id().to_string(),
            direction: D::NAME,
            port: port.to_string(),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Run-once guards
    // ═══════════════════════════════════════════════════════════════

    /// Claim the single run of this context
    pub(crate) fn mark_run(&self) -> Result<()> {
        self.ran
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| StepflowError::ContextAlreadyRun {
                context_id: self.id.get(),
            })
    }

    /// Claim the single token emission of this context
    pub(crate) fn mark_tokens_sent(&self) -> Result<()> {
        self.tokens_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| StepflowError::TokensAlreadySent {
                context_id: self.id.get(),
            })
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    pub fn tokens_sent(&self) -> bool {
        self.tokens_sent.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("step", &self.step.id())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} ({})", self.step.id(), self.id, self.name())
    }
}

/// Builder for [`TaskContext`]
#[derive(Debug)]
pub struct TaskContextBuilder {
    step: Arc<StepInfo>,
    settings: Arc<Settings>,
    name: Option<String>,
    inputs: Vec<Option<Data>>,
}

impl TaskContextBuilder {
    /// Bind `data` to input port `port`
    pub fn input(mut self, port: &str, data: Data) -> Result<Self> {
        let index = self
            .step
            .inputs()
            .get(port)
            .map(|p| p.index())
            .ok_or_else(|| StepflowError::UnknownPort {
                step_id: self.step.id().to_string(),
                direction: In::NAME,
                port: port.to_string(),
            })?;
        self.inputs[index] = Some(data);
        Ok(self)
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.trim().to_string());
        self
    }

    /// Every input port must be bound
    pub fn build(self) -> Result<TaskContext> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (slot, port) in self.inputs.into_iter().zip(self.step.inputs().iter()) {
            let data = slot.ok_or_else(|| StepflowError::MissingBinding {
                step_id: self.step.id().to_string(),
                direction: In::NAME,
                port: port.name().to_string(),
            })?;
            inputs.push(data);
        }

        let outputs = self
            .step
            .outputs()
            .iter()
            .map(|port| {
                let data = if port.is_list() {
                    Data::list(Arc::clone(port.format()))
                } else {
                    Data::value(Arc::clone(port.format()))
                };
                Mutex::new(data)
            })
            .collect();

        Ok(TaskContext {
            id: ContextId::next(),
            step: self.step,
            settings: self.settings,
            name: RwLock::new(self.name),
            default_name: OnceCell::new(),
            inputs,
            outputs,
            ran: AtomicBool::new(false),
            tokens_sent: AtomicBool::new(false),
        })
    }
}

/// Explicit names of scalar inputs, else file names of default-named scalar
/// inputs, else names of list inputs, else `context<id>`
fn default_context_name(id: ContextId, inputs: &[Data]) -> String {
    let mut named = Vec::new();
    let mut file_names = Vec::new();
    let mut lists = Vec::new();

    for data in inputs {
        if data.is_list() {
            lists.push(data.name().to_string());
        } else if !data.is_default_name() {
            named.push(data.name().to_string());
        } else {
            file_names.extend(data.files().iter().map(|f| f.name()));
        }
    }

    [named, file_names, lists]
        .into_iter()
        .find(|names| !names.is_empty())
        .map(|names| names.join("-"))
        .unwrap_or_else(|| format!("context{id}"))
}
