//! TaskStatus - per-task progress tracker that seals into a TaskResult
//!
//! A status seals exactly one result. The `create_*` methods return the
//! sealed result; a second seal is refused.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use super::result::{FailureKind, TaskFailure, TaskResult};
use crate::context::{ContextId, TaskContext};
use crate::error::{Result, StepflowError};

#[derive(Debug)]
pub struct TaskStatus {
    context: Arc<TaskContext>,
    start: Option<Instant>,
    started_at_ms: u64,
    counters: BTreeMap<String, u64>,
    progress: f64,
    description: String,
    cancel: CancellationToken,
    result: Option<TaskResult>,
}

impl TaskStatus {
    pub fn new(context: Arc<TaskContext>, cancel: CancellationToken) -> Self {
        Self {
            context,
            start: None,
            started_at_ms: 0,
            counters: BTreeMap::new(),
            progress: 0.0,
            description: String::new(),
            cancel,
            result: None,
        }
    }

    /// Start the clock; later calls keep the first start
    pub fn duration_start(&mut self) {
        if self.start.is_none() {
            self.start = Some(Instant::now());
            self.started_at_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
        }
    }

    /// Time since `duration_start`, zero if not started
    pub fn elapsed(&self) -> Duration {
        self.start.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    // ═══════════════════════════════════════════════════════════════
    // Progress
    // ═══════════════════════════════════════════════════════════════

    /// Progress in `[0, 1]`; out-of-range values are clamped
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
    }

    /// Progress as `done / total`
    pub fn set_progress_of(&mut self, done: u64, total: u64) {
        if total > 0 {
            self.set_progress(done as f64 / total as f64);
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn increment_counter(&mut self, name: &str, by: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += by;
    }

    pub fn set_counter(&mut self, name: &str, value: u64) {
        self.counters.insert(name.to_string(), value);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    // ═══════════════════════════════════════════════════════════════
    // Cancellation
    // ═══════════════════════════════════════════════════════════════

    /// Whether the scheduler asked this task to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ═══════════════════════════════════════════════════════════════
    // Sealing
    // ═══════════════════════════════════════════════════════════════

    /// Seal a successful result
    pub fn create_result(&mut self) -> Result<&TaskResult> {
        self.seal(None)
    }

    /// Seal a failure caused by `error`
    pub fn create_error_result(&mut self, error: &anyhow::Error) -> Result<&TaskResult> {
        let mut chain = error.chain().map(|e| e.to_string());
        let message = chain.next().unwrap_or_default();
        let failure = self.failure(FailureKind::Execution, message, chain.collect());
        self.seal(Some(failure))
    }

    /// Seal a failure caused by `error`, described by `message`
    pub fn create_error_result_with_message(
        &mut self,
        error: &anyhow::Error,
        message: &str,
    ) -> Result<&TaskResult> {
        let causes = error.chain().map(|e| e.to_string()).collect();
        let failure = self.failure(FailureKind::Execution, message.to_string(), causes);
        self.seal(Some(failure))
    }

    /// Seal a failure with an explicit kind
    pub(crate) fn create_failure(
        &mut self,
        kind: FailureKind,
        message: String,
    ) -> Result<&TaskResult> {
        let failure = self.failure(kind, message, Vec::new());
        self.seal(Some(failure))
    }

    pub fn is_sealed(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub(crate) fn take_result(&mut self) -> Option<TaskResult> {
        self.result.take()
    }

    fn failure(&self, kind: FailureKind, message: String, causes: Vec<String>) -> TaskFailure {
        let kind = if self.is_cancelled() && kind == FailureKind::Execution {
            FailureKind::Cancelled
        } else {
            kind
        };
        TaskFailure {
            kind,
            message,
            causes,
        }
    }

    fn seal(&mut self, failure: Option<TaskFailure>) -> Result<&TaskResult> {
        if self.result.is_some() {
            return Err(StepflowError::ResultAlreadySealed {
                context_id: self.context.id().get(),
            });
        }
        self.duration_start();
        // the module may have renamed the context while running
        let result = TaskResult {
            context_id: self.context.id(),
            context_name: self.context.name(),
            step_id: self.context.step_id().to_string(),
            success: failure.is_none(),
            started_at_ms: self.started_at_ms,
            duration: self.elapsed(),
            counters: self.counters.clone(),
            description: self.description.clone(),
            failure,
        };
        Ok(&*self.result.insert(result))
    }
}
