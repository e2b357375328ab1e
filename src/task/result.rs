//! TaskResult - sealed outcome of one task

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ContextId;
use crate::error::Result;

/// Why a task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The module returned an error or sealed a failure
    Execution,
    /// The module panicked
    Panic,
    /// The module returned without sealing a result
    NoResult,
    /// The task failed after cancellation was requested
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Execution => "execution",
            FailureKind::Panic => "panic",
            FailureKind::NoResult => "no result",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Captured cause of a failed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Underlying causes, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Immutable outcome of one task
///
/// Only [`TaskStatus`](super::TaskStatus) creates results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub(super) context_id: ContextId,
    pub(super) context_name: String,
    pub(super) step_id: String,
    pub(super) success: bool,
    /// Unix time in milliseconds
    pub(super) started_at_ms: u64,
    pub(super) duration: Duration,
    #[serde(default)]
    pub(super) counters: BTreeMap<String, u64>,
    #[serde(default)]
    pub(super) description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) failure: Option<TaskFailure>,
}

impl TaskResult {
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} ({}) {} in {}ms",
            self.step_id,
            self.context_id,
            self.context_name,
            if self.success { "succeeded" } else { "failed" },
            self.duration.as_millis()
        )?;
        if let Some(failure) = &self.failure {
            write!(f, ": {failure}")?;
        }
        Ok(())
    }
}
