//! Per-task log files
//!
//! Each task may get its own `<stepId>_context#<contextId>.log`, written by a
//! dedicated `tracing` subscriber. The runner installs it as the default
//! dispatcher of the thread running the module, so events the module emits
//! through `tracing` land in the task file and nowhere else. Failing to open
//! the file only disables the task log.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn, Dispatch};

pub const TASK_LOG_EXTENSION: &str = ".log";

/// Log handle of one task
#[derive(Debug)]
pub struct TaskLogger {
    task: String,
    dispatch: Option<Dispatch>,
    path: Option<PathBuf>,
}

impl TaskLogger {
    /// Logger writing to `<dir>/<task_prefix>.log`
    ///
    /// Falls back to [`TaskLogger::disabled`] when the file cannot be created.
    pub fn open(dir: &Path, task_prefix: &str, level: LevelFilter) -> Self {
        let path = dir.join(format!("{task_prefix}{TASK_LOG_EXTENSION}"));
        let file = fs::create_dir_all(dir).and_then(|_| File::create(&path));
        match file {
            Ok(file) => {
                let subscriber = tracing_subscriber::fmt()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_max_level(level)
                    .finish();
                debug!(path = %path.display(), "task log opened");
                Self {
                    task: task_prefix.to_string(),
                    dispatch: Some(Dispatch::new(subscriber)),
                    path: Some(path),
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot create task log file, task logging disabled");
                Self::disabled(task_prefix)
            }
        }
    }

    /// Logger forwarding to the process-wide subscriber
    pub fn disabled(task_prefix: &str) -> Self {
        Self {
            task: task_prefix.to_string(),
            dispatch: None,
            path: None,
        }
    }

    /// Whether events go to a task file
    pub fn is_enabled(&self) -> bool {
        self.dispatch.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with this task's subscriber as the thread default
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    pub fn debug(&self, message: &str) {
        self.in_scope(|| debug!(task = %self.task, "{message}"));
    }

    pub fn info(&self, message: &str) {
        self.in_scope(|| info!(task = %self.task, "{message}"));
    }

    pub fn warn(&self, message: &str) {
        self.in_scope(|| warn!(task = %self.task, "{message}"));
    }

    pub fn error(&self, message: &str) {
        self.in_scope(|| error!(task = %self.task, "{message}"));
    }

    /// Detach the task subscriber; later events go to the process logger
    pub fn close(&mut self) {
        if self.dispatch.take().is_some() {
            debug!(task = %self.task, "task log closed");
        }
    }
}
