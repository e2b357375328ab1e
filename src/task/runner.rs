//! TaskRunner - isolated execution of one task and token propagation
//!
//! ```text
//! run()
//!   ├─ claim the context (second run fails fast)
//!   ├─ open the task log (optional, non-fatal)
//!   ├─ start the clock
//!   ├─ module.execute() on a blocking thread, errors and panics captured
//!   ├─ close the task log
//!   ├─ no sealed result? -> NoResult failure
//!   └─ send_tokens(): once, only on success, one token per output port
//! ```
//!
//! The runner schedules nothing itself: a scheduler runs several tasks by
//! awaiting several `run()` calls concurrently.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, instrument, warn};

use super::log::TaskLogger;
use super::result::{FailureKind, TaskResult};
use super::status::TaskStatus;
use super::token::{Token, TokenSink};
use crate::context::TaskContext;
use crate::data::Data;
use crate::error::{Result, StepflowError};
use crate::module::Module;
use crate::step::Step;

type Outcome = std::thread::Result<anyhow::Result<()>>;

/// Runs one task context against its module
pub struct TaskRunner {
    context: Arc<TaskContext>,
    module: Arc<dyn Module>,
    sink: Arc<dyn TokenSink>,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(context: Arc<TaskContext>, module: Arc<dyn Module>, sink: Arc<dyn TokenSink>) -> Self {
        Self {
            context,
            module,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Runner using the module instance `step` hands out for a new task
    pub fn for_step(step: &Step, context: Arc<TaskContext>, sink: Arc<dyn TokenSink>) -> Result<Self> {
        Ok(Self::new(context, step.module_for_task()?, sink))
    }

    pub fn context(&self) -> &Arc<TaskContext> {
        &self.context
    }

    /// Token the module observes through [`TaskStatus::is_cancelled`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the task once and send its tokens
    ///
    /// Module failures come back as an unsuccessful [`TaskResult`]; only
    /// broken invariants (second run, second token emission) are errors.
    #[instrument(
        name = "task",
        skip(self),
        fields(step = %self.context.step_id(), context_id = %self.context.id())
    )]
    pub async fn run(&self) -> Result<TaskResult> {
        self.context.mark_run()?;

        let logger = self.open_logger();
        let mut status = TaskStatus::new(Arc::clone(&self.context), self.cancel.clone());
        status.duration_start();
        debug!(module = self.module.name(), "task started");

        let context = Arc::clone(&self.context);
        let module = Arc::clone(&self.module);
        let joined = tokio::task::spawn_blocking(move || {
            let outcome: Outcome = logger.in_scope(|| {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    module.execute(&context, &mut status, &logger)
                }))
            });
            (status, logger, outcome)
        })
        .await;

        let mut status = match joined {
            Ok((mut status, mut logger, outcome)) => {
                logger.close();
                record_outcome(&mut status, outcome)?;
                status
            }
            Err(join_error) => {
                // The blocking task was lost; its status and log went with it
                let mut status = TaskStatus::new(Arc::clone(&self.context), self.cancel.clone());
                status.duration_start();
                status.create_failure(
                    FailureKind::Panic,
                    format!("task thread failed: {join_error}"),
                )?;
                status
            }
        };

        if !status.is_sealed() {
            status.create_failure(
                FailureKind::NoResult,
                format!("The step {} has not generated a result", self.context.step_id()),
            )?;
        }

        let result = status
            .take_result()
            .ok_or_else(|| StepflowError::ResultNotAvailable {
                context_id: self.context.id().get(),
            })?;

        match result.failure() {
            None => info!(duration_ms = result.duration().as_millis() as u64, "task succeeded"),
            Some(failure) => warn!(
                duration_ms = result.duration().as_millis() as u64,
                kind = %failure.kind,
                "task failed: {}",
                failure.message
            ),
        }

        self.send_tokens(&result)?;
        Ok(result)
    }

    /// Emit one token per output port of a successful result
    ///
    /// Called by [`TaskRunner::run`]; a second call on the same context fails.
    pub fn send_tokens(&self, result: &TaskResult) -> Result<usize> {
        send_tokens_for_result(&self.context, result, self.sink.as_ref())
    }

    fn open_logger(&self) -> TaskLogger {
        let prefix = self.context.task_prefix();
        let settings = self.context.settings();
        let step = self.context.step();
        if !(step.create_log_files() && self.module.create_log_files() && settings.create_log_files)
        {
            return TaskLogger::disabled(&prefix);
        }
        let level = settings.log_filter().unwrap_or_else(|err| {
            warn!(error = %err, "invalid log level for task log, using info");
            LevelFilter::INFO
        });
        TaskLogger::open(step.task_dir(), &prefix, level)
    }
}

/// Seal the result the module did not seal itself
fn record_outcome(status: &mut TaskStatus, outcome: Outcome) -> Result<()> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) if status.is_sealed() => {
            warn!(error = %err, "module returned an error after sealing its result, error ignored");
            Ok(())
        }
        Ok(Err(err)) => status.create_error_result(&err).map(|_| ()),
        Err(_) if status.is_sealed() => {
            warn!("module panicked after sealing its result");
            Ok(())
        }
        Err(payload) => status
            .create_failure(FailureKind::Panic, panic_message(payload.as_ref()))
            .map(|_| ()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("module panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("module panicked: {s}")
    } else {
        "module panicked".to_string()
    }
}

/// Emit the tokens of `result`, typically produced in another process
///
/// Fails when `result` belongs to another context or when the tokens of
/// `context` were already sent. Returns the number of tokens sent.
#[instrument(skip_all, fields(step = %context.step_id(), context_id = %context.id()))]
pub fn send_tokens_for_result(
    context: &TaskContext,
    result: &TaskResult,
    sink: &dyn TokenSink,
) -> Result<usize> {
    if result.context_id() != context.id() {
        return Err(StepflowError::ResultContextMismatch {
            context_id: context.id().get(),
            result_context_id: result.context_id().get(),
        });
    }
    context.mark_tokens_sent()?;

    if !result.is_success() {
        debug!("task failed, no token sent");
        return Ok(0);
    }

    let step = context.step();
    let mut sent = 0;
    for port in step.outputs() {
        let data = context.output_snapshot(port.name())?;
        if step.links_outputs() {
            link_outputs(&data, step.output_dir());
        }
        debug!(port = port.name(), data = %data, "sending token");
        sink.send_token(Token::new(context.id(), port.clone(), data));
        sent += 1;
    }
    Ok(sent)
}

/// Failed result for a context that could not be run, e.g. a task that
/// never started on a remote node
pub fn create_error_result(
    context: &Arc<TaskContext>,
    error: &anyhow::Error,
    message: Option<&str>,
) -> Result<TaskResult> {
    let mut status = TaskStatus::new(Arc::clone(context), CancellationToken::new());
    status.duration_start();
    match message {
        Some(message) => status.create_error_result_with_message(error, message)?,
        None => status.create_error_result(error)?,
    };
    status
        .take_result()
        .ok_or_else(|| StepflowError::ResultNotAvailable {
            context_id: context.id().get(),
        })
}

/// Link every file of `data` into `output_dir`; failures are logged and skipped
fn link_outputs(data: &Data, output_dir: &Path) {
    for element in data.list_elements() {
        for file in element.files() {
            let link = output_dir.join(file.name());
            if let Err(err) = replace_symlink(file.path(), &link) {
                error!(link = %link.display(), error = %err, "cannot create symbolic link");
            }
        }
    }
}

/// Point `link` at `target`, replacing a previous link
///
/// Nothing is removed when `link` already resolves to `target`, which is the
/// case when the output directory is an alias of the working directory.
fn replace_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let target: PathBuf = fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
    if let Ok(resolved) = fs::canonicalize(link) {
        if resolved == target {
            return Ok(());
        }
    }
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    symlink(&target, link)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
