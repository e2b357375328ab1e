//! Task execution
//!
//! - [`TaskStatus`]: progress tracker handed to the module, seals one result
//! - [`TaskResult`]: immutable outcome, serializable for out-of-process runs
//! - [`Token`] / [`TokenSink`]: output availability sent to the scheduler
//! - [`TaskLogger`]: per-task log file
//! - [`TaskRunner`]: runs one context in isolation, then sends its tokens

mod log;
mod result;
mod runner;
mod status;
mod token;

pub use log::{TaskLogger, TASK_LOG_EXTENSION};
pub use result::{FailureKind, TaskFailure, TaskResult};
pub use runner::{create_error_result, send_tokens_for_result, TaskRunner};
pub use status::TaskStatus;
pub use token::{CollectingSink, NoopSink, Token, TokenSink};
