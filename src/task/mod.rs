//! Task descriptors and the context handed to task bodies
//!
//! A [`Task`] wraps an owned `FnOnce` body, so a task can run at most once by
//! construction. Bodies come in two shapes:
//!
//! - blocking: `FnOnce(&TaskContext) -> TaskResult<T>`, for CPU-bound work or
//!   code that waits with blocking primitives
//! - async: `FnOnce(TaskContext) -> impl Future<Output = TaskResult<T>>`, for work
//!   that suspends at `.await` points

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod command;

pub use command::CommandOutput;

/// Result produced by a task body
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// An ordered batch of tasks; index `i` identifies `batch[i]` in the report
pub type Batch<T> = Vec<Task<T>>;

/// Failure reported by a single task
///
/// Task failures are recorded in the task's result slot and never abort the
/// run by themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The body returned an error
    #[error("task failed: {0}")]
    Failed(String),

    /// The body panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The body observed cancellation and gave up early
    #[error("task interrupted by cancellation")]
    Interrupted,

    /// A child process exited with a non-zero code
    #[error("non-zero exit code: {code}")]
    NonZeroExit {
        /// Exit code reported by the child
        code: i32,
    },

    /// A child process was terminated by a signal
    #[error("killed by signal")]
    KilledBySignal,

    /// A child process could not be spawned
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// I/O error while running the body
    #[error("io error: {0}")]
    Io(String),
}

impl TaskError {
    /// Build a [`TaskError::Failed`] from any displayable message
    pub fn msg(message: impl fmt::Display) -> Self {
        TaskError::Failed(message.to_string())
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Failed(format!("{err:#}"))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Io(err.to_string())
    }
}

/// Context passed to a running task body
///
/// Exposes the task's batch index and the run-wide cancellation flag. Bodies
/// that want to stop early on cancellation check it at their own suspension
/// points; the runner never interrupts a body.
#[derive(Debug, Clone)]
pub struct TaskContext {
    index: usize,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(index: usize, cancel: CancellationToken) -> Self {
        Self { index, cancel }
    }

    /// Position of this task in the submitted batch
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether cancellation of the whole run has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation of the whole run has been requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Returns `Err(TaskError::Interrupted)` if the run has been cancelled
    ///
    /// Meant for use with `?` between steps of a long body.
    pub fn checkpoint(&self) -> TaskResult<()> {
        if self.is_cancelled() {
            Err(TaskError::Interrupted)
        } else {
            Ok(())
        }
    }
}

pub(crate) type BlockingBody<T> = Box<dyn FnOnce(&TaskContext) -> TaskResult<T> + Send + 'static>;
pub(crate) type AsyncBody<T> =
    Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, TaskResult<T>> + Send + 'static>;

pub(crate) enum TaskBody<T> {
    Blocking(BlockingBody<T>),
    Async(AsyncBody<T>),
}

/// One independent unit of work
pub struct Task<T> {
    label: Option<String>,
    pub(crate) body: TaskBody<T>,
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            TaskBody::Blocking(_) => "blocking",
            TaskBody::Async(_) => "async",
        };
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("body", &kind)
            .finish()
    }
}

impl<T: Send + 'static> Task<T> {
    /// Create a task from a blocking body
    pub fn blocking<F>(body: F) -> Self
    where
        F: FnOnce(&TaskContext) -> TaskResult<T> + Send + 'static,
    {
        Self {
            label: None,
            body: TaskBody::Blocking(Box::new(body)),
        }
    }

    /// Create a task from an async body
    pub fn from_async<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        Self {
            label: None,
            body: TaskBody::Async(Box::new(move |ctx| body(ctx).boxed())),
        }
    }

    /// Attach a label used in log output
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label attached with [`Task::with_label`], if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether the body is blocking
    pub fn is_blocking(&self) -> bool {
        matches!(self.body, TaskBody::Blocking(_))
    }
}
