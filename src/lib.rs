//! # batchrun
//!
//! Run a batch of independent tasks under a chosen execution strategy and
//! collect their outcomes in submission order.
//!
//! ## Quick Start
//!
//! ```rust
//! use batchrun::{ErrorPolicy, ExecutionStrategy, Task, TaskRunner};
//!
//! # async fn example() -> batchrun::Result<()> {
//! let batch: Vec<Task<u64>> = (0..8u64)
//!     .map(|n| Task::blocking(move |_ctx| Ok(n * n)))
//!     .collect();
//!
//! let report = TaskRunner::new()
//!     .with_strategy(ExecutionStrategy::BoundedConcurrent(4))
//!     .with_error_policy(ErrorPolicy::CollectAll)
//!     .run(batch)
//!     .await?;
//!
//! assert_eq!(report.succeeded(), 8);
//! assert_eq!(report.slots()[3].value(), Some(&9));
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - `report.slots()[i]` always belongs to `batch[i]`, whatever the completion order
//! - tasks are started in ascending index order, each at most once
//! - with `BoundedConcurrent(k)` no more than `k` tasks run at the same time
//! - task failures are recorded in their slot; `run` only fails on invalid configuration
//!
//! ## Modules
//!
//! - [`task`]: task descriptors, task context, and task errors
//! - [`runner`]: strategies, policies, engines, result slots, and the runner
//! - [`metrics`]: Prometheus metrics for runs and tasks

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that make a whole run fail
///
/// Individual task failures never surface here; they are recorded in the
/// task's [`ResultSlot`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// Invalid strategy or configuration; no task was started
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Task descriptors and task context
pub mod task;

/// Batch runner
pub mod runner;

/// Metrics collection
pub mod metrics;

pub use runner::{
    Engine, ErrorPolicy, ExecutionStrategy, ResultSlot, RunCounts, RunReport, RunnerConfig,
    StopReason, TaskRunner,
};
pub use task::{Batch, CommandOutput, Task, TaskContext, TaskError, TaskResult};
pub use tokio_util::sync::CancellationToken;

/// Run `batch` with the given strategy and error policy on the default engine
///
/// Shorthand for building a [`TaskRunner`] and calling [`TaskRunner::run`].
pub async fn run<T: Send + 'static>(
    batch: Batch<T>,
    strategy: ExecutionStrategy,
    error_policy: ErrorPolicy,
) -> Result<RunReport<T>> {
    TaskRunner::new()
        .with_strategy(strategy)
        .with_error_policy(error_policy)
        .run(batch)
        .await
}
