//! Strategies, policies, engines, and runner configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, RunnerError};

/// How many tasks may run at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One task at a time, in index order
    Sequential,
    /// At most `k` tasks in flight, admitted in index order
    BoundedConcurrent(usize),
}

impl ExecutionStrategy {
    /// Maximum number of simultaneously running tasks
    pub fn limit(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::BoundedConcurrent(k) => *k,
        }
    }

    /// Rejects `BoundedConcurrent(0)`
    pub fn validate(&self) -> Result<()> {
        match self {
            ExecutionStrategy::BoundedConcurrent(0) => Err(RunnerError::Configuration(
                "concurrency limit must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Short name used as a log field and metric label
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::BoundedConcurrent(_) => "bounded_concurrent",
        }
    }
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::BoundedConcurrent(num_cpus::get().max(1))
    }
}

/// What happens to the rest of the batch when a task fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop admitting tasks after the first failure; in-flight tasks finish
    FailFast,
    /// Run every task regardless of failures
    #[default]
    CollectAll,
}

/// Execution engine that drives admitted tasks
///
/// Both engines honor the same ordering and concurrency guarantees; they differ
/// in where task bodies run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Async bodies are spawned onto the tokio runtime and blocking bodies run on
    /// its blocking thread pool. Tasks execute in parallel on OS threads.
    #[default]
    Threaded,
    /// Every body is polled by the coordinating task itself. Async bodies
    /// interleave at their `.await` points; a blocking body occupies the
    /// scheduler until it returns.
    Cooperative,
}

/// Runner configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Concurrency strategy
    pub strategy: ExecutionStrategy,
    /// Failure handling policy
    pub error_policy: ErrorPolicy,
    /// Engine driving task bodies
    pub engine: Engine,
    /// Overall deadline; when it expires the run is cancelled
    pub timeout: Option<Duration>,
}

impl RunnerConfig {
    /// Parse and validate a JSON configuration
    ///
    /// Malformed documents, including negative concurrency limits, are reported
    /// as [`RunnerError::Configuration`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RunnerConfig = serde_json::from_str(json)
            .map_err(|e| RunnerError::Configuration(format!("invalid runner config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before any task runs
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()
    }
}

/// Progress callback invoked with `(settled, total)` after each task finishes
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;
