//! Batch runner with ordered admission and bounded concurrency
//!
//! A single coordinator owns the admission counter and the result slots. Tasks
//! are admitted in ascending index order while fewer than `k` are in flight;
//! each completion frees a place for the next unstarted task unless a stop
//! condition (fail-fast, cancellation, timeout) has latched. Tasks still
//! unstarted when the in-flight set drains are marked cancelled.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::report::{RunReport, StopReason};
use super::slot::{ResultSlot, SlotTable};
use super::types::{Engine, ErrorPolicy, ExecutionStrategy, ProgressCallback, RunnerConfig};
use crate::metrics::MetricsCollector;
use crate::task::{Batch, Task, TaskBody, TaskContext, TaskError, TaskResult};
use crate::Result;

/// A settled, started task as seen by the coordinator
struct Completion<T> {
    index: usize,
    outcome: TaskResult<T>,
    elapsed: Duration,
}

/// Executes batches of independent tasks
pub struct TaskRunner {
    config: RunnerConfig,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl TaskRunner {
    /// Create a runner with the default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner from an explicit configuration
    ///
    /// The configuration is validated when a batch is run.
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            progress_callback: None,
        }
    }

    /// Set the concurrency strategy
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the error policy
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.config.error_policy = error_policy;
        self
    }

    /// Set the engine driving task bodies
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.config.engine = engine;
        self
    }

    /// Cancel the run when `timeout` elapses
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set progress callback, called with `(settled, total)` after each started task settles
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Current configuration
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `batch` to completion
    pub async fn run<T: Send + 'static>(&self, batch: Batch<T>) -> Result<RunReport<T>> {
        self.run_with_cancel(batch, CancellationToken::new()).await
    }

    /// Run `batch`, stopping admissions once `cancel` is triggered
    ///
    /// Cancellation is cooperative: unstarted tasks are marked cancelled, while
    /// running tasks see the request through their [`TaskContext`] and settle
    /// normally. The call still returns a report.
    #[instrument(
        skip(self, batch, cancel),
        fields(
            task_count = batch.len(),
            strategy = self.config.strategy.name(),
            limit = self.config.strategy.limit(),
            engine = ?self.config.engine,
        )
    )]
    pub async fn run_with_cancel<T: Send + 'static>(
        &self,
        batch: Batch<T>,
        cancel: CancellationToken,
    ) -> Result<RunReport<T>> {
        self.config.validate()?;

        if batch.is_empty() {
            info!("No tasks to run in batch");
            return Ok(RunReport::empty());
        }

        let run_start = Instant::now();
        let total = batch.len();
        let limit = self.config.strategy.limit();
        let policy = self.config.error_policy;
        let metrics = MetricsCollector::new(self.config.strategy.name(), self.engine_name());

        info!(
            total_tasks = total,
            error_policy = ?policy,
            timeout = ?self.config.timeout,
            "Starting batch run"
        );

        // Timeout only cancels this run, never the caller's token
        let run_token = cancel.child_token();
        let deadline = self.config.timeout.map(|timeout| run_start + timeout);
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);
        let mut timed_out = false;

        let mut unstarted = batch.into_iter().enumerate();
        let mut admitted = 0usize;
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Completion<T>>> =
            FuturesUnordered::new();
        let mut slots = SlotTable::new(total);
        let mut task_durations = vec![None; total];
        let mut settled = 0usize;
        let mut stop: Option<StopReason> = None;

        loop {
            while stop.is_none() && in_flight.len() < limit {
                if !timed_out && deadline.is_some_and(|at| Instant::now() >= at) {
                    timed_out = true;
                    run_token.cancel();
                }
                if run_token.is_cancelled() {
                    stop = Some(if timed_out {
                        StopReason::TimedOut
                    } else {
                        StopReason::Cancelled
                    });
                    break;
                }
                let Some((index, task)) = unstarted.next() else {
                    break;
                };
                in_flight.push(self.admit(index, task, &run_token));
                metrics.record_task_start();
                admitted += 1;
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some(done) = in_flight.next() => {
                    // Every ready completion is harvested before the next admission
                    let mut ready = vec![done];
                    while let Some(Some(done)) = in_flight.next().now_or_never() {
                        ready.push(done);
                    }

                    for Completion { index, outcome, elapsed } in ready {
                        let slot = ResultSlot::from(outcome);
                        metrics.record_task_end(slot.outcome_label(), elapsed);

                        match &slot {
                            ResultSlot::Failure(err) => {
                                warn!(task = index, error = %err, elapsed_ms = elapsed.as_millis(), "Task failed");
                                if policy == ErrorPolicy::FailFast && stop.is_none() {
                                    warn!(task = index, "Fail-fast: no further tasks will be admitted");
                                    stop = Some(StopReason::FailFast { index });
                                }
                            }
                            _ => debug!(task = index, elapsed_ms = elapsed.as_millis(), "Task completed"),
                        }

                        slots.settle(index, slot);
                        task_durations[index] = Some(elapsed);
                        settled += 1;
                        if let Some(callback) = &self.progress_callback {
                            callback(settled, total);
                        }
                    }
                }
                _ = run_token.cancelled(), if stop.is_none() => {
                    stop = Some(if timed_out { StopReason::TimedOut } else { StopReason::Cancelled });
                    info!(in_flight = in_flight.len(), "Run cancelled; waiting for in-flight tasks");
                }
                _ = &mut timer, if !timed_out => {
                    timed_out = true;
                    warn!(timeout = ?self.config.timeout, "Run timed out");
                    run_token.cancel();
                    if stop.is_none() {
                        stop = Some(StopReason::TimedOut);
                    }
                }
            }
        }

        let never_started = slots.cancel_from(admitted);
        metrics.record_cancelled(never_started);

        let run_duration = run_start.elapsed();
        metrics.record_run(stop.as_ref().map_or("completed", StopReason::label), run_duration);

        let report = RunReport::new(slots.into_slots(), task_durations, run_duration, stop);
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            stop_reason = ?report.stop_reason(),
            run_duration_ms = run_duration.as_millis(),
            "Batch run completed"
        );

        Ok(report)
    }

    fn engine_name(&self) -> &'static str {
        match self.config.engine {
            Engine::Threaded => "threaded",
            Engine::Cooperative => "cooperative",
        }
    }

    /// Start one task and return a future resolving when it settles
    fn admit<T: Send + 'static>(
        &self,
        index: usize,
        task: Task<T>,
        token: &CancellationToken,
    ) -> BoxFuture<'static, Completion<T>> {
        debug!(task = index, label = task.label(), "Admitting task");

        let ctx = TaskContext::new(index, token.clone());
        let started = Instant::now();

        match (self.config.engine, task.body) {
            (Engine::Threaded, TaskBody::Async(body)) => {
                // The closure itself runs on the spawned task, so a panic before
                // it yields its future is caught by the join handle
                let handle = tokio::spawn(async move { body(ctx).await });
                async move {
                    let outcome = handle.await.unwrap_or_else(|e| Err(join_failure(e)));
                    Completion { index, outcome, elapsed: started.elapsed() }
                }
                .boxed()
            }
            (Engine::Threaded, TaskBody::Blocking(body)) => {
                let handle = tokio::task::spawn_blocking(move || body(&ctx));
                async move {
                    let outcome = handle.await.unwrap_or_else(|e| Err(join_failure(e)));
                    Completion { index, outcome, elapsed: started.elapsed() }
                }
                .boxed()
            }
            (Engine::Cooperative, TaskBody::Async(body)) => {
                let fut = AssertUnwindSafe(async move { body(ctx).await }).catch_unwind();
                async move {
                    let outcome = fut
                        .await
                        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))));
                    Completion { index, outcome, elapsed: started.elapsed() }
                }
                .boxed()
            }
            (Engine::Cooperative, TaskBody::Blocking(body)) => async move {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| body(&ctx)))
                    .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))));
                Completion { index, outcome, elapsed: started.elapsed() }
            }
            .boxed(),
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn join_failure(err: JoinError) -> TaskError {
    if err.is_panic() {
        TaskError::Panicked(panic_message(err.into_panic()))
    } else {
        TaskError::Failed(format!("task aborted: {err}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
