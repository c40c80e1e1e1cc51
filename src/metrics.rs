//! Metrics collection for batch runs
//!
//! Provides Prometheus-compatible metrics for monitoring run throughput,
//! task outcomes, and in-flight concurrency.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

lazy_static! {
    /// Counter for completed runs
    static ref RUNS: IntCounterVec = register_int_counter_vec!(
        "batchrun_runs_total",
        "Total number of batch runs",
        &["strategy", "stop_reason"]
    ).expect("batchrun_runs_total registers once");

    /// Histogram for run duration
    static ref RUN_DURATION: HistogramVec = register_histogram_vec!(
        "batchrun_run_duration_seconds",
        "Batch run wall-clock duration in seconds",
        &["strategy"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0]
    ).expect("batchrun_run_duration_seconds registers once");

    /// Counter for settled tasks by outcome
    static ref TASKS: IntCounterVec = register_int_counter_vec!(
        "batchrun_tasks_total",
        "Total number of settled tasks",
        &["outcome"]
    ).expect("batchrun_tasks_total registers once");

    /// Histogram for task duration
    static ref TASK_DURATION: HistogramVec = register_histogram_vec!(
        "batchrun_task_duration_seconds",
        "Task execution duration in seconds",
        &["engine"],
        vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).expect("batchrun_task_duration_seconds registers once");

    /// Gauge for tasks currently running
    static ref IN_FLIGHT: IntGauge = register_int_gauge!(
        "batchrun_tasks_in_flight",
        "Number of tasks currently running across all runs"
    ).expect("batchrun_tasks_in_flight registers once");
}

/// Metrics collector for one run
///
/// Tracks how many of its tasks are still counted in the in-flight gauge and
/// releases them when dropped, so a run future dropped mid-flight does not leave
/// the gauge inflated.
#[derive(Debug)]
pub struct MetricsCollector {
    strategy: &'static str,
    engine: &'static str,
    in_flight: IntGauge,
    outstanding: AtomicUsize,
}

impl MetricsCollector {
    /// Create a collector labelled with the run's strategy and engine
    pub fn new(strategy: &'static str, engine: &'static str) -> Self {
        Self::with_gauge(strategy, engine, IN_FLIGHT.clone())
    }

    fn with_gauge(strategy: &'static str, engine: &'static str, in_flight: IntGauge) -> Self {
        Self {
            strategy,
            engine,
            in_flight,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Record a task admission
    pub fn record_task_start(&self) {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        self.in_flight.inc();
    }

    /// Record a started task settling
    pub fn record_task_end(&self, outcome: &str, duration: Duration) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.dec();
        TASKS.with_label_values(&[outcome]).inc();
        TASK_DURATION
            .with_label_values(&[self.engine])
            .observe(duration.as_secs_f64());
    }

    /// Admitted tasks that have not settled yet
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Record tasks that were never started
    pub fn record_cancelled(&self, count: usize) {
        if count > 0 {
            TASKS
                .with_label_values(&["cancelled"])
                .inc_by(count as u64);
        }
    }

    /// Record the end of a run
    pub fn record_run(&self, stop_reason: &str, duration: Duration) {
        RUNS.with_label_values(&[self.strategy, stop_reason]).inc();
        RUN_DURATION
            .with_label_values(&[self.strategy])
            .observe(duration.as_secs_f64());
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        let outstanding = *self.outstanding.get_mut();
        if outstanding > 0 {
            self.in_flight.sub(outstanding as i64);
        }
    }
}

/// Render all registered metrics in the Prometheus text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
