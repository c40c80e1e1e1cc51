//! Run reports

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::slot::ResultSlot;

/// Why admissions stopped before the batch was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A task failed under [`ErrorPolicy::FailFast`](super::ErrorPolicy::FailFast)
    FailFast {
        /// Index of the first failing task
        index: usize,
    },
    /// The caller cancelled the run
    Cancelled,
    /// The overall timeout expired
    TimedOut,
}

impl StopReason {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            StopReason::FailFast { .. } => "fail_fast",
            StopReason::Cancelled => "cancelled",
            StopReason::TimedOut => "timed_out",
        }
    }
}

/// Aggregate outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Tasks that returned a value
    pub succeeded: usize,
    /// Tasks that returned an error or panicked
    pub failed: usize,
    /// Tasks that were never started
    pub cancelled: usize,
}

impl RunCounts {
    /// Count the terminal states of `slots`
    pub fn tally<T>(slots: &[ResultSlot<T>]) -> Self {
        slots.iter().fold(Self::default(), |mut counts, slot| {
            match slot {
                ResultSlot::Success(_) => counts.succeeded += 1,
                ResultSlot::Failure(_) => counts.failed += 1,
                ResultSlot::Cancelled => counts.cancelled += 1,
                ResultSlot::Pending => {}
            }
            counts
        })
    }

    /// Sum of all counts
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Immutable outcome of one run, index-aligned with the submitted batch
#[derive(Debug, Clone)]
pub struct RunReport<T> {
    slots: Vec<ResultSlot<T>>,
    task_durations: Vec<Option<Duration>>,
    counts: RunCounts,
    duration: Duration,
    stop_reason: Option<StopReason>,
}

impl<T> RunReport<T> {
    pub(crate) fn new(
        slots: Vec<ResultSlot<T>>,
        task_durations: Vec<Option<Duration>>,
        duration: Duration,
        stop_reason: Option<StopReason>,
    ) -> Self {
        debug_assert_eq!(slots.len(), task_durations.len());
        let counts = RunCounts::tally(&slots);
        Self {
            slots,
            task_durations,
            counts,
            duration,
            stop_reason,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Duration::ZERO, None)
    }

    /// Result slots; `slots()[i]` belongs to task `i`
    pub fn slots(&self) -> &[ResultSlot<T>] {
        &self.slots
    }

    /// Consume the report, keeping only the slots
    pub fn into_slots(self) -> Vec<ResultSlot<T>> {
        self.slots
    }

    /// Slot of task `index`
    pub fn get(&self, index: usize) -> Option<&ResultSlot<T>> {
        self.slots.get(index)
    }

    /// Number of tasks in the batch
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the batch was empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Aggregate counts
    pub fn counts(&self) -> RunCounts {
        self.counts
    }

    /// Tasks that returned a value
    pub fn succeeded(&self) -> usize {
        self.counts.succeeded
    }

    /// Tasks that returned an error or panicked
    pub fn failed(&self) -> usize {
        self.counts.failed
    }

    /// Tasks that were never started
    pub fn cancelled(&self) -> usize {
        self.counts.cancelled
    }

    /// Wall-clock duration of the whole run
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Elapsed time of task `index`, `None` if it never started
    pub fn task_duration(&self, index: usize) -> Option<Duration> {
        self.task_durations.get(index).copied().flatten()
    }

    /// Why admissions stopped early, if they did
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Whether every task succeeded
    pub fn all_succeeded(&self) -> bool {
        self.counts.succeeded == self.slots.len()
    }

    /// Indices of failed tasks, ascending
    pub fn failed_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_failure())
            .map(|(index, _)| index)
            .collect()
    }
}
