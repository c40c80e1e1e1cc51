//! Per-task result slots
//!
//! The runner owns one slot per task. A slot starts out pending and is written
//! exactly once: with the task's outcome when it settles, or with
//! [`ResultSlot::Cancelled`] if the task was never started. Writing a slot a
//! second time is a runner bug and panics.

use crate::task::TaskError;

/// Outcome record for one task of the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSlot<T> {
    /// Not settled yet
    Pending,
    /// The task returned a value
    Success(T),
    /// The task returned an error or panicked
    Failure(TaskError),
    /// The task was never started
    Cancelled,
}

impl<T> ResultSlot<T> {
    /// Whether the slot still awaits an outcome
    pub fn is_pending(&self) -> bool {
        matches!(self, ResultSlot::Pending)
    }

    /// Whether the task succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ResultSlot::Success(_))
    }

    /// Whether the task failed
    pub fn is_failure(&self) -> bool {
        matches!(self, ResultSlot::Failure(_))
    }

    /// Whether the task was cancelled before it started
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResultSlot::Cancelled)
    }

    /// Borrow the success value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            ResultSlot::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the failure, if any
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            ResultSlot::Failure(err) => Some(err),
            _ => None,
        }
    }

    /// Convert a settled slot into a `Result`; `None` for pending or cancelled slots
    pub fn into_result(self) -> Option<Result<T, TaskError>> {
        match self {
            ResultSlot::Success(value) => Some(Ok(value)),
            ResultSlot::Failure(err) => Some(Err(err)),
            ResultSlot::Pending | ResultSlot::Cancelled => None,
        }
    }

    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            ResultSlot::Pending => "pending",
            ResultSlot::Success(_) => "success",
            ResultSlot::Failure(_) => "failure",
            ResultSlot::Cancelled => "cancelled",
        }
    }
}

impl<T> From<Result<T, TaskError>> for ResultSlot<T> {
    fn from(result: Result<T, TaskError>) -> Self {
        match result {
            Ok(value) => ResultSlot::Success(value),
            Err(err) => ResultSlot::Failure(err),
        }
    }
}

/// Index-aligned, write-once slot storage owned by the coordinator
///
/// Settling a slot twice, or settling a slot with `Pending`, breaks the
/// runner's exactly-once guarantee and panics.
#[derive(Debug)]
pub(crate) struct SlotTable<T> {
    slots: Vec<ResultSlot<T>>,
    settled: usize,
}

impl<T> SlotTable<T> {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| ResultSlot::Pending).collect(),
            settled: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn settle(&mut self, index: usize, outcome: ResultSlot<T>) {
        assert!(
            !outcome.is_pending(),
            "runner fault: slot {index} settled with Pending"
        );
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .unwrap_or_else(|| panic!("runner fault: slot {index} out of range for batch of {len}"));
        assert!(
            slot.is_pending(),
            "runner fault: slot {index} settled twice (already {})",
            slot.outcome_label()
        );
        *slot = outcome;
        self.settled += 1;
    }

    /// Mark every slot from `from` onwards as cancelled; returns how many were marked
    pub(crate) fn cancel_from(&mut self, from: usize) -> usize {
        let mut marked = 0;
        for index in from..self.slots.len() {
            self.settle(index, ResultSlot::Cancelled);
            marked += 1;
        }
        marked
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.settled == self.slots.len()
    }

    pub(crate) fn into_slots(self) -> Vec<ResultSlot<T>> {
        assert!(
            self.is_complete(),
            "runner fault: {} of {} slots still pending",
            self.slots.len() - self.settled,
            self.slots.len()
        );
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_pending_and_settle_once() {
        let mut table = SlotTable::<u32>::new(3);
        assert_eq!(table.len(), 3);
        assert!(!table.is_complete());

        table.settle(1, ResultSlot::Success(10));
        table.settle(0, ResultSlot::Failure(TaskError::msg("boom")));
        assert_eq!(table.cancel_from(2), 1);
        assert!(table.is_complete());

        let slots = table.into_slots();
        assert_eq!(slots[0].error(), Some(&TaskError::Failed("boom".into())));
        assert_eq!(slots[1].value(), Some(&10));
        assert!(slots[2].is_cancelled());
    }

    #[test]
    #[should_panic(expected = "settled twice")]
    fn double_settle_is_a_runner_fault() {
        let mut table = SlotTable::<u32>::new(1);
        table.settle(0, ResultSlot::Success(1));
        table.settle(0, ResultSlot::Success(2));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn unknown_index_is_a_runner_fault() {
        let mut table = SlotTable::<u32>::new(1);
        table.settle(5, ResultSlot::Cancelled);
    }

    #[test]
    #[should_panic(expected = "still pending")]
    fn handing_out_pending_slots_is_a_runner_fault() {
        let table = SlotTable::<u32>::new(2);
        let _ = table.into_slots();
    }

    #[test]
    fn into_result_maps_terminal_states() {
        assert_eq!(ResultSlot::Success(3).into_result(), Some(Ok(3)));
        assert_eq!(
            ResultSlot::<u8>::Failure(TaskError::Interrupted).into_result(),
            Some(Err(TaskError::Interrupted))
        );
        assert_eq!(ResultSlot::<u8>::Cancelled.into_result(), None);
        assert_eq!(ResultSlot::<u8>::Pending.into_result(), None);
    }
}
