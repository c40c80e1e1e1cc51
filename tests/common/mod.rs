//! Shared instrumentation for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use batchrun::{Task, TaskError};

/// Records how many tasks run at once and how often each task starts
pub struct Probe {
    running: AtomicUsize,
    peak: AtomicUsize,
    starts: Vec<AtomicUsize>,
}

impl Probe {
    pub fn new(tasks: usize) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            starts: (0..tasks).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    pub fn enter(&self, index: usize) {
        self.starts[index].fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn starts(&self, index: usize) -> usize {
        self.starts[index].load(Ordering::SeqCst)
    }

    pub fn total_starts(&self) -> usize {
        self.starts.iter().map(|s| s.load(Ordering::SeqCst)).sum()
    }
}

/// Blocking task that sleeps for `work`, then succeeds with its index or fails
pub fn blocking_task(probe: &Arc<Probe>, index: usize, work: Duration, fail: bool) -> Task<usize> {
    let probe = Arc::clone(probe);
    Task::blocking(move |ctx| {
        assert_eq!(ctx.index(), index);
        probe.enter(index);
        std::thread::sleep(work);
        probe.exit();
        if fail {
            Err(TaskError::msg(format!("task {index} failed")))
        } else {
            Ok(index)
        }
    })
}

/// Async task that suspends for `work`, then succeeds with its index or fails
pub fn async_task(probe: &Arc<Probe>, index: usize, work: Duration, fail: bool) -> Task<usize> {
    let probe = Arc::clone(probe);
    Task::from_async(move |ctx| async move {
        assert_eq!(ctx.index(), index);
        probe.enter(index);
        tokio::time::sleep(work).await;
        probe.exit();
        if fail {
            Err(TaskError::msg(format!("task {index} failed")))
        } else {
            Ok(index)
        }
    })
}
