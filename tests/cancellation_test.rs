//! Cancellation and timeout tests

mod common;

use std::time::{Duration, Instant};

use batchrun::{
    CancellationToken, Engine, ExecutionStrategy, ResultSlot, StopReason, Task, TaskError,
    TaskRunner,
};
use common::{async_task, Probe};

#[tokio::test]
async fn test_pre_cancelled_run_starts_nothing() {
    let probe = Probe::new(5);
    let batch: Vec<Task<usize>> = (0..5)
        .map(|i| async_task(&probe, i, Duration::from_millis(1), false))
        .collect();

    let token = CancellationToken::new();
    token.cancel();

    let report = TaskRunner::new()
        .with_strategy(ExecutionStrategy::BoundedConcurrent(2))
        .run_with_cancel(batch, token)
        .await
        .expect("cancellation returns a report");

    assert_eq!(report.cancelled(), 5);
    assert_eq!(probe.total_starts(), 0);
    assert_eq!(report.stop_reason(), Some(StopReason::Cancelled));
}

#[tokio::test]
async fn test_cancel_mid_run_marks_unstarted_tasks() {
    for engine in [Engine::Threaded, Engine::Cooperative] {
        let probe = Probe::new(10);
        let batch: Vec<Task<usize>> = (0..10)
            .map(|i| async_task(&probe, i, Duration::from_millis(20), false))
            .collect();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel();
            })
        };

        let report = TaskRunner::new()
            .with_strategy(ExecutionStrategy::Sequential)
            .with_engine(engine)
            .run_with_cancel(batch, token)
            .await
            .unwrap();
        canceller.await.unwrap();

        assert_eq!(report.len(), 10);
        assert_eq!(report.stop_reason(), Some(StopReason::Cancelled));
        // The task running at cancellation time ignores the flag and succeeds
        assert_eq!(report.failed(), 0);
        assert!(report.succeeded() >= 1);
        assert!(report.cancelled() >= 5, "{engine:?}: {:?}", report.counts());
        assert_eq!(report.succeeded() + report.cancelled(), 10);
        for i in 0..10 {
            let started = probe.starts(i) == 1;
            assert_eq!(started, !report.slots()[i].is_cancelled());
        }
    }
}

#[tokio::test]
async fn test_running_tasks_can_observe_cancellation() {
    let batch: Vec<Task<&'static str>> = (0..3)
        .map(|_| {
            Task::from_async(|ctx| async move {
                tokio::select! {
                    _ = ctx.cancelled() => Err(TaskError::Interrupted),
                    _ = tokio::time::sleep(Duration::from_secs(10)) => Ok("finished"),
                }
            })
        })
        .collect();

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        })
    };

    let start = Instant::now();
    let report = TaskRunner::new()
        .with_strategy(ExecutionStrategy::BoundedConcurrent(3))
        .run_with_cancel(batch, token)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(report
        .slots()
        .iter()
        .all(|s| *s == ResultSlot::Failure(TaskError::Interrupted)));
    assert_eq!(report.stop_reason(), Some(StopReason::Cancelled));
}

#[tokio::test]
async fn test_blocking_tasks_can_checkpoint() {
    let batch: Vec<Task<u32>> = vec![Task::blocking(|ctx| {
        let mut steps = 0;
        loop {
            ctx.checkpoint()?;
            steps += 1;
            if steps > 10_000 {
                return Ok(steps);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    })];

    let report = TaskRunner::new()
        .with_timeout(Duration::from_millis(40))
        .run(batch)
        .await
        .unwrap();

    assert_eq!(report.slots()[0], ResultSlot::Failure(TaskError::Interrupted));
    assert_eq!(report.stop_reason(), Some(StopReason::TimedOut));
}

#[tokio::test]
async fn test_timeout_cancels_remaining_tasks() {
    let probe = Probe::new(20);
    let batch: Vec<Task<usize>> = (0..20)
        .map(|i| async_task(&probe, i, Duration::from_millis(20), false))
        .collect();

    let token = CancellationToken::new();
    let report = TaskRunner::new()
        .with_strategy(ExecutionStrategy::Sequential)
        .with_timeout(Duration::from_millis(70))
        .run_with_cancel(batch, token.clone())
        .await
        .unwrap();

    assert_eq!(report.stop_reason(), Some(StopReason::TimedOut));
    assert!(report.cancelled() > 0);
    assert_eq!(report.counts().total(), 20);
    // The timeout cancels only this run, not the caller's token
    assert!(!token.is_cancelled());
}

#[tokio::test]
async fn test_zero_timeout_starts_nothing() {
    let probe = Probe::new(3);
    let batch: Vec<Task<usize>> = (0..3)
        .map(|i| async_task(&probe, i, Duration::from_millis(1), false))
        .collect();

    let report = TaskRunner::new()
        .with_timeout(Duration::ZERO)
        .run(batch)
        .await
        .unwrap();

    assert_eq!(report.cancelled(), 3);
    assert_eq!(probe.total_starts(), 0);
    assert_eq!(report.stop_reason(), Some(StopReason::TimedOut));
}

#[tokio::test]
async fn test_run_without_timeout_is_not_cut_short() {
    let probe = Probe::new(3);
    let batch: Vec<Task<usize>> = (0..3)
        .map(|i| async_task(&probe, i, Duration::from_millis(30), false))
        .collect();

    let report = TaskRunner::new()
        .with_strategy(ExecutionStrategy::Sequential)
        .with_timeout(Duration::from_secs(30))
        .run(batch)
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert!(report.stop_reason().is_none());
    assert!(report.duration() >= Duration::from_millis(90));
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_kills_command_tasks() {
    let batch = vec![Task::command("sleep", ["10"]), Task::command("sleep", ["10"])];

    let start = Instant::now();
    let report = TaskRunner::new()
        .with_strategy(ExecutionStrategy::BoundedConcurrent(1))
        .with_timeout(Duration::from_millis(50))
        .run(batch)
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.slots()[0].error(), Some(&TaskError::Interrupted));
    assert!(report.slots()[1].is_cancelled());
}
