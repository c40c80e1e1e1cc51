//! Runs the same batch under each strategy and engine and prints a summary
//!
//! Set `RUST_LOG=batchrun=debug` to see per-task admission and completion logs.

use std::time::Duration;

use batchrun::{Engine, ErrorPolicy, ExecutionStrategy, Task, TaskError, TaskRunner};
use tracing_subscriber::EnvFilter;

fn batch() -> Vec<Task<u64>> {
    (0..12u64)
        .map(|n| {
            if n % 2 == 0 {
                // Simulated I/O wait
                Task::from_async(move |_| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(n)
                })
                .with_label(format!("io-{n}"))
            } else {
                Task::blocking(move |_| {
                    if n == 7 {
                        return Err(TaskError::msg("unlucky number"));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(n * n)
                })
                .with_label(format!("cpu-{n}"))
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("batchrun=info")),
        )
        .init();

    println!(
        "{:<24} {:<12} {:<12} {:>6} {:>6} {:>6} {:>10}",
        "strategy", "engine", "policy", "ok", "failed", "cancel", "elapsed"
    );

    for strategy in [
        ExecutionStrategy::Sequential,
        ExecutionStrategy::BoundedConcurrent(4),
        ExecutionStrategy::BoundedConcurrent(12),
    ] {
        for engine in [Engine::Threaded, Engine::Cooperative] {
            for policy in [ErrorPolicy::CollectAll, ErrorPolicy::FailFast] {
                let report = TaskRunner::new()
                    .with_strategy(strategy)
                    .with_engine(engine)
                    .with_error_policy(policy)
                    .run(batch())
                    .await?;

                println!(
                    "{:<24} {:<12} {:<12} {:>6} {:>6} {:>6} {:>8}ms",
                    format!("{strategy:?}"),
                    format!("{engine:?}"),
                    format!("{policy:?}"),
                    report.succeeded(),
                    report.failed(),
                    report.cancelled(),
                    report.duration().as_millis(),
                );
            }
        }
    }

    println!("\n{}", batchrun::metrics::gather_text());
    Ok(())
}
