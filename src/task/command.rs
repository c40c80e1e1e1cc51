//! Process-backed task bodies
//!
//! A command task spawns a child process and waits for it. Running work in a
//! separate process needs no shared memory, so the body only sees what it
//! receives through arguments, environment, and stdin.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{Task, TaskContext, TaskError, TaskResult};

/// Output of a successfully completed child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, always zero for a successful task
    pub code: i32,
    /// Captured standard output
    pub stdout: String,
}

impl Task<CommandOutput> {
    /// Create a task that runs `program` with `args`
    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut cmd = Command::new(&program);
        cmd.args(&args);
        Task::from_command(cmd).with_label(program)
    }

    /// Create a task from a prepared [`Command`]
    ///
    /// Stdout is captured; stdin is closed and stderr is inherited.
    pub fn from_command(cmd: Command) -> Self {
        Task::from_async(move |ctx| run_command(cmd, ctx))
    }
}

async fn run_command(mut cmd: Command, ctx: TaskContext) -> TaskResult<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    trace!(target: "batchrun::command", task = ctx.index(), command = ?cmd.as_std(), "spawn");
    let mut child = cmd.spawn().map_err(|e| TaskError::Spawn(e.to_string()))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| TaskError::Io("child stdout was not captured".to_string()))?;
    let reader = tokio::spawn(async move {
        let mut buf = String::new();
        stdout.read_to_string(&mut buf).await.map(|_| buf)
    });

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            let stdout = reader
                .await
                .map_err(|e| TaskError::Io(e.to_string()))??;

            match status.code() {
                Some(0) => {
                    debug!(target: "batchrun::command", task = ctx.index(), "exit success");
                    Ok(CommandOutput { code: 0, stdout })
                }
                Some(code) => Err(TaskError::NonZeroExit { code }),
                None => Err(TaskError::KilledBySignal),
            }
        }
        _ = ctx.cancelled() => {
            debug!(target: "batchrun::command", task = ctx.index(), "run cancelled; killing child");
            let _ = child.kill().await;
            reader.abort();
            Err(TaskError::Interrupted)
        }
    }
}
