//! Subprocess execution with a wall-clock bound.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

/// Result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process exited successfully.
    pub success: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {} seconds", .limit.as_secs())]
    TimedOut { program: String, limit: Duration },
}

/// Run `command` (program followed by its arguments) with extra
/// environment bindings, killing it if it outlives `limit`.
pub async fn run_with_timeout(
    command: &[String],
    envs: &[(&str, &str)],
    limit: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let (program, args) = command.split_first().ok_or(ProcessError::EmptyCommand)?;
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| ProcessError::TimedOut {
            program: program.clone(),
            limit,
        })?
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(program = %program, duration_ms, status = ?output.status, "subprocess finished");

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms,
        success: output.status.success(),
    })
}
