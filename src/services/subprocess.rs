//! Runs external media tools with captured output and a hard time limit.

use std::{
    io,
    process::{ExitStatus, Output, Stdio},
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Run `command` to completion, returning its output on a zero exit status.
///
/// The child is killed when the timeout elapses or the calling future is
/// dropped. Stdin is closed so tools never block on a prompt.
pub async fn run(mut command: Command, timeout: Duration) -> Result<Output, SubprocessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(SubprocessError::Spawn { program, source }),
        Err(_) => return Err(SubprocessError::TimedOut { program, timeout }),
    };

    tracing::debug!(
        program = %program,
        status = %output.status,
        duration_ms = start.elapsed().as_millis(),
        "subprocess finished"
    );

    if !output.status.success() {
        return Err(SubprocessError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
