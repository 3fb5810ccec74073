use std::process::Stdio;
use std::time::{Duration, Instant};

use ea_domain::{CancellationContext, Error, Result};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::output_buffer::OutputBuffer;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub truncated: bool,
}

/// Run `code` as a Python script, capturing stdout/stderr into bounded
/// buffers, hard-capped at `timeout` and cooperatively cancellable via
/// `cancellation`. `timeout` is enforced here (not just by the caller)
/// so the child is always explicitly killed rather than relying on drop.
pub async fn run_python(
    code: &str,
    timeout: Duration,
    output_cap_chars: usize,
    cancellation: &CancellationContext,
) -> Result<ExecResult> {
    let deadline = Instant::now() + timeout;

    let mut child = Command::new("python3")
        .arg("-c")
        .arg(code)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ToolExecutionError {
            tool: "code_execution".into(),
            message: format!("failed to spawn python3: {e}"),
        })?;

    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");

    let mut stdout_buf = OutputBuffer::new(output_cap_chars);
    let mut stderr_buf = OutputBuffer::new(output_cap_chars);

    let wait = async {
        let mut out_chunk = [0u8; 4096];
        let mut err_chunk = [0u8; 4096];
        loop {
            tokio::select! {
                n = stdout_pipe.read(&mut out_chunk) => {
                    match n {
                        Ok(0) | Err(_) => {}
                        Ok(n) => {
                            stdout_buf.push(&String::from_utf8_lossy(&out_chunk[..n]));
                            continue;
                        }
                    }
                }
                n = stderr_pipe.read(&mut err_chunk) => {
                    match n {
                        Ok(0) | Err(_) => {}
                        Ok(n) => {
                            stderr_buf.push(&String::from_utf8_lossy(&err_chunk[..n]));
                            continue;
                        }
                    }
                }
                status = child.wait() => {
                    return status;
                }
            }
        }
    };

    let poll_interval = Duration::from_millis(100);
    tokio::pin!(wait);

    loop {
        tokio::select! {
            status = &mut wait => {
                let status = status.map_err(|e| Error::ToolExecutionError {
                    tool: "code_execution".into(),
                    message: format!("waiting on python3: {e}"),
                })?;
                return Ok(ExecResult {
                    stdout: stdout_buf.as_str().to_string(),
                    stderr: stderr_buf.as_str().to_string(),
                    exit_code: status.code(),
                    timed_out: false,
                    truncated: stdout_buf.was_truncated() || stderr_buf.was_truncated(),
                });
            }
            _ = tokio::time::sleep(poll_interval) => {
                let hard_timed_out = Instant::now() >= deadline;
                if cancellation.is_cancelled() || cancellation.remaining().is_zero() || hard_timed_out {
                    let _ = child.start_kill();
                    return Ok(ExecResult {
                        stdout: stdout_buf.as_str().to_string(),
                        stderr: stderr_buf.as_str().to_string(),
                        exit_code: None,
                        timed_out: hard_timed_out || (cancellation.remaining().is_zero() && !cancellation.is_cancelled()),
                        truncated: stdout_buf.was_truncated() || stderr_buf.was_truncated(),
                    });
                }
            }
        }
    }
}

/// Entry point used by the dispatcher. `run_python` enforces its own
/// hard timeout (distinct from, and normally shorter than, the
/// request-level cancellation deadline) and kills the child itself, so
/// this just forwards to it.
pub async fn execute(
    code: &str,
    timeout: Duration,
    output_cap_chars: usize,
    cancellation: &CancellationContext,
) -> Result<ExecResult> {
    run_python(code, timeout, output_cap_chars, cancellation).await
}
