//! Run-and-capture (§4.2): spawn an external binary, bound it by timeout,
//! and decode its streams as lossy UTF-8.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Outcome of a captured external-process invocation.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

/// Runs `argv` with a bounded total timeout and returns its captured
/// streams. On timeout the child is killed and `timed_out` is set; the
/// caller is responsible for turning that into a `network.timeout`
/// envelope (primitives never build envelopes themselves).
pub async fn run_and_capture(argv: &[String], timeout_dur: Duration) -> std::io::Result<CaptureOutcome> {
    let started = std::time::Instant::now();
    let Some((program, args)) = argv.split_first() else {
        return Ok(CaptureOutcome {
            exit_code: -1,
            stdout: String::new(),
            stderr: "empty command".to_string(),
            elapsed: started.elapsed(),
            timed_out: false,
        });
    };

    let mut child = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let run = async {
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        if let Some(mut pipe) = stdout_pipe.take() {
            let _ = pipe.read_to_end(&mut stdout_buf).await;
        }
        if let Some(mut pipe) = stderr_pipe.take() {
            let _ = pipe.read_to_end(&mut stderr_buf).await;
        }
        let status = child.wait().await?;
        std::io::Result::Ok((status, stdout_buf, stderr_buf))
    };

    match timeout(timeout_dur, run).await {
        Ok(Ok((status, stdout_buf, stderr_buf))) => Ok(CaptureOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            elapsed: started.elapsed(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            // `run` (and the child it owns) is dropped here; `kill_on_drop`
            // terminates the process.
            Ok(CaptureOutcome {
                exit_code: -1,
                stdout: String::new(),
                stderr: "process timed out".to_string(),
                elapsed: started.elapsed(),
                timed_out: true,
            })
        }
    }
}

/// Checks whether a binary is reachable on `PATH` (used by the registry's
/// external-binary availability sweep and by `tool_missing` checks).
pub async fn binary_available(name: &str) -> bool {
    let finder = if cfg!(target_os = "windows") { "where" } else { "which" };
    match Command::new(finder).arg(name).output().await {
        Ok(out) => out.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_true_succeeds() {
        let argv = if cfg!(target_os = "windows") {
            vec!["cmd".to_string(), "/C".to_string(), "exit 0".to_string()]
        } else {
            vec!["true".to_string()]
        };
        let outcome = run_and_capture(&argv, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let argv = if cfg!(target_os = "windows") {
            vec!["cmd".to_string(), "/C".to_string(), "ping -n 10 127.0.0.1 >NUL".to_string()]
        } else {
            vec!["sleep".to_string(), "5".to_string()]
        };
        let outcome = run_and_capture(&argv, Duration::from_millis(50)).await.unwrap();
        assert!(outcome.timed_out);
    }
}
