#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Runs a child binary, streams its stdout and stderr line-by-line to a
//! caller-supplied callback, and kills it on cancellation.
//!
//! Every external tool the pipeline shells out to (the disc scanner, the
//! ripper, `ffprobe`, `ffmpeg`, `fpcalc`) goes through [`run`] so that
//! cancellation and output capture behave identically everywhere.

use std::process::Stdio;
use std::time::Duration;

use spindle_core::{Cancellation, SpindleError, SpindleResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// How often the supervisor checks the cancellation token while the child
/// runs.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single line read from the child's stdout or stderr.
#[derive(Debug, Clone)]
pub enum OutputLine {
    /// A complete line from standard output.
    Stdout(String),
    /// A complete line from standard error.
    Stderr(String),
}

/// Run `binary` with `args`, forwarding every complete line from stdout and
/// stderr to `on_line` exactly once. Ordering is preserved within each
/// stream but not across them.
///
/// Returns once the child exits successfully. A non-zero exit becomes an
/// [`SpindleError::external_tool`] with the message `wait command: <status>`.
/// Scanner errors become `scan output: <err>`. If `cancel` is signalled
/// while the child is running, it is killed and a [`SpindleError::transient`]
/// is returned so the caller can decide whether to resume the item.
///
/// # Errors
///
/// Returns an error if the binary cannot be spawned, if reading its output
/// fails, if it exits non-zero, or if cancellation is observed first.
pub async fn run(
    cancel: &Cancellation,
    binary: &str,
    args: &[String],
    mut on_line: impl FnMut(OutputLine) + Send,
) -> SpindleResult<()> {
    tracing::debug!(binary, args = ?args, "spawning supervised process");
    let mut child = Command::new(binary)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            SpindleError::configuration_with_source(
                format!("failed to spawn '{binary}'"),
                err,
            )
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SpindleError::external_tool(format!("'{binary}' did not open stdout")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SpindleError::external_tool(format!("'{binary}' did not open stderr")))?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
    poll.tick().await;

    loop {
        if cancel.is_cancelled() {
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Err(SpindleError::transient("process cancelled"));
        }

        tokio::select! {
            biased;

            line = stdout_lines.next_line(), if stdout_open => match line {
                Ok(Some(line)) => on_line(OutputLine::Stdout(line)),
                Ok(None) => stdout_open = false,
                Err(err) => {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    return Err(SpindleError::external_tool_with_source("scan output", err));
                }
            },
            line = stderr_lines.next_line(), if stderr_open => match line {
                Ok(Some(line)) => on_line(OutputLine::Stderr(line)),
                Ok(None) => stderr_open = false,
                Err(err) => {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    return Err(SpindleError::external_tool_with_source("scan output", err));
                }
            },
            () = poll.tick(), if stdout_open || stderr_open => {}
            status = child.wait(), if !stdout_open && !stderr_open => {
                let status = status.map_err(|err| {
                    SpindleError::external_tool_with_source("wait command", err)
                })?;
                if status.success() {
                    return Ok(());
                }
                return Err(SpindleError::external_tool(format!(
                    "wait command: {status}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_stdout_lines_in_order() {
        let cancel = Cancellation::new();
        let mut lines = Vec::new();
        run(
            &cancel,
            "sh",
            &["-c".into(), "echo one; echo two".into()],
            |line| {
                if let OutputLine::Stdout(text) = line {
                    lines.push(text);
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn forwards_stderr_lines() {
        let cancel = Cancellation::new();
        let mut lines = Vec::new();
        run(
            &cancel,
            "sh",
            &["-c".into(), "echo boom 1>&2".into()],
            |line| {
                if let OutputLine::Stderr(text) = line {
                    lines.push(text);
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(lines, vec!["boom"]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_external_tool_error() {
        let cancel = Cancellation::new();
        let err = run(&cancel, "sh", &["-c".into(), "exit 3".into()], |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::ExternalTool);
        assert!(err.message().contains("wait command"));
    }

    #[tokio::test]
    async fn cancellation_kills_process_and_returns_transient_error() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let err = run(&cancel, "sh", &["-c".into(), "sleep 5".into()], |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::Transient);
    }

    #[tokio::test]
    async fn missing_binary_is_configuration_error() {
        let cancel = Cancellation::new();
        let err = run(&cancel, "definitely-not-a-real-binary", &[], |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn runs_a_fake_makemkvcon_binary() {
        let binaries = spindle_test_support::fake_binary::build(&[(
            "makemkvcon",
            spindle_test_support::fake_binary::succeeding_rip(),
        )])
        .unwrap();

        let cancel = Cancellation::new();
        run(&cancel, binaries.path("makemkvcon").to_str().unwrap(), &[], |_| {})
            .await
            .unwrap();
    }
}
