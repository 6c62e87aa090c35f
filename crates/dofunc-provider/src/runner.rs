//! External command execution.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dofunc_core::{ProviderError, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::context::OpContext;

/// Captured result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Interleaved stdout and stderr, in arrival order.
    pub output: String,
}

/// Runs an external tool to completion.
///
/// Implementations return [`ProviderError::ToolExecution`] carrying the
/// combined output when the tool exits non-zero or cannot be started. They
/// never retry.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, ctx: &OpContext, program: &str, args: &[String]) -> Result<CommandOutput>;
}

pub type DynCommandRunner = Arc<dyn CommandRunner>;

/// Render a command line for diagnostics.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, ctx: &OpContext, program: &str, args: &[String]) -> Result<CommandOutput> {
        let command = command_line(program, args);
        tracing::debug!(command = %command, "running external command");

        // The child is killed if this future is dropped on timeout or cancel.
        ctx.bound(&command, self.timeout, run_to_completion(program, args, &command))
            .await
    }
}

async fn run_to_completion(program: &str, args: &[String], command: &str) -> Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProviderError::ToolExecution {
            command: command.to_string(),
            status: None,
            output: format!("failed to start: {e}"),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let combined = read_interleaved(stdout, stderr)
        .await
        .map_err(|e| ProviderError::io(format!("reading output of `{command}`"), e))?;

    let status = child
        .wait()
        .await
        .map_err(|e| ProviderError::io(format!("waiting for `{command}`"), e))?;

    let output = String::from_utf8_lossy(&combined).into_owned();
    if status.success() {
        tracing::debug!(command, output = %output, "external command succeeded");
        Ok(CommandOutput { output })
    } else {
        tracing::warn!(command, status = ?status.code(), "external command failed");
        Err(ProviderError::ToolExecution {
            command: command.to_string(),
            status: status.code(),
            output,
        })
    }
}

/// Drain both pipes into one buffer until both reach EOF.
async fn read_interleaved<O, E>(stdout: Option<O>, stderr: Option<E>) -> std::io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut combined = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];
    let mut out_open = stdout.is_some();
    let mut err_open = stderr.is_some();
    let (mut stdout, mut stderr) = (stdout, stderr);

    while out_open || err_open {
        tokio::select! {
            n = read_chunk(&mut stdout, &mut out_buf), if out_open => {
                match n? {
                    0 => out_open = false,
                    n => combined.extend_from_slice(&out_buf[..n]),
                }
            }
            n = read_chunk(&mut stderr, &mut err_buf), if err_open => {
                match n? {
                    0 => err_open = false,
                    n => combined.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    }
    Ok(combined)
}

async fn read_chunk<R: AsyncRead + Unpin>(pipe: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize> {
    match pipe {
        Some(p) => p.read(buf).await,
        None => Ok(0),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("tool.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_success_captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(&dir, "echo \"out:$1\"\necho \"err:$2\" 1>&2\nexit 0");
        let runner = TokioCommandRunner::new(Duration::from_secs(10));

        let out = runner
            .run(&OpContext::new(), tool.to_str().unwrap(), &args(&["a", "b"]))
            .await
            .unwrap();
        assert!(out.output.contains("out:a"));
        assert!(out.output.contains("err:b"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(&dir, "echo 'Error: namespace already exists' 1>&2\nexit 3");
        let runner = TokioCommandRunner::new(Duration::from_secs(10));

        let err = runner
            .run(&OpContext::new(), tool.to_str().unwrap(), &args(&["serverless"]))
            .await
            .unwrap_err();
        match err {
            ProviderError::ToolExecution { status, output, command } => {
                assert_eq!(status, Some(3));
                assert!(output.contains("namespace already exists"));
                assert!(command.ends_with("tool.sh serverless"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let runner = TokioCommandRunner::new(Duration::from_secs(10));
        let err = runner
            .run(&OpContext::new(), "/nonexistent/dofunc-test-tool", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ToolExecution { status: None, .. }));
        assert!(err.to_string().contains("failed to start"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(&dir, "exec sleep 30");
        let runner = TokioCommandRunner::new(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = runner
            .run(&OpContext::new(), tool.to_str().unwrap(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(&dir, "exec sleep 30");
        let runner = TokioCommandRunner::new(Duration::from_secs(60));
        let token = CancellationToken::new();
        let ctx = OpContext::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let err = runner
            .run(&ctx, tool.to_str().unwrap(), &[])
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, ProviderError::Cancelled { .. }));
    }

    #[test]
    fn test_command_line_rendering() {
        assert_eq!(
            command_line("doctl", &args(&["serverless", "namespaces", "delete", "ns-a", "--force"])),
            "doctl serverless namespaces delete ns-a --force"
        );
    }
}
