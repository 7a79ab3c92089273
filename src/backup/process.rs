// offsitebackup/src/backup/process.rs
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::errors::ProcessFailure;
use crate::utils::find_executable;
use crate::utils::secrets::Secret;

/// Upper bound on captured stderr; older output is dropped first.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// One external command to run. Secrets travel only in `env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, Secret)>,
}

impl CommandInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: Secret) -> Self {
        self.env.push((key.into(), value));
        self
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion. Only exit status 0 counts as success.
    async fn run(&self, invocation: &CommandInvocation) -> Result<(), ProcessFailure>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    async fn run(&self, invocation: &CommandInvocation) -> Result<(), ProcessFailure> {
        (**self).run(invocation).await
    }
}

/// Spawns real child processes, relaying their output live.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<(), ProcessFailure> {
        let spawn_failure = |diagnostics: String| ProcessFailure {
            program: invocation.program.clone(),
            exit_code: None,
            diagnostics,
        };

        let executable = find_executable(&invocation.program).map_err(|e| {
            spawn_failure(format!(
                "{} executable not found in PATH ({e}). Please ensure the database client tools are installed.",
                invocation.program
            ))
        })?;
        log::debug!(
            "Running {} {}",
            executable.display(),
            invocation.args.join(" ")
        );

        let mut command = Command::new(&executable);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &invocation.env {
            command.env(key, value.expose());
        }

        let mut child = command
            .spawn()
            .map_err(|e| spawn_failure(format!("failed to start {}: {e}", executable.display())))?;

        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failure("stdout was not captured".to_string()))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_failure("stderr was not captured".to_string()))?;

        // Both pipes are drained while waiting so a chatty child never blocks on a full buffer.
        let (status, relayed, captured) = tokio::join!(
            child.wait(),
            relay(child_stdout, tokio::io::stdout(), None),
            relay(child_stderr, tokio::io::stderr(), Some(MAX_DIAGNOSTIC_BYTES)),
        );

        let mut diagnostics = String::from_utf8_lossy(&captured.tail).into_owned();
        if let Some(e) = captured.error {
            diagnostics.push_str(&format!("\n(stderr partially unreadable: {e})"));
        }
        if let Some(e) = relayed.error {
            log::warn!("Lost part of {} stdout: {e}", invocation.program);
        }

        let status = status.map_err(|e| {
            spawn_failure(format!("failed to wait for {}: {e}", invocation.program))
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProcessFailure {
                program: invocation.program.clone(),
                exit_code: status.code(),
                diagnostics,
            })
        }
    }
}

/// Consecutive read errors tolerated before a pipe is abandoned.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 16;

/// What came out of one child pipe.
#[derive(Debug, Default)]
struct Relayed {
    tail: Vec<u8>,
    /// First read error seen; draining continued past it.
    error: Option<std::io::Error>,
}

/// Copies `reader` into `writer` chunk by chunk until EOF, optionally keeping the tail of what
/// passed through. Read errors are recorded and reading resumes, so the child never stalls on a
/// full pipe.
async fn relay<R, W>(mut reader: R, mut writer: W, keep: Option<usize>) -> Relayed
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut relayed = Relayed::default();
    let mut chunk = [0u8; 8192];
    let mut consecutive_errors = 0;
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                consecutive_errors = 0;
                n
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                consecutive_errors += 1;
                if relayed.error.is_none() {
                    relayed.error = Some(e);
                }
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    break;
                }
                continue;
            }
        };
        // Forwarding is best effort; a closed parent stream must not stall the child.
        if writer.write_all(&chunk[..n]).await.is_ok() {
            let _ = writer.flush().await;
        }
        if let Some(limit) = keep {
            relayed.tail.extend_from_slice(&chunk[..n]);
            if relayed.tail.len() > limit {
                let excess = relayed.tail.len() - limit;
                relayed.tail.drain(..excess);
            }
        }
    }
    relayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[tokio::test]
    async fn test_relay_keeps_only_the_tail() {
        let input: &[u8] = b"0123456789";
        let mut sink = Vec::new();
        let relayed = relay(input, &mut sink, Some(4)).await;
        assert_eq!(sink, b"0123456789");
        assert_eq!(relayed.tail, b"6789");
        assert!(relayed.error.is_none());
    }

    /// Serves chunks in order, failing the reads marked `None`.
    struct FlakyReader {
        steps: VecDeque<Option<&'static [u8]>>,
    }

    impl AsyncRead for FlakyReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            match self.steps.pop_front() {
                Some(Some(bytes)) => {
                    buf.put_slice(bytes);
                    Poll::Ready(Ok(()))
                }
                Some(None) => Poll::Ready(Err(std::io::Error::other("transient pipe error"))),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    #[tokio::test]
    async fn test_relay_keeps_draining_after_a_read_error() {
        let reader = FlakyReader {
            steps: VecDeque::from([Some(&b"before "[..]), None, Some(&b"after"[..])]),
        };
        let mut sink = Vec::new();

        let relayed = relay(reader, &mut sink, Some(1024)).await;

        assert_eq!(sink, b"before after");
        assert_eq!(relayed.tail, b"before after");
        let error = relayed.error.expect("read error is recorded");
        assert_eq!(error.to_string(), "transient pipe error");
    }

    #[tokio::test]
    async fn test_relay_gives_up_on_a_pipe_that_never_recovers() {
        let reader = FlakyReader {
            steps: std::iter::repeat_n(None, MAX_CONSECUTIVE_READ_ERRORS + 4).collect(),
        };
        let mut sink = Vec::new();

        let relayed = relay(reader, &mut sink, None).await;

        assert!(sink.is_empty());
        assert!(relayed.error.is_some());
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failure_without_exit_code() {
        let invocation = CommandInvocation::new("definitely-not-a-real-dump-tool-4711");
        let failure = ProcessRunner.run(&invocation).await.unwrap_err();
        assert_eq!(failure.exit_code, None);
        assert!(failure.diagnostics.contains("not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let invocation = CommandInvocation::new("sh").arg("-c").arg("echo dumping; exit 0");
        assert!(ProcessRunner.run(&invocation).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_carries_the_exact_code() {
        for code in [1, 2, 3, 42, 255] {
            let invocation = CommandInvocation::new("sh")
                .arg("-c")
                .arg(format!("exit {code}"));
            let failure = ProcessRunner.run(&invocation).await.unwrap_err();
            assert_eq!(failure.exit_code, Some(code));
            assert_eq!(failure.program, "sh");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_captured_as_diagnostics() {
        let invocation = CommandInvocation::new("sh")
            .arg("-c")
            .arg("echo 'access denied for user' >&2; exit 2");
        let failure = ProcessRunner.run(&invocation).await.unwrap_err();
        assert_eq!(failure.exit_code, Some(2));
        assert!(failure.diagnostics.contains("access denied for user"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_overlay_reaches_the_child() {
        let invocation = CommandInvocation::new("sh")
            .arg("-c")
            .arg(r#"test "$BACKUP_TEST_PASSWORD" = "s3cr3t""#)
            .env("BACKUP_TEST_PASSWORD", Secret::new("s3cr3t"));
        assert!(ProcessRunner.run(&invocation).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_on_both_pipes_does_not_deadlock() {
        // Well past a pipe buffer on each stream.
        let script = "i=0; while [ $i -lt 4000 ]; do echo 'out line padding padding padding'; \
                      echo 'err line padding padding padding' >&2; i=$((i+1)); done; exit 5";
        let invocation = CommandInvocation::new("sh").arg("-c").arg(script);
        let failure = ProcessRunner.run(&invocation).await.unwrap_err();
        assert_eq!(failure.exit_code, Some(5));
        assert!(failure.diagnostics.len() <= MAX_DIAGNOSTIC_BYTES);
        assert!(failure.diagnostics.ends_with("err line padding padding padding\n"));
    }
}
