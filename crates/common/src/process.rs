//! Timeout-guarded subprocess execution
//!
//! Every external tool (scripting host, log decoder, result query tool,
//! frame extractor) is invoked through [`CommandRunner`]. The production
//! [`ProcessRunner`] never lets a child outlive its deadline.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Grace period between SIGTERM and a hard kill
const TERMINATION_GRACE: Duration = Duration::from_millis(500);

/// A fully described subprocess invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Short human-readable form, long arguments elided
    pub fn describe(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a.chars().count() > 60 {
                    let head: String = a.chars().take(57).collect();
                    format!("{}...", head)
                } else {
                    a.clone()
                }
            })
            .collect();
        format!("{} {}", self.program, args.join(" "))
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convenience constructor for successful output
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for failed output
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or until `spec.timeout` elapses.
    ///
    /// A non-zero exit is not an error at this layer; callers classify it.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// `tokio::process` backed runner
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("exec: {}", spec.describe());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::external(&spec.program, format!("{} is not installed or not on PATH", spec.program))
            } else {
                Error::external(&spec.program, format!("failed to spawn: {}", e))
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = tokio::time::timeout(spec.timeout, async {
            let (status, out, err) = tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            status.map(|s| (s, out, err))
        })
        .await;

        match outcome {
            Ok(Ok((status, out, err))) => Ok(CommandOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
            }),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                warn!(
                    "{} exceeded {}s, terminating",
                    spec.program,
                    spec.timeout.as_secs()
                );
                terminate_child(&mut child).await;
                Err(Error::Timeout {
                    what: spec.program.clone(),
                    seconds: spec.timeout.as_secs(),
                })
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

/// SIGTERM, short grace, then kill. Errors on an exited child are ignored.
async fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(TERMINATION_GRACE, child.wait()).await.is_ok() {
                return;
            }
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo hello; exit 0"]);
        let output = ProcessRunner.run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo oops >&2; exit 3"]);
        let output = ProcessRunner.run(&spec).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).arg("30");
        let start = std::time::Instant::now();
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-tool-xcauto", Duration::from_secs(1));
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert_eq!(err.code(), "external_tool_failure");
    }

    #[test]
    fn test_describe_elides_long_arguments() {
        let spec = CommandSpec::new("osascript", Duration::from_secs(1))
            .args(["-e", &"x".repeat(200)]);
        let text = spec.describe();
        assert!(text.len() < 100);
        assert!(text.ends_with("..."));
    }
}
