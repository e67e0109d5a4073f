//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Container health probe and activation adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// External program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Invocation of `program` without arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Failure to run an external command to successful completion.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },
    /// The program did not finish in time and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut {
        /// Rendered command line.
        command: String,
        /// Budget that was exceeded.
        timeout: Duration,
    },
    /// The program exited unsuccessfully.
    #[error("`{command}` exited with {code:?}: stdout={stdout:?} stderr={stderr:?}")]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured standard output, trimmed.
        stdout: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },
}

/// Runs external commands with a time budget.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion, capturing its output.
    ///
    /// A non-zero exit is reported as [`CommandError::Failed`].
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput, CommandError>;
}

/// Runner backed by `tokio::process`.
///
/// The child is killed when the time budget is exceeded.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput, CommandError> {
        let rendered = spec.to_string();
        debug!(command = %rendered, timeout_secs = timeout.as_secs(), "running command");
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    command: rendered,
                    source,
                })
            }
            Err(_) => {
                return Err(CommandError::TimedOut {
                    command: rendered,
                    timeout,
                })
            }
        };

        let captured = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        };
        if captured.success() {
            Ok(captured)
        } else {
            Err(CommandError::Failed {
                command: rendered,
                code: captured.code,
                stdout: captured.stdout,
                stderr: captured.stderr,
            })
        }
    }
}
