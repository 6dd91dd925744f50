//! External command invocation shared by every pipeline step.
//!
//! Every step follows the same contract: run the command with captured
//! output, and either abort on a nonzero exit ([`RunMode::Abort`]) or hand the
//! result back for the caller to inspect ([`RunMode::Probe`]). A missing
//! executable is always an error. Every run observes the session's
//! cancellation token; a cancelled run kills its child.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How a nonzero exit is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Nonzero exit is a [`CommandError::Failed`].
    Abort,
    /// Nonzero exit is returned as a normal output for the caller to inspect.
    Probe,
}

/// Captured result of a finished external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.trim().is_empty() && self.stderr.trim().is_empty()
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        if !stdout.is_empty() {
            writeln!(f, "stdout: {stdout}")?;
        }
        if !stderr.is_empty() {
            writeln!(f, "stderr: {stderr}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command not found: {program}")]
    Missing { program: String },

    #[error("`{command}` {}", exit_description(.output))]
    Failed {
        command: String,
        output: CommandOutput,
    },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            CommandError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn exit_description(output: &CommandOutput) -> String {
    match output.code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

// ---------------------------------------------------------------------------
// ToolCommand
// ---------------------------------------------------------------------------

/// A fully described external invocation: program, arguments, working dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the tokio command. Output is captured and the child dies with
    /// the handle.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    pub(crate) fn spawn_error(&self, err: std::io::Error) -> CommandError {
        if err.kind() == std::io::ErrorKind::NotFound {
            CommandError::Missing {
                program: self.program.clone(),
            }
        } else {
            CommandError::Io {
                command: self.to_string(),
                source: err,
            }
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs external commands for one session, bound to its cancellation token.
#[derive(Debug, Clone)]
pub struct Runner {
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn run(
        &self,
        cmd: &ToolCommand,
        mode: RunMode,
    ) -> Result<CommandOutput, CommandError> {
        if self.cancel.is_cancelled() {
            return Err(CommandError::Cancelled {
                command: cmd.to_string(),
            });
        }

        tracing::debug!(command = %cmd, ?mode, cwd = ?cmd.get_current_dir(), "running");

        let child = cmd.to_command().spawn().map_err(|e| cmd.spawn_error(e))?;

        let output = tokio::select! {
            res = child.wait_with_output() => res.map_err(|source| CommandError::Io {
                command: cmd.to_string(),
                source,
            })?,
            _ = self.cancel.cancelled() => {
                return Err(CommandError::Cancelled { command: cmd.to_string() });
            }
        };

        let output = CommandOutput::from(output);
        tracing::debug!(command = %cmd, code = ?output.code, "finished");

        if mode == RunMode::Abort && !output.success() {
            return Err(CommandError::Failed {
                command: cmd.to_string(),
                output,
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Runner {
        Runner::new(CancellationToken::new())
    }

    #[test]
    fn display_joins_program_and_args() {
        let cmd = ToolCommand::new("kind").args(["get", "clusters"]);
        assert_eq!(cmd.to_string(), "kind get clusters");
    }

    #[test]
    fn whitespace_only_output_is_empty() {
        let blank = CommandOutput {
            code: Some(1),
            stdout: "  \n".into(),
            stderr: String::new(),
        };
        assert!(blank.is_empty());
        let out = CommandOutput {
            stderr: "boom\n".into(),
            ..blank
        };
        assert!(!out.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abort_mode_fails_on_nonzero_exit() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo oops >&2; exit 3"]);
        let err = runner().run(&cmd, RunMode::Abort).await.unwrap_err();
        match err {
            CommandError::Failed { output, .. } => {
                assert_eq!(output.code, Some(3));
                assert_eq!(output.stderr.trim(), "oops");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_mode_returns_nonzero_output() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo hi; exit 1"]);
        let out = runner().run(&cmd, RunMode::Probe).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let cmd = ToolCommand::new("ls").current_dir(dir.path());
        let out = runner().run(&cmd, RunMode::Abort).await.unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let cmd = ToolCommand::new("__kindeploy_no_such_binary__");
        let err = runner().run(&cmd, RunMode::Probe).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Missing { ref program } if program == "__kindeploy_no_such_binary__"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_stops_a_running_command() {
        let cancel = CancellationToken::new();
        let runner = Runner::new(cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let cmd = ToolCommand::new("sleep").arg("30");
        let err = runner.run(&cmd, RunMode::Abort).await.unwrap_err();
        assert!(matches!(err, CommandError::Cancelled { .. }));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
