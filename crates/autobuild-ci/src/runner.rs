//! External command execution.
//!
//! Build and push tools are only ever reached through [`CommandRunner`], so
//! the dispatcher and publisher can be driven by a scripted fake in tests.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Where a command's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSink {
    /// Capture both streams into [`CommandOutput::output`].
    Capture,

    /// Redirect both streams into this file (truncated first).
    File(PathBuf),
}

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Label used in logs.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Working directory, inherited when `None`.
    pub working_dir: Option<PathBuf>,

    /// Extra environment for the child.
    pub env: Vec<(String, String)>,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,

    pub output: OutputSink,
}

impl Invocation {
    pub fn new(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            working_dir: None,
            env: Vec::new(),
            timeout_secs,
            output: OutputSink::Capture,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn output_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = OutputSink::File(path.into());
        self
    }

    /// The command as a single display string.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// What came back from an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when killed or terminated by a signal).
    pub exit_code: i32,

    /// Combined stdout and stderr for [`OutputSink::Capture`], empty otherwise.
    pub output: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the command was killed after its timeout.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Whether the command exited 0 in time.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Failures to run a command at all.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("invocation {0} has an empty command")]
    EmptyCommand(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes invocations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError>;
}

/// [`CommandRunner`] spawning real child processes.
///
/// A child that outlives its timeout is killed and reported with
/// `timed_out = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Result<Command, RunnerError> {
        let (exe, args) = invocation
            .command
            .split_first()
            .ok_or_else(|| RunnerError::EmptyCommand(invocation.name.clone()))?;

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    fn timeout(invocation: &Invocation) -> Option<Duration> {
        (invocation.timeout_secs > 0).then(|| Duration::from_secs(invocation.timeout_secs))
    }

    fn spawn_error(invocation: &Invocation, source: std::io::Error) -> RunnerError {
        RunnerError::Spawn {
            program: invocation.command[0].clone(),
            source,
        }
    }

    async fn run_captured(invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();
        let child = Self::command(invocation)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        let waited = match Self::timeout(invocation) {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output()).await,
            None => Ok(child.wait_with_output().await),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        // On timeout the future owning the child is dropped, which kills it.
        let Ok(output) = waited else {
            warn!(invocation = %invocation.name, timeout_secs = invocation.timeout_secs, "Command timed out");
            return Ok(CommandOutput {
                exit_code: -1,
                output: String::new(),
                duration_ms,
                timed_out: true,
            });
        };
        let output = output?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
            duration_ms,
            timed_out: false,
        })
    }

    async fn run_to_file(
        invocation: &Invocation,
        path: &Path,
    ) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();
        let log = File::create(path)?;
        let mut child = Self::command(invocation)?
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        let waited = match Self::timeout(invocation) {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await,
            None => Ok(child.wait().await),
        };

        let Ok(status) = waited else {
            if let Err(e) = child.kill().await {
                warn!(invocation = %invocation.name, error = %e, "Failed to kill timed out command");
            }
            warn!(invocation = %invocation.name, timeout_secs = invocation.timeout_secs, "Command timed out");
            append_note(
                path,
                &format!("killed after {} seconds timeout", invocation.timeout_secs),
            );
            return Ok(CommandOutput {
                exit_code: -1,
                output: String::new(),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: true,
            });
        };

        Ok(CommandOutput {
            exit_code: status?.code().unwrap_or(-1),
            output: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        debug!(invocation = %invocation.name, command = %invocation.command_line(), "Running command");
        match &invocation.output {
            OutputSink::Capture => Self::run_captured(invocation).await,
            OutputSink::File(path) => Self::run_to_file(invocation, path).await,
        }
    }
}

/// Append a marker line to a log file, ignoring failures.
pub(crate) fn append_note(path: &Path, note: &str) {
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "\n[autobuild] {note}"));
    if let Err(e) = appended {
        warn!(path = %path.display(), error = %e, "Could not annotate log file");
    }
}
