//! External process execution with a bounded wall-clock timeout
//!
//! A [`ProcessExecutor`] starts one child process, reads its output line by
//! line in background tasks and races the child's exit, plus the draining of
//! its output, against an optional timer. When the timer wins the child
//! receives a single SIGTERM and the lines read so far are returned; the
//! executor never waits for it to exit.
//!
//! ```rust,no_run
//! use buildstep::executor::{ProcessExecutor, ProcessInvocation};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), buildstep::pipeline::ProcessError> {
//! let outcome = ProcessExecutor::new()
//!     .invoke(
//!         &ProcessInvocation::new("systemctl")
//!             .args(["is-enabled", "nginx"])
//!             .timeout(Some(Duration::from_secs(2))),
//!     )
//!     .await?;
//! println!("{}", outcome.stdout_text());
//! # Ok(())
//! # }
//! ```

use crate::pipeline::ProcessError;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Where the child's output goes besides the capture buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture only
    #[default]
    Capture,
    /// Capture and echo every line to the runner's own stdout/stderr
    Forward,
}

/// A single external command to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessInvocation {
    /// Program name or path
    pub program: String,
    /// Arguments, passed without a shell
    pub args: Vec<String>,
    /// Wall-clock limit; `None` waits for natural exit
    pub timeout: Option<Duration>,
    /// Output handling
    pub mode: OutputMode,
    /// Working directory of the child
    pub cwd: Option<PathBuf>,
}

impl ProcessInvocation {
    /// Creates an invocation of `program` with no arguments
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the output mode
    #[must_use]
    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the working directory
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Command line for log messages
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a process run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The child exited on its own, successfully or not
    Completed,
    /// The timer fired first and the child was asked to stop
    TimedOut,
    /// The child could not be started
    StartFailed,
}

/// Captured result of one process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Program that was requested
    pub program: String,
    /// How the run ended
    pub completion: Completion,
    /// Standard output lines, without line terminators
    pub stdout: Vec<String>,
    /// Standard error lines, without line terminators
    pub stderr: Vec<String>,
    /// Exit code when the child exited normally
    pub exit_code: Option<i32>,
    /// Failure detail; `None` for a successful exit
    pub error: Option<String>,
    /// Wall time from spawn to completion
    pub elapsed: Duration,
    /// Limit the run was started with
    pub timeout: Option<Duration>,
}

impl ProcessOutcome {
    /// Returns true if the child completed with a zero exit code
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.completion == Completion::Completed && self.error.is_none()
    }

    /// Standard output joined with newlines
    #[must_use]
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// Standard error joined with newlines
    #[must_use]
    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }

    /// Converts an unsuccessful outcome into an error
    ///
    /// # Errors
    ///
    /// Returns the [`ProcessError`] variant matching the completion class.
    pub fn ensure_success(self) -> Result<Self, ProcessError> {
        match self.completion {
            Completion::Completed if self.error.is_none() => Ok(self),
            Completion::Completed => Err(ProcessError::NonZeroExit {
                stderr: self.stderr_text(),
                status: self.error.unwrap_or_default(),
                program: self.program,
            }),
            Completion::TimedOut => Err(ProcessError::TimedOut {
                program: self.program,
                after: self.timeout.unwrap_or(self.elapsed),
            }),
            Completion::StartFailed => Err(ProcessError::StartFailed {
                program: self.program,
                reason: self.error.unwrap_or_default(),
            }),
        }
    }
}

/// Runs external processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

type LineBuffer = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy)]
enum Echo {
    Stdout,
    Stderr,
}

impl ProcessExecutor {
    /// Creates a new executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs one invocation to completion or timeout
    ///
    /// A child that cannot be spawned is reported as an outcome with
    /// [`Completion::StartFailed`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::InvalidInvocation`] when the program name is
    /// empty.
    pub async fn invoke(
        &self,
        invocation: &ProcessInvocation,
    ) -> Result<ProcessOutcome, ProcessError> {
        let program = invocation.program.trim();
        if program.is_empty() {
            return Err(ProcessError::InvalidInvocation(
                "program name is empty".to_string(),
            ));
        }

        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(program, error = %err, "Failed to start process");
                return Ok(ProcessOutcome {
                    program: program.to_string(),
                    completion: Completion::StartFailed,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    exit_code: None,
                    error: Some(err.to_string()),
                    elapsed: started.elapsed(),
                    timeout: invocation.timeout,
                });
            }
        };
        tracing::debug!(
            command = %invocation.display(),
            pid = child.id(),
            timeout = ?invocation.timeout,
            "Process started"
        );

        let forward = invocation.mode == OutputMode::Forward;
        let stdout: LineBuffer = Arc::default();
        let stderr: LineBuffer = Arc::default();
        let mut readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|pipe| {
                spawn_reader(pipe, Arc::clone(&stdout), forward.then_some(Echo::Stdout))
            }),
            child.stderr.take().map(|pipe| {
                spawn_reader(pipe, Arc::clone(&stderr), forward.then_some(Echo::Stderr))
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        // The limit covers exit and output drain together: a background
        // process holding the pipes open must not outlive the timeout.
        let finished = async {
            let status = child.wait().await;
            for reader in &mut readers {
                if let Err(err) = reader.await {
                    tracing::debug!(error = %err, "Output reader task ended abnormally");
                }
            }
            status
        };
        let exited = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
            None => Some(finished.await),
        };

        let (completion, exit_code, error) = match exited {
            Some(status) => {
                let (exit_code, error) = classify_exit(status);
                (Completion::Completed, exit_code, error)
            }
            None => {
                let limit = invocation.timeout.unwrap_or_default();
                tracing::warn!(program, ?limit, "Process timed out, sending SIGTERM");
                terminate(&mut child);
                for reader in &readers {
                    reader.abort();
                }
                (
                    Completion::TimedOut,
                    None,
                    Some(format!("command timed out after {limit:?}")),
                )
            }
        };

        let outcome = ProcessOutcome {
            program: program.to_string(),
            completion,
            stdout: stdout.lock().clone(),
            stderr: stderr.lock().clone(),
            exit_code,
            error,
            elapsed: started.elapsed(),
            timeout: invocation.timeout,
        };
        tracing::debug!(
            program,
            completion = ?outcome.completion,
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.elapsed.as_millis(),
            "Process finished"
        );
        Ok(outcome)
    }
}

fn classify_exit(status: std::io::Result<ExitStatus>) -> (Option<i32>, Option<String>) {
    match status {
        Ok(status) if status.success() => (status.code(), None),
        Ok(status) => (status.code(), Some(status.to_string())),
        Err(err) => (None, Some(format!("failed to wait for process: {err}"))),
    }
}

fn spawn_reader<R>(pipe: R, buffer: LineBuffer, echo: Option<Echo>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    match echo {
                        Some(Echo::Stdout) => println!("{line}"),
                        Some(Echo::Stderr) => eprintln!("{line}"),
                        None => {}
                    }
                    buffer.lock().push(line);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "Stopped reading process output");
                    break;
                }
            }
        }
    })
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        tracing::warn!(pid, error = %err, "Failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(error = %err, "Failed to stop process");
    }
}
