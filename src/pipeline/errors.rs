//! Error types for pipeline domain
//!
//! Errors are split by blast radius: [`PipelineError`] stops a run before any
//! step is dispatched, [`StepError`] is captured into a single step's result,
//! and [`ProcessError`] describes what went wrong with one external process.

use std::time::Duration;
use thiserror::Error;

/// Errors that prevent a pipeline from running at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The pipeline was parsed but is not runnable
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for a loaded pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A step has no command key
    #[error("Step '{step}' has no command")]
    EmptyCommand {
        /// Name of the offending step.
        step: String,
    },

    /// A step has no name
    #[error("Step #{index} has no name")]
    EmptyStepName {
        /// Position of the step in the pipeline.
        index: usize,
    },

    /// Two declared variables share a name
    #[error("Variable '{name}' is declared more than once")]
    DuplicateVariable {
        /// The duplicated variable name.
        name: String,
    },
}

/// Errors captured into a single step's result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The step's command key is not registered
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The parameters do not have the shape the command expects
    #[error("invalid params for {command}: {reason}")]
    InvalidParams {
        /// Command key that rejected the parameters.
        command: String,
        /// What was wrong with them.
        reason: String,
    },

    /// An external process failed
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Command output did not have the expected `key=value` shape
    #[error("malformed output: {0}")]
    MalformedOutput(String),

    /// A filesystem safety guard refused the operation
    #[error("refused: {0}")]
    Refused(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),
}

impl StepError {
    /// Creates an invalid-params error for `command`
    pub fn invalid_params(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for StepError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Errors from running one external process
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The invocation itself is unusable (nothing was spawned)
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// The executable could not be started
    #[error("failed to start {program}: {reason}")]
    StartFailed {
        /// Program that was requested.
        program: String,
        /// Spawn error message.
        reason: String,
    },

    /// The process ran but exited unsuccessfully
    #[error("{program} failed ({status}): {stderr}")]
    NonZeroExit {
        /// Program that was run.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The process outlived its timeout
    #[error("{program} timed out after {after:?}")]
    TimedOut {
        /// Program that was run.
        program: String,
        /// Configured timeout, or the elapsed time when none was set.
        after: Duration,
    },
}
