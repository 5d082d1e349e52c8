//! Core types for pipeline domain
//!
//! Per-step results and the policy applied when a step fails.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Final state of one attempted step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// Handler returned successfully
    Succeeded,
    /// Lookup, handler or process failed
    Failed,
}

impl StepState {
    /// Returns true if the step succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// What the dispatcher does after a failed step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and dispatch the next step
    #[default]
    Continue,
    /// Record the failure and stop
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown failure policy '{other}' (expected continue or abort)")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Outcome record of one attempted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Step name
    pub step: String,
    /// Command key the step invoked
    pub cmd: String,
    /// Position of the step in the pipeline
    pub step_count: usize,
    /// Final state
    pub state: StepState,
    /// Handler payload on success
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response: Option<serde_json::Value>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Wall time spent on the step
    pub duration_ms: u64,
}

impl CommandResult {
    /// Builds a successful result
    pub fn succeeded(
        step: impl Into<String>,
        cmd: impl Into<String>,
        step_count: usize,
        response: Option<serde_json::Value>,
    ) -> Self {
        Self {
            step: step.into(),
            cmd: cmd.into(),
            step_count,
            state: StepState::Succeeded,
            response,
            error: None,
            duration_ms: 0,
        }
    }

    /// Builds a failed result
    pub fn failed(
        step: impl Into<String>,
        cmd: impl Into<String>,
        step_count: usize,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            cmd: cmd.into(),
            step_count,
            state: StepState::Failed,
            response: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// Sets the measured duration
    #[must_use]
    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns true if the step succeeded
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_default_is_continue() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Continue);
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("Abort".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_result_json_shape() {
        let result = CommandResult::failed("say", "nope", 2, "unknown command: nope");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stepCount"], 2);
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"], "unknown command: nope");
        assert!(json.get("response").is_none());
        assert_eq!(json["durationMs"], 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StepState::Succeeded.to_string(), "SUCCEEDED");
        assert!(!StepState::Failed.is_success());
    }
}
