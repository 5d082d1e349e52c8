//! Pipeline definition and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::errors::{PipelineError, ValidationError};
use crate::pipeline::params::Params;
use crate::pipeline::types::{FailurePolicy, Validate};
use crate::pipeline::variables::VariableSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Main pipeline structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name
    #[serde(default)]
    pub name: String,

    /// Shell used by the `bash` command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Names of the runtime arguments the pipeline expects
    #[serde(default)]
    pub args: Vec<String>,

    /// Declared variables
    #[serde(default)]
    pub vars: VariableSet,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Behaviour after a failed step
    #[serde(rename = "onFailure", default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<FailurePolicy>,
}

impl Pipeline {
    /// Creates a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Parses and validates a pipeline from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for YAML errors and
    /// [`PipelineError::Validation`] when the pipeline is not runnable.
    pub fn from_yaml_str(source: &str) -> Result<Self, PipelineError> {
        let pipeline: Self =
            serde_yaml::from_str(source).map_err(|e| PipelineError::Config(e.to_string()))?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Reads, parses and validates a pipeline file
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&source)
    }

    /// Shell used for `bash` steps
    pub fn shell(&self) -> &str {
        self.shell.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or("bash")
    }

    /// Returns number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl Validate for Pipeline {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(name) = self.vars.first_duplicate() {
            return Err(ValidationError::DuplicateVariable {
                name: name.to_string(),
            });
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(ValidationError::EmptyStepName { index });
            }
            if step.cmd.trim().is_empty() {
                return Err(ValidationError::EmptyCommand {
                    step: step.name.clone(),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "unnamed" } else { &self.name };
        write!(f, "Pipeline({name}): {} steps", self.steps.len())
    }
}

/// One named invocation of a registered command
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Step {
    /// Step name
    pub name: String,

    /// Registry key of the command
    pub cmd: String,

    /// Command parameters
    #[serde(default)]
    pub params: Params,

    /// Timeout in seconds for processes the step starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Step {
    /// Creates a step without parameters
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            params: Params::Null,
            timeout: None,
        }
    }

    /// Sets the parameters
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Step timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Builder for creating pipelines
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets pipeline name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.pipeline.name = name.into();
        self
    }

    /// Sets the shell hint
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.pipeline.shell = Some(shell.into());
        self
    }

    /// Declares an expected runtime argument
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.pipeline.args.push(name.into());
        self
    }

    /// Declares a variable
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pipeline.vars.set(name, value);
        self
    }

    /// Adds a step
    pub fn step(mut self, step: Step) -> Self {
        self.pipeline.steps.push(step);
        self
    }

    /// Sets the failure policy
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.pipeline.on_failure = Some(policy);
        self
    }

    /// Builds pipeline
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Pipeline, ValidationError> {
        self.pipeline.validate()?;
        Ok(self.pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEPLOY: &str = r#"
shell: bash
name: deploy
onFailure: abort
args: [name, desc]
vars:
  - {name: location, value: /opt/app}
  - {name: port, value: 8080}
steps:
  - {name: say, cmd: bash, params: "echo ${name}", timeout: 30}
  - name: unit
    cmd: systemctl-file
    params:
      name: ${name}
      description: ${desc}
      ExecStart: /opt/app/run
  - {name: when, cmd: time}
"#;

    #[test]
    fn test_parse_full_pipeline() {
        let pipeline = Pipeline::from_yaml_str(DEPLOY).unwrap();
        assert_eq!(pipeline.name, "deploy");
        assert_eq!(pipeline.shell(), "bash");
        assert_eq!(pipeline.on_failure, Some(FailurePolicy::Abort));
        assert_eq!(pipeline.args, vec!["name", "desc"]);
        assert_eq!(pipeline.vars.get("port"), Some("8080"));
        assert_eq!(pipeline.step_count(), 3);
        assert_eq!(pipeline.steps[0].timeout(), Some(Duration::from_secs(30)));
        assert_eq!(pipeline.steps[0].params, Params::scalar("echo ${name}"));
        assert_eq!(
            pipeline.steps[1].params.get_str("ExecStart").as_deref(),
            Some("/opt/app/run")
        );
        assert_eq!(pipeline.steps[2].params, Params::Null);
    }

    #[test]
    fn test_default_shell_and_policy() {
        let pipeline = Pipeline::from_yaml_str("steps: []").unwrap();
        assert_eq!(pipeline.shell(), "bash");
        assert_eq!(pipeline.on_failure, None);
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let err = Pipeline::from_yaml_str("vars: [{name: a, value: 1}, {name: a, value: 2}]")
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::Validation(ValidationError::DuplicateVariable {
                name: "a".to_string()
            })
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        let result = Pipeline::builder().step(Step::new("x", " ")).build();
        assert!(matches!(result, Err(ValidationError::EmptyCommand { .. })));
    }

    #[test]
    fn test_empty_step_name_rejected() {
        let result = Pipeline::builder()
            .step(Step::new("ok", "time"))
            .step(Step::new("", "time"))
            .build();
        assert_eq!(result, Err(ValidationError::EmptyStepName { index: 1 }));
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        let err = Pipeline::from_yaml_str("steps: [").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Pipeline::from_file("/nonexistent/pipeline.yaml").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_display() {
        let pipeline = Pipeline::builder()
            .name("demo")
            .step(Step::new("a", "time"))
            .build()
            .unwrap();
        assert_eq!(pipeline.to_string(), "Pipeline(demo): 1 steps");
    }
}
