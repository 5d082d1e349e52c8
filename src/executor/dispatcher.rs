//! Sequential step dispatch
//!
//! The dispatcher walks a pipeline's steps in order. For each step it fills
//! the parameters from the run context, looks the command up in the registry
//! and records a [`CommandResult`]. Values exported by a handler are written
//! into the run context before the next step is resolved.

use super::process::ProcessExecutor;
use super::registry::{CommandRegistry, StepContext};
use crate::pipeline::{
    resolve, CommandResult, FailurePolicy, Pipeline, Step, StepError, VariableSet,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Mutable state of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Working copy of the pipeline variables
    pub vars: VariableSet,
    /// Runtime arguments
    pub args: HashMap<String, String>,
    /// Shell hint of the pipeline
    pub shell: String,
}

impl RunContext {
    /// Creates the context for running `pipeline` with `args`
    #[must_use]
    pub fn new(pipeline: &Pipeline, args: &HashMap<String, String>) -> Self {
        Self {
            vars: pipeline.vars.clone(),
            args: args.clone(),
            shell: pipeline.shell().to_string(),
        }
    }

    /// Writes an exported value into the variables
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.set(name, value);
    }
}

/// Runs pipeline steps against a command registry
#[derive(Debug, Clone)]
pub struct StepDispatcher {
    registry: CommandRegistry,
    executor: ProcessExecutor,
    policy: Option<FailurePolicy>,
    default_timeout: Option<Duration>,
}

impl Default for StepDispatcher {
    fn default() -> Self {
        Self::new(CommandRegistry::builtin())
    }
}

impl StepDispatcher {
    /// Creates a dispatcher over `registry`
    #[must_use]
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry,
            executor: ProcessExecutor::new(),
            policy: None,
            default_timeout: None,
        }
    }

    /// Overrides the pipeline's failure policy
    #[must_use]
    pub fn with_policy(mut self, policy: Option<FailurePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Timeout for steps that do not set their own
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The registry steps are looked up in
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Policy in force for `pipeline`
    #[must_use]
    pub fn effective_policy(&self, pipeline: &Pipeline) -> FailurePolicy {
        self.policy.or(pipeline.on_failure).unwrap_or_default()
    }

    /// Runs every step of `pipeline` and returns one result per attempted step
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        args: &HashMap<String, String>,
    ) -> Vec<CommandResult> {
        let policy = self.effective_policy(pipeline);
        let mut ctx = RunContext::new(pipeline, args);
        for declared in &pipeline.args {
            if !args.contains_key(declared) {
                tracing::warn!(arg = %declared, "Declared argument was not supplied");
            }
        }

        tracing::info!(
            pipeline = %pipeline.name,
            steps = pipeline.steps.len(),
            policy = %policy,
            "Starting pipeline"
        );

        let mut results = Vec::with_capacity(pipeline.steps.len());
        for (index, step) in pipeline.steps.iter().enumerate() {
            let result = self.run_step(index, step, &mut ctx).await;
            let failed = !result.is_success();
            results.push(result);

            if failed && policy == FailurePolicy::Abort {
                tracing::error!(step = %step.name, "Step failed, stopping pipeline");
                break;
            }
        }

        let failures = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(
            pipeline = %pipeline.name,
            attempted = results.len(),
            failures,
            "Pipeline finished"
        );
        results
    }

    async fn run_step(&self, index: usize, step: &Step, ctx: &mut RunContext) -> CommandResult {
        let started = Instant::now();
        let params = resolve(&step.params, &ctx.vars, &ctx.args);

        let Some(handler) = self.registry.get(&step.cmd) else {
            let err = StepError::UnknownCommand(step.cmd.clone());
            tracing::warn!(index, step = %step.name, cmd = %step.cmd, "Unknown command");
            return CommandResult::failed(&step.name, &step.cmd, index, err.to_string())
                .with_duration(started.elapsed());
        };

        tracing::info!(index, step = %step.name, cmd = %step.cmd, "Dispatching step");
        let outcome = {
            let step_ctx = StepContext {
                step_name: &step.name,
                shell: &ctx.shell,
                timeout: step.timeout().or(self.default_timeout),
                executor: &self.executor,
                registry: &self.registry,
                vars: &ctx.vars,
            };
            handler.execute(&params, &step_ctx).await
        };

        let result = match outcome {
            Ok(output) => {
                for (name, value) in output.exports {
                    tracing::debug!(step = %step.name, var = %name, "Exporting variable");
                    ctx.export(name, value);
                }
                CommandResult::succeeded(&step.name, &step.cmd, index, output.response)
            }
            Err(err) => {
                tracing::warn!(index, step = %step.name, error = %err, "Step failed");
                CommandResult::failed(&step.name, &step.cmd, index, err.to_string())
            }
        }
        .with_duration(started.elapsed());

        tracing::debug!(
            index,
            step = %step.name,
            state = %result.state,
            duration_ms = result.duration_ms,
            "Step finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::registry::{CommandHandler, StepOutput};
    use crate::pipeline::{Params, StepState};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    /// Exports its `set` mapping and echoes its params
    struct Record;

    #[async_trait]
    impl CommandHandler for Record {
        fn name(&self) -> &str {
            "record"
        }

        fn help(&self) -> &str {
            "echoes params and exports `set`"
        }

        async fn execute(
            &self,
            params: &Params,
            _ctx: &StepContext<'_>,
        ) -> Result<StepOutput, StepError> {
            let mut out = StepOutput::respond(params.to_json());
            if let Some(set) = params.get("set").and_then(Params::as_mapping) {
                for (name, value) in set {
                    out = out.export(name.clone(), value.to_text().unwrap_or_default());
                }
            }
            Ok(out)
        }
    }

    struct Fail;

    #[async_trait]
    impl CommandHandler for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        fn help(&self) -> &str {
            "always fails"
        }

        async fn execute(
            &self,
            _params: &Params,
            _ctx: &StepContext<'_>,
        ) -> Result<StepOutput, StepError> {
            Err(StepError::Refused("nope".to_string()))
        }
    }

    fn dispatcher() -> StepDispatcher {
        let mut registry = CommandRegistry::new();
        registry.register(Record);
        registry.register(Fail);
        StepDispatcher::new(registry)
    }

    fn three_steps(middle_cmd: &str) -> Pipeline {
        Pipeline::builder()
            .name("demo")
            .step(Step::new("first", "record").params(Params::scalar("one")))
            .step(Step::new("second", middle_cmd))
            .step(Step::new("third", "record").params(Params::scalar("three")))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exports_reach_later_steps() {
        let pipeline = Pipeline::builder()
            .step(Step::new("build", "record").params(Params::mapping([(
                "set",
                Params::mapping([("artifactPath", Params::scalar("/tmp/out.zip"))]),
            )])))
            .step(Step::new("report", "record").params(Params::scalar("got ${artifactPath}")))
            .step(
                Step::new("again", "record").params(Params::list(["${artifactPath}", "${missing}"])),
            )
            .build()
            .unwrap();

        let results = dispatcher().run(&pipeline, &HashMap::new()).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(CommandResult::is_success));
        assert_eq!(results[1].response, Some(serde_json::json!("got /tmp/out.zip")));
        assert_eq!(
            results[2].response,
            Some(serde_json::json!(["/tmp/out.zip", "${missing}"]))
        );
        assert_eq!(
            results.iter().map(|r| r.step_count).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_exports_never_reach_earlier_steps() {
        let pipeline = Pipeline::builder()
            .step(Step::new("before", "record").params(Params::scalar("unzip ${artifactPath} /dest")))
            .step(Step::new("build", "record").params(Params::mapping([(
                "set",
                Params::mapping([("artifactPath", Params::scalar("/tmp/x.zip"))]),
            )])))
            .step(Step::new("after", "record").params(Params::scalar("unzip ${artifactPath} /dest")))
            .build()
            .unwrap();

        let results = dispatcher().run(&pipeline, &HashMap::new()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].response,
            Some(serde_json::json!("unzip ${artifactPath} /dest"))
        );
        assert_eq!(results[2].response, Some(serde_json::json!("unzip /tmp/x.zip /dest")));
        assert_eq!(pipeline.vars.get("artifactPath"), None);
    }

    #[tokio::test]
    async fn test_unknown_command_continue() {
        let results = dispatcher().run(&three_steps("nope"), &HashMap::new()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].state, StepState::Failed);
        assert_eq!(results[1].error.as_deref(), Some("unknown command: nope"));
        assert!(results[2].is_success());
    }

    #[tokio::test]
    async fn test_unknown_command_abort() {
        let pipeline = three_steps("nope");
        let results = dispatcher()
            .with_policy(Some(FailurePolicy::Abort))
            .run(&pipeline, &HashMap::new())
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].error.as_deref(), Some("unknown command: nope"));
    }

    #[tokio::test]
    async fn test_pipeline_policy_applies_without_override() {
        let mut pipeline = three_steps("fail");
        pipeline.on_failure = Some(FailurePolicy::Abort);
        let results = dispatcher().run(&pipeline, &HashMap::new()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].error.as_deref(), Some("refused: nope"));
    }

    #[tokio::test]
    async fn test_override_beats_pipeline_policy() {
        let mut pipeline = three_steps("fail");
        pipeline.on_failure = Some(FailurePolicy::Abort);
        let results = dispatcher()
            .with_policy(Some(FailurePolicy::Continue))
            .run(&pipeline, &HashMap::new())
            .await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_args_override_vars() {
        let pipeline = Pipeline::builder()
            .var("name", "driver")
            .arg("name")
            .step(Step::new("say", "record").params(Params::scalar("${name}")))
            .build()
            .unwrap();
        let args = HashMap::from([("name".to_string(), "bacnet".to_string())]);
        let results = dispatcher().run(&pipeline, &args).await;
        assert_eq!(results[0].response, Some(serde_json::json!("bacnet")));
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let results = dispatcher().run(&Pipeline::default(), &HashMap::new()).await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_effective_policy_default() {
        assert_eq!(
            dispatcher().effective_policy(&Pipeline::default()),
            FailurePolicy::Continue
        );
    }

    #[test]
    fn test_run_context_copies_vars() {
        let pipeline = Pipeline::builder().var("a", "1").shell("sh").build().unwrap();
        let mut ctx = RunContext::new(&pipeline, &HashMap::new());
        ctx.export("a", "2");
        assert_eq!(ctx.vars.get("a"), Some("2"));
        assert_eq!(pipeline.vars.get("a"), Some("1"));
        assert_eq!(ctx.shell, "sh");
    }
}
