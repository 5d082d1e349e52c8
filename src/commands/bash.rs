//! `bash`: run one shell line

use crate::executor::{CommandHandler, OutputMode, StepContext, StepOutput};
use crate::pipeline::{Params, StepError};
use async_trait::async_trait;
use serde_json::json;

/// Runs `<shell> -c <line>` with output forwarded to the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct BashCommand;

#[async_trait]
impl CommandHandler for BashCommand {
    fn name(&self) -> &str {
        "bash"
    }

    fn help(&self) -> &str {
        "Execute a shell command line"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let line = params
            .as_scalar()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                StepError::invalid_params(
                    self.name(),
                    format!("expected a command line, got {}", params.kind()),
                )
            })?;

        tracing::info!(step = %ctx.step_name, shell = %ctx.shell, "Running shell line");
        let invocation = ctx
            .invocation(ctx.shell)
            .args(["-c", line])
            .mode(OutputMode::Forward);
        let outcome = ctx.run(&invocation).await?.ensure_success()?;

        Ok(StepOutput::respond(json!({
            "exitCode": outcome.exit_code,
            "stdout": outcome.stdout_text(),
        })))
    }
}
