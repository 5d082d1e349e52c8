//! `listCommands`: registry self-description

use crate::executor::{CommandHandler, StepContext, StepOutput};
use crate::pipeline::{Params, StepError};
use async_trait::async_trait;

/// Lists every registered command with its help text
#[derive(Debug, Clone, Copy, Default)]
pub struct ListCommandsCommand;

#[async_trait]
impl CommandHandler for ListCommandsCommand {
    fn name(&self) -> &str {
        "listCommands"
    }

    fn help(&self) -> &str {
        "List all available commands"
    }

    async fn execute(&self, _params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let commands = ctx.registry.describe();
        serde_json::to_value(commands)
            .map(StepOutput::respond)
            .map_err(|e| StepError::MalformedOutput(format!("cannot encode command list: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandRegistry, ProcessExecutor};
    use crate::pipeline::VariableSet;

    #[tokio::test]
    async fn test_lists_builtin_commands() {
        let registry = CommandRegistry::builtin();
        let executor = ProcessExecutor::new();
        let vars = VariableSet::new();
        let ctx = StepContext {
            step_name: "list",
            shell: "bash",
            timeout: None,
            executor: &executor,
            registry: &registry,
            vars: &vars,
        };
        let out = ListCommandsCommand.execute(&Params::Null, &ctx).await.unwrap();
        let list = out.response.unwrap();
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), registry.len());
        assert!(list
            .iter()
            .any(|c| c["name"] == "listCommands" && c["help"] == "List all available commands"));
    }
}
