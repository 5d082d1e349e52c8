//! Command registry and the handler interface
//!
//! Every step names a command key. The registry maps keys to handlers and is
//! built once per runner; new commands are added by registering another
//! [`CommandHandler`] without touching the dispatch loop.

use super::process::{ProcessExecutor, ProcessInvocation, ProcessOutcome};
use crate::pipeline::{Params, ProcessError, StepError, VariableSet};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A command that steps can invoke
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// One-line description for `listCommands`
    fn help(&self) -> &str;

    /// Runs the command with already-resolved parameters
    async fn execute(&self, params: &Params, ctx: &StepContext<'_>)
    -> Result<StepOutput, StepError>;
}

/// What a handler sees of the running pipeline
pub struct StepContext<'a> {
    /// Name of the step being run
    pub step_name: &'a str,
    /// Shell used for shell lines
    pub shell: &'a str,
    /// Timeout for processes the step starts
    pub timeout: Option<Duration>,
    /// Process runner
    pub executor: &'a ProcessExecutor,
    /// All registered commands
    pub registry: &'a CommandRegistry,
    /// Current run variables
    pub vars: &'a VariableSet,
}

impl StepContext<'_> {
    /// Starts an invocation of `program` carrying the step timeout
    #[must_use]
    pub fn invocation(&self, program: impl Into<String>) -> ProcessInvocation {
        ProcessInvocation::new(program).timeout(self.timeout)
    }

    /// Runs an invocation through the executor
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::InvalidInvocation`] for an empty program name.
    pub async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome, ProcessError> {
        self.executor.invoke(invocation).await
    }
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("step_name", &self.step_name)
            .field("shell", &self.shell)
            .field("timeout", &self.timeout)
            .field("vars", &self.vars.len())
            .finish_non_exhaustive()
    }
}

/// Value a handler returns on success
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Payload recorded in the step result
    pub response: Option<serde_json::Value>,
    /// Variables to write into the run context
    pub exports: Vec<(String, String)>,
}

impl StepOutput {
    /// Output without payload or exports
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Output carrying a payload
    #[must_use]
    pub fn respond(response: serde_json::Value) -> Self {
        Self {
            response: Some(response),
            exports: Vec::new(),
        }
    }

    /// Adds an exported variable
    #[must_use]
    pub fn export(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.push((name.into(), value.into()));
        self
    }
}

/// Name and help text of a registered command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    /// Registry key
    pub name: String,
    /// Description
    pub help: String,
}

/// Registry of command handlers
#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Creates a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in command
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::commands::register_builtin(&mut registry);
        registry
    }

    /// Registers a handler under its own name, replacing any previous one
    pub fn register<T: CommandHandler + 'static>(&mut self, handler: T) {
        self.register_arc(Arc::new(handler));
    }

    /// Registers a shared handler
    pub fn register_arc(&mut self, handler: Arc<dyn CommandHandler>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::debug!(command = %name, "Replaced registered command");
        }
    }

    /// Gets a handler by key
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Checks if a key is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered keys in sorted order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Name and help of every command in sorted order
    #[must_use]
    pub fn describe(&self) -> Vec<CommandInfo> {
        self.handlers
            .values()
            .map(|h| CommandInfo {
                name: h.name().to_string(),
                help: h.help().to_string(),
            })
            .collect()
    }

    /// Number of registered commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}
