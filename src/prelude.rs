//! Prelude module for common imports

pub use crate::pipeline::{
    CommandResult, FailurePolicy, Params, Pipeline, PipelineBuilder, PipelineError,
    ProcessError, Step, StepError, StepState, Validate, ValidationError, Variable, VariableSet,
};

pub use crate::executor::{
    CommandHandler, CommandRegistry, OutputMode, ProcessExecutor, ProcessInvocation,
    ProcessOutcome, StepContext, StepDispatcher, StepOutput,
};

pub use crate::infrastructure::{Config, init_logging};
