//! # buildstep - declarative step pipelines
//!
//! buildstep reads a YAML pipeline of named steps, resolves `${name}`
//! references against runtime arguments and declared variables, and runs
//! each step through a registry of commands: shell lines, systemd control,
//! unit file installation, HTTP calls, GitHub release downloads, file
//! operations and host information. Every step yields a [`CommandResult`];
//! a failed step never stops the runner unless the failure policy says so.
//!
//! ## Quick Start
//!
//! ```no_run
//! use buildstep::prelude::*;
//! use std::collections::HashMap;
//!
//! # async fn demo() -> Result<(), PipelineError> {
//! let pipeline = Pipeline::from_yaml_str(
//!     r#"
//! name: hello
//! vars:
//!   - {name: who, value: world}
//! steps:
//!   - {name: greet, cmd: bash, params: "echo hello ${who}"}
//! "#,
//! )?;
//! let results = StepDispatcher::default().run(&pipeline, &HashMap::new()).await;
//! assert!(results.iter().all(CommandResult::is_success));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod commands;
pub mod executor;
pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{
    CommandHandler, CommandRegistry, ProcessExecutor, ProcessInvocation, ProcessOutcome,
    ServiceStatus, StepContext, StepDispatcher, StepOutput, UptimeInfo,
};
pub use infrastructure::{Config, init_logging};
pub use pipeline::{
    CommandResult, FailurePolicy, Params, Pipeline, PipelineBuilder, PipelineError, Step,
    StepError, StepState, Variable, VariableSet,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
