//! Pipeline domain types and logic
//!
//! A [`Pipeline`] is an ordered list of [`Step`]s plus the variables and
//! argument names they may reference. Parameters are carried as [`Params`]
//! and filled in by the [`resolver`] right before a step is dispatched.

pub mod errors;
pub mod params;
pub mod pipeline_def;
pub mod resolver;
pub mod types;
pub mod variables;

pub use errors::{PipelineError, ProcessError, StepError, ValidationError};
pub use params::Params;
pub use pipeline_def::{Pipeline, PipelineBuilder, Step};
pub use resolver::{referenced_names, resolve, resolve_str};
pub use types::{CommandResult, FailurePolicy, StepState, Validate};
pub use variables::{Variable, VariableSet};
