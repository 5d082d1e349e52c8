//! Step execution layer
//!
//! The [`StepDispatcher`] drives a pipeline through the [`CommandRegistry`];
//! handlers reach external programs through the [`ProcessExecutor`] and turn
//! their text output into records with the parsers.

mod dispatcher;
mod parsers;
mod process;
mod registry;

pub use dispatcher::{RunContext, StepDispatcher};
pub use parsers::{
    ServiceStatus, UptimeInfo, humanize_since, parse_is_enabled, parse_restart_count,
    parse_systemd_status, parse_systemd_status_at, parse_uptime,
};
pub use process::{Completion, OutputMode, ProcessExecutor, ProcessInvocation, ProcessOutcome};
pub use registry::{CommandHandler, CommandInfo, CommandRegistry, StepContext, StepOutput};
