//! buildstep - run declarative YAML step pipelines
//!
//! ## Usage
//!
//! ```bash
//! # Run a pipeline with runtime arguments
//! buildstep deploy.yaml name=web desc="Web frontend"
//!
//! # Stop at the first failed step, pretty-print the results
//! buildstep deploy.yaml --on-failure abort --pretty
//!
//! # Show the available commands
//! buildstep listCommands
//! ```
//!
//! Exit codes: `0` every step succeeded, `1` usage or configuration error,
//! `2` at least one step failed.

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
