//! Command-line front end
//!
//! `buildstep <listCommands | pipeline.yaml> [key=value ...]` loads a
//! pipeline, runs it through the step dispatcher and prints the results as
//! JSON on stdout.

pub mod completions;

use anyhow::{Context, Result};
use buildstep::executor::{CommandRegistry, StepDispatcher};
use buildstep::infrastructure::{Config, init_logging};
use buildstep::pipeline::{CommandResult, FailurePolicy, Pipeline};
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use std::collections::HashMap;
use std::io::Write;
use std::process::ExitCode;

/// Target that prints the command registry instead of running a pipeline
const LIST_COMMANDS: &str = "listCommands";

/// Exit code when at least one step failed
const EXIT_STEP_FAILED: u8 = 2;

/// CLI arguments for buildstep
#[derive(Parser, Debug)]
#[command(name = "buildstep")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline file to run, or `listCommands`
    #[arg(required_unless_present = "completions")]
    target: Option<String>,

    /// Runtime arguments as key=value
    #[arg(value_name = "KEY=VALUE")]
    args: Vec<String>,

    /// What to do after a failed step (overrides the pipeline)
    #[arg(long, value_enum)]
    on_failure: Option<FailurePolicyArg>,

    /// Timeout in seconds for steps without their own
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Pretty-print the result JSON
    #[arg(long)]
    pretty: bool,

    /// Print a shell completion script and exit
    #[arg(long, value_enum, hide = true)]
    completions: Option<Shell>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FailurePolicyArg {
    Continue,
    Abort,
}

impl From<FailurePolicyArg> for FailurePolicy {
    fn from(arg: FailurePolicyArg) -> Self {
        match arg {
            FailurePolicyArg::Continue => FailurePolicy::Continue,
            FailurePolicyArg::Abort => FailurePolicy::Abort,
        }
    }
}

impl Args {
    /// Overlays the flags onto `config`
    fn apply(&self, mut config: Config) -> Config {
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(policy) = self.on_failure {
            config.on_failure = Some(policy.into());
        }
        if let Some(secs) = self.timeout {
            config.default_timeout_secs = (secs > 0).then_some(secs);
        }
        config.pretty |= self.pretty;
        config
    }
}

/// Builds the clap command, used for completions
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Splits `key=value` tokens into runtime arguments
///
/// Tokens without `=` or with an empty key are skipped with a warning.
/// Later tokens win over earlier ones.
pub fn parse_run_args(tokens: &[String]) -> HashMap<String, String> {
    let mut args = HashMap::new();
    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                args.insert(key.trim().to_string(), value.to_string());
            }
            _ => tracing::warn!(token = %token, "Ignoring argument without key=value form"),
        }
    }
    args
}

/// Runs the CLI and maps the outcome to a process exit code
pub fn run() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return Ok(if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    if let Some(shell) = args.completions {
        print!("{}", completions::generate_completions(shell)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = args.apply(Config::from_env()?);
    init_logging(&config.log_level);

    let target = args.target.as_deref().context("missing pipeline file")?;
    if target == LIST_COMMANDS {
        let registry = CommandRegistry::builtin();
        let mut out = std::io::stdout().lock();
        for info in registry.describe() {
            writeln!(out, "{} - {}", info.name, info.help)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = Pipeline::from_file(target)
        .with_context(|| format!("Failed to load pipeline: {target}"))?;
    let run_args = parse_run_args(&args.args);

    let dispatcher = StepDispatcher::default()
        .with_policy(config.on_failure)
        .with_default_timeout(config.default_timeout());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let results = runtime.block_on(dispatcher.run(&pipeline, &run_args));

    let rendered = render_results(&results, config.pretty)?;
    println!("{rendered}");

    Ok(exit_code(&results))
}

fn render_results(results: &[CommandResult], pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(results)
    } else {
        serde_json::to_string(results)
    };
    rendered.context("Failed to encode results")
}

fn exit_code(results: &[CommandResult]) -> ExitCode {
    if results.iter().all(CommandResult::is_success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_STEP_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_run_args() {
        let args = parse_run_args(&tokens(&["name=web", "desc=a=b", "junk", "=x", "name=api"]));
        assert_eq!(args.len(), 2);
        assert_eq!(args["name"], "api");
        assert_eq!(args["desc"], "a=b");
    }

    #[test]
    fn test_parse_empty_value() {
        let args = parse_run_args(&tokens(&["flag="]));
        assert_eq!(args["flag"], "");
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = Args::try_parse_from([
            "buildstep",
            "deploy.yaml",
            "name=web",
            "--on-failure",
            "abort",
            "--timeout",
            "30",
            "--pretty",
        ])
        .unwrap();
        assert_eq!(args.target.as_deref(), Some("deploy.yaml"));
        assert_eq!(args.args, vec!["name=web"]);

        let config = args.apply(Config::default());
        assert_eq!(config.on_failure, Some(FailurePolicy::Abort));
        assert_eq!(config.default_timeout_secs, Some(30));
        assert!(config.pretty);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_requires_target() {
        assert!(Args::try_parse_from(["buildstep"]).is_err());
        assert!(Args::try_parse_from(["buildstep", "--completions", "bash"]).is_ok());
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        assert!(Args::try_parse_from(["buildstep", "p.yaml", "--on-failure", "retry"]).is_err());
    }

    #[test]
    fn test_render_results() {
        let results = vec![CommandResult::succeeded("a", "bash", 1, Some(json!({"exitCode": 0})))];
        let compact = render_results(&results, false).unwrap();
        assert!(!compact.contains('\n'));
        let pretty = render_results(&results, true).unwrap();
        assert!(pretty.contains("\n  "));
        assert_eq!(exit_code(&results), ExitCode::SUCCESS);

        let failed = vec![CommandResult::failed("b", "nope", 1, "unknown command: nope")];
        assert_eq!(exit_code(&failed), ExitCode::from(EXIT_STEP_FAILED));
    }
}
