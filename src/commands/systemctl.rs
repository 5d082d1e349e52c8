//! `systemctl` and `systemctl-file`: systemd unit management

use super::{expect_mapping, required};
use crate::executor::{
    parse_is_enabled, parse_restart_count, parse_systemd_status, CommandHandler, Completion,
    OutputMode, ProcessExecutor, ProcessInvocation, ServiceStatus, StepContext, StepOutput,
};
use crate::pipeline::{Params, ProcessError, StepError};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory units are installed into when no location is given
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Queries and drives systemd through the `systemctl` binary
#[derive(Debug, Clone)]
pub struct ServiceManager {
    program: String,
    executor: ProcessExecutor,
    timeout: Option<Duration>,
}

impl ServiceManager {
    /// Creates a manager using `systemctl` from `PATH`
    #[must_use]
    pub fn new(executor: ProcessExecutor, timeout: Option<Duration>) -> Self {
        Self {
            program: "systemctl".to_string(),
            executor,
            timeout,
        }
    }

    /// Uses another binary in place of `systemctl`
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn invocation<I, S>(&self, args: I) -> ProcessInvocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessInvocation::new(self.program.clone())
            .args(args)
            .timeout(self.timeout)
    }

    /// Runs `systemctl status`, `show -p NRestarts` and `is-enabled` for `unit`
    ///
    /// `systemctl status` exits non-zero for stopped units, so its exit code
    /// is ignored and the text is parsed regardless. The restart count and
    /// enabled flag stay at their defaults when their queries fail.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if `systemctl status` cannot be started or
    /// times out.
    pub async fn status(&self, unit: &str) -> Result<ServiceStatus, ProcessError> {
        let outcome = self
            .executor
            .invoke(&self.invocation(["status", unit]))
            .await?;
        if outcome.completion != Completion::Completed {
            outcome.ensure_success()?;
            return Ok(ServiceStatus::default());
        }
        let mut status = parse_systemd_status(&outcome.stdout_text());

        match self.restart_count(unit).await {
            Ok(count) => status.restart_count = count,
            Err(err) => tracing::debug!(unit, error = %err, "Restart count unavailable"),
        }
        match self.is_enabled(unit).await {
            Ok(enabled) => status.is_enabled = enabled,
            Err(err) => tracing::debug!(unit, error = %err, "Enabled state unavailable"),
        }
        Ok(status)
    }

    /// Reads `NRestarts` for `unit`
    ///
    /// # Errors
    ///
    /// Returns [`StepError`] if the query fails or its output is malformed.
    pub async fn restart_count(&self, unit: &str) -> Result<u32, StepError> {
        let outcome = self
            .executor
            .invoke(&self.invocation(["show", "-p", "NRestarts", unit]))
            .await?
            .ensure_success()?;
        parse_restart_count(&outcome.stdout_text())
    }

    /// Reports whether `unit` is enabled at boot
    ///
    /// `is-enabled` exits non-zero for disabled units, which reads as `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if the query cannot be started or times out.
    pub async fn is_enabled(&self, unit: &str) -> Result<bool, ProcessError> {
        let outcome = self
            .executor
            .invoke(&self.invocation(["is-enabled", unit]))
            .await?;
        if outcome.completion != Completion::Completed {
            outcome.ensure_success()?;
            return Ok(false);
        }
        Ok(parse_is_enabled(&outcome.stdout_text()))
    }

    /// Runs any other verb with output forwarded to the terminal
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] unless `systemctl` exits successfully.
    pub async fn command(&self, words: &[String]) -> Result<Option<i32>, ProcessError> {
        let outcome = self
            .executor
            .invoke(&self.invocation(words).mode(OutputMode::Forward))
            .await?
            .ensure_success()?;
        Ok(outcome.exit_code)
    }
}

/// `systemctl <verb> [unit...]`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemctlCommand;

#[async_trait]
impl CommandHandler for SystemctlCommand {
    fn name(&self) -> &str {
        "systemctl"
    }

    fn help(&self) -> &str {
        "Manage systemd services"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let words = params.words(self.name())?;
        let manager = ServiceManager::new(*ctx.executor, ctx.timeout);

        match words.as_slice() {
            [] => Err(StepError::invalid_params(self.name(), "missing verb")),
            [verb, unit] if verb == "status" => {
                tracing::info!(step = %ctx.step_name, unit = %unit, "Querying service status");
                let status = manager.status(unit).await?;
                Ok(StepOutput::respond(serde_json::to_value(status).map_err(|e| {
                    StepError::MalformedOutput(format!("cannot encode status: {e}"))
                })?))
            }
            [verb, ..] => {
                tracing::info!(step = %ctx.step_name, verb = %verb, "Running systemctl");
                let exit_code = manager.command(&words).await?;
                Ok(StepOutput::respond(json!({ "exitCode": exit_code })))
            }
        }
    }
}

/// A rendered systemd service unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    /// Unit name without the `.service` suffix
    pub name: String,
    /// `Description=`
    pub description: String,
    /// `ExecStart=`
    pub exec_start: String,
    /// `Restart=`
    pub restart: String,
    /// `User=`
    pub user: Option<String>,
    /// `WorkingDirectory=`
    pub working_directory: Option<String>,
    /// `After=`
    pub after: Option<String>,
    /// `WantedBy=`
    pub wanted_by: String,
}

impl UnitFile {
    /// Reads a unit description from `systemctl-file` parameters
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidParams`] without `name` or `ExecStart`.
    pub fn from_params(params: &Params) -> Result<Self, StepError> {
        const CMD: &str = "systemctl-file";
        expect_mapping(params, CMD)?;
        let name = required(params, "name", CMD)?.trim().to_string();
        let name = name.strip_suffix(".service").unwrap_or(&name).to_string();
        if name.contains('/') {
            return Err(StepError::invalid_params(CMD, format!("unit name '{name}' contains '/'")));
        }
        let optional = |key: &str| params.get_str(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            description: optional("description").unwrap_or_else(|| name.clone()),
            exec_start: required(params, "ExecStart", CMD)?,
            restart: optional("Restart").unwrap_or_else(|| "always".to_string()),
            user: optional("User"),
            working_directory: optional("WorkingDirectory"),
            after: optional("After"),
            wanted_by: optional("WantedBy").unwrap_or_else(|| "multi-user.target".to_string()),
            name,
        })
    }

    /// File name, e.g. `driver.service`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.service", self.name)
    }

    /// Unit file contents
    #[must_use]
    pub fn render(&self) -> String {
        let mut unit = format!("[Unit]\nDescription={}\n", self.description);
        if let Some(after) = &self.after {
            unit.push_str(&format!("After={after}\n"));
        }
        unit.push_str(&format!(
            "\n[Service]\nExecStart={}\nRestart={}\n",
            self.exec_start, self.restart
        ));
        if let Some(user) = &self.user {
            unit.push_str(&format!("User={user}\n"));
        }
        if let Some(dir) = &self.working_directory {
            unit.push_str(&format!("WorkingDirectory={dir}\n"));
        }
        unit.push_str(&format!("\n[Install]\nWantedBy={}\n", self.wanted_by));
        unit
    }

    /// Writes the unit into `tmp` and moves it into `location`
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Io`] if either directory is unusable.
    pub async fn install(&self, tmp: &Path, location: &Path) -> Result<PathBuf, StepError> {
        let staged = tmp.join(self.file_name());
        let target = location.join(self.file_name());
        tokio::fs::write(&staged, self.render())
            .await
            .map_err(|e| StepError::Io(format!("cannot write {}: {e}", staged.display())))?;

        if let Err(err) = tokio::fs::rename(&staged, &target).await {
            // rename fails across filesystems, e.g. /tmp on tmpfs
            tracing::debug!(error = %err, "Rename failed, copying unit instead");
            tokio::fs::copy(&staged, &target)
                .await
                .map_err(|e| StepError::Io(format!("cannot move unit to {}: {e}", target.display())))?;
            tokio::fs::remove_file(&staged).await?;
        }
        Ok(target)
    }
}

/// `systemctl-file`: render a service unit and install it
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemctlFileCommand;

#[async_trait]
impl CommandHandler for SystemctlFileCommand {
    fn name(&self) -> &str {
        "systemctl-file"
    }

    fn help(&self) -> &str {
        "Generate a systemd service file"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let unit = UnitFile::from_params(params)?;
        let tmp = params
            .get_str("tmp")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(std::env::temp_dir, PathBuf::from);
        let location = params
            .get_str("location")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_UNIT_DIR), PathBuf::from);

        let path = unit.install(&tmp, &location).await?;
        tracing::info!(step = %ctx.step_name, unit = %unit.name, path = %path.display(), "Installed unit file");
        Ok(StepOutput::respond(json!({
            "unit": unit.file_name(),
            "path": path.display().to_string(),
        })))
    }
}
