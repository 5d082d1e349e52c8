//! `system` and `time`: host information

use crate::executor::{parse_uptime, CommandHandler, StepContext, StepOutput};
use crate::pipeline::{Params, StepError};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Queries understood by `system`
pub const SYSTEM_QUERIES: [&str; 6] = ["hostname", "uptime", "os", "arch", "kernel", "timezone"];

/// Host facts gathered on request
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommand;

impl SystemCommand {
    fn queries(params: &Params) -> Result<Vec<String>, StepError> {
        let queries = match params {
            Params::Null => SYSTEM_QUERIES.iter().map(ToString::to_string).collect(),
            other => other.words("system")?,
        };
        if let Some(unknown) = queries.iter().find(|q| !SYSTEM_QUERIES.contains(&q.as_str())) {
            return Err(StepError::invalid_params(
                "system",
                format!("unknown query '{unknown}', expected one of {}", SYSTEM_QUERIES.join(", ")),
            ));
        }
        Ok(queries)
    }

    async fn query(name: &str, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        Ok(match name {
            "hostname" => json!(read_trimmed(ctx, "hostname", &[]).await?),
            "uptime" => json!(parse_uptime(&read_trimmed(ctx, "uptime", &[]).await?)),
            "kernel" => json!(read_trimmed(ctx, "uname", &["-r"]).await?),
            "os" => json!(os_name().await),
            "arch" => json!(std::env::consts::ARCH),
            "timezone" => json!(timezone_name().await),
            other => {
                return Err(StepError::invalid_params("system", format!("unknown query '{other}'")));
            }
        })
    }
}

async fn read_trimmed(ctx: &StepContext<'_>, program: &str, args: &[&str]) -> Result<String, StepError> {
    let invocation = ctx
        .invocation(program)
        .args(args.iter().copied())
        .timeout(Some(ctx.timeout.unwrap_or(Duration::from_secs(2))));
    let outcome = ctx.run(&invocation).await?.ensure_success()?;
    Ok(outcome.stdout_text().trim().to_string())
}

/// `PRETTY_NAME` from os-release, else the compile-time OS family
async fn os_name() -> String {
    let release = tokio::fs::read_to_string("/etc/os-release").await.unwrap_or_default();
    release
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}

/// `TZ`, `/etc/timezone`, else the local UTC offset
async fn timezone_name() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if !tz.trim().is_empty() {
            return tz;
        }
    }
    match tokio::fs::read_to_string("/etc/timezone").await {
        Ok(tz) if !tz.trim().is_empty() => tz.trim().to_string(),
        _ => Local::now().offset().to_string(),
    }
}

#[async_trait]
impl CommandHandler for SystemCommand {
    fn name(&self) -> &str {
        "system"
    }

    fn help(&self) -> &str {
        "Report host information (hostname, uptime, os, arch, kernel, timezone)"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let queries = Self::queries(params)?;
        let mut info = Map::new();
        for name in &queries {
            info.insert(name.clone(), Self::query(name, ctx).await?);
        }
        tracing::debug!(step = %ctx.step_name, queries = queries.len(), "Collected system info");
        Ok(StepOutput::respond(Value::Object(info)))
    }
}

/// Current time in several renderings
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeCommand;

impl TimeCommand {
    fn format(params: &Params) -> Result<Option<String>, StepError> {
        let format = match params {
            Params::Null => None,
            Params::Scalar(f) => Some(f.clone()),
            Params::Mapping(_) => params.get_str("format"),
            other => {
                return Err(StepError::invalid_params(
                    "time",
                    format!("expected a format string or mapping, got {}", other.kind()),
                ));
            }
        };
        match format {
            Some(f) if StrftimeItems::new(&f).any(|item| matches!(item, Item::Error)) => Err(
                StepError::invalid_params("time", format!("invalid time format '{f}'")),
            ),
            other => Ok(other.filter(|f| !f.is_empty())),
        }
    }

    /// Renders `now` with an optional strftime format
    #[must_use]
    pub fn render(now: DateTime<Utc>, format: Option<&str>) -> Value {
        let local = now.with_timezone(&Local);
        let mut out = json!({
            "utc": now.to_rfc3339(),
            "local": local.to_rfc3339(),
            "unix": now.timestamp(),
            "timezone": local.offset().to_string(),
        });
        if let Some(format) = format {
            out["formatted"] = json!(local.format(format).to_string());
        }
        out
    }
}

#[async_trait]
impl CommandHandler for TimeCommand {
    fn name(&self) -> &str {
        "time"
    }

    fn help(&self) -> &str {
        "Report the current time, optionally with a strftime format"
    }

    async fn execute(&self, params: &Params, _ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let format = Self::format(params)?;
        Ok(StepOutput::respond(Self::render(Utc::now(), format.as_deref())))
    }
}
