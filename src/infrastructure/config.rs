//! Configuration management
//!
//! Defaults, overlaid by `BUILDSTEP_*` environment variables, overlaid by
//! command-line flags.

use crate::pipeline::{FailurePolicy, PipelineError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable for the log level
pub const ENV_LOG_LEVEL: &str = "BUILDSTEP_LOG_LEVEL";
/// Environment variable for the failure policy override
pub const ENV_ON_FAILURE: &str = "BUILDSTEP_ON_FAILURE";
/// Environment variable for the default step timeout in seconds
pub const ENV_TIMEOUT: &str = "BUILDSTEP_TIMEOUT";

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level
    pub log_level: String,
    /// Failure policy override; `None` defers to the pipeline
    pub on_failure: Option<FailurePolicy>,
    /// Timeout in seconds for steps without their own
    pub default_timeout_secs: Option<u64>,
    /// Pretty-print the result JSON
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            on_failure: None,
            default_timeout_secs: None,
            pretty: false,
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for unparsable values.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = value(ENV_LOG_LEVEL) {
            config.log_level = level.trim().to_string();
        }
        if let Some(policy) = value(ENV_ON_FAILURE) {
            config.on_failure = Some(
                policy
                    .parse()
                    .map_err(|e| PipelineError::Config(format!("{ENV_ON_FAILURE}: {e}")))?,
            );
        }
        if let Some(secs) = value(ENV_TIMEOUT) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PipelineError::Config(format!("{ENV_TIMEOUT}: '{secs}' is not a number of seconds"))
            })?;
            config.default_timeout_secs = (secs > 0).then_some(secs);
        }
        Ok(config)
    }

    /// Default step timeout
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.default_timeout(), None);
    }

    #[test]
    fn test_env_overlay() {
        let config = Config::from_lookup(lookup(&[
            (ENV_LOG_LEVEL, "debug"),
            (ENV_ON_FAILURE, "abort"),
            (ENV_TIMEOUT, "30"),
        ]))
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.on_failure, Some(FailurePolicy::Abort));
        assert_eq!(config.default_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config = Config::from_lookup(lookup(&[(ENV_TIMEOUT, "0")])).unwrap();
        assert_eq!(config.default_timeout_secs, None);
    }

    #[test]
    fn test_bad_values() {
        assert!(Config::from_lookup(lookup(&[(ENV_TIMEOUT, "soon")])).is_err());
        let err = Config::from_lookup(lookup(&[(ENV_ON_FAILURE, "retry")])).unwrap_err();
        assert!(err.to_string().contains(ENV_ON_FAILURE));
    }
}
