//! Engine configuration.
//!
//! Limits are supplied by the embedding adapter; nothing in the engine
//! hard-codes them. Defaults match the budgets the tool was tuned with.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding the execution quota.
pub const ENV_MAX_EXECUTIONS: &str = "RLM_MAX_EXECUTIONS";
/// Environment variable overriding the reset quota.
pub const ENV_MAX_RESETS: &str = "RLM_MAX_RESETS";
/// Environment variable overriding the timeout, in (fractional) seconds.
pub const ENV_TIMEOUT_SECS: &str = "RLM_TIMEOUT_SECS";
/// Environment variable overriding the output cap.
pub const ENV_MAX_OUTPUT_CHARS: &str = "RLM_MAX_OUTPUT_CHARS";
/// Environment variable selecting the reload policy.
pub const ENV_RELOAD_POLICY: &str = "RLM_RELOAD_POLICY";
/// Environment variable pointing at the Python interpreter.
pub const ENV_PYTHON: &str = "RLM_PYTHON";

/// Whether loading new content into an existing session costs a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Replacing content is free; only explicit resets are counted.
    #[default]
    Unmetered,
    /// Replacing an existing session consumes one reset from its quota.
    CountsAsReset,
}

impl FromStr for ReloadPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unmetered" => Ok(Self::Unmetered),
            "counts-as-reset" | "counts_as_reset" => Ok(Self::CountsAsReset),
            other => Err(Error::Config {
                key: ENV_RELOAD_POLICY.to_string(),
                message: format!("unknown reload policy '{other}'"),
            }),
        }
    }
}

/// Configuration for the execution engine and session registry.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executions allowed per session before further runs are refused.
    pub max_executions: u32,

    /// Explicit resets allowed per session identifier.
    pub max_resets: u32,

    /// Wall-clock budget for one snippet.
    pub execution_timeout: Duration,

    /// Maximum characters returned in `ExecutionResult::output`.
    pub max_output_chars: usize,

    /// How long a worker gets to exit after SIGTERM.
    pub terminate_grace: Duration,

    /// How long to wait for the process to be reaped after SIGKILL.
    pub kill_grace: Duration,

    /// Whether `replace` consumes the reset quota.
    pub reload_policy: ReloadPolicy,

    /// Explicit interpreter path. Discovered on PATH when `None`.
    pub interpreter: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_executions: 10,
            max_resets: 2,
            execution_timeout: Duration::from_secs(10),
            max_output_chars: 20_000,
            terminate_grace: Duration::from_secs(2),
            kill_grace: Duration::from_secs(1),
            reload_policy: ReloadPolicy::Unmetered,
            interpreter: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `RLM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by the `RLM_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_EXECUTIONS) {
            config.max_executions = parse_number(ENV_MAX_EXECUTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RESETS) {
            config.max_resets = parse_number(ENV_MAX_RESETS, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            config.execution_timeout = parse_seconds(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_OUTPUT_CHARS) {
            config.max_output_chars = parse_number(ENV_MAX_OUTPUT_CHARS, &value)?;
        }
        if let Some(value) = lookup(ENV_RELOAD_POLICY) {
            config.reload_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_PYTHON).filter(|v| !v.trim().is_empty()) {
            config.interpreter = Some(PathBuf::from(value));
        }

        Ok(config)
    }

    /// Set the execution quota.
    pub fn with_max_executions(mut self, max: u32) -> Self {
        self.max_executions = max;
        self
    }

    /// Set the reset quota.
    pub fn with_max_resets(mut self, max: u32) -> Self {
        self.max_resets = max;
        self
    }

    /// Set the per-snippet timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Set the output cap.
    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    /// Set the reload policy.
    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }

    /// Set the interpreter path.
    pub fn with_interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(path.into());
        self
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::Config {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

/// Parse a positive, finite number of seconds.
pub fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_number(key, value)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::Config {
            key: key.to_string(),
            message: format!("'{value}' is not a positive number of seconds"),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| Error::Config {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_executions, 10);
        assert_eq!(config.max_resets, 2);
        assert_eq!(config.execution_timeout, Duration::from_secs(10));
        assert_eq!(config.max_output_chars, 20_000);
        assert_eq!(config.reload_policy, ReloadPolicy::Unmetered);
        assert!(config.interpreter.is_none());
    }

    #[test]
    fn test_overlay_from_lookup() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_EXECUTIONS, "25"),
            (ENV_MAX_RESETS, " 0 "),
            (ENV_TIMEOUT_SECS, "2.5"),
            (ENV_MAX_OUTPUT_CHARS, "500"),
            (ENV_RELOAD_POLICY, "counts-as-reset"),
            (ENV_PYTHON, "/opt/python/bin/python3"),
        ]))
        .unwrap();

        assert_eq!(config.max_executions, 25);
        assert_eq!(config.max_resets, 0);
        assert_eq!(config.execution_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_output_chars, 500);
        assert_eq!(config.reload_policy, ReloadPolicy::CountsAsReset);
        assert_eq!(
            config.interpreter,
            Some(PathBuf::from("/opt/python/bin/python3"))
        );
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_MAX_EXECUTIONS, "ten")])).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == ENV_MAX_EXECUTIONS));

        assert!(EngineConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "-1")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "inf")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_RELOAD_POLICY, "sometimes")])).is_err());
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let err = parse_seconds(ENV_TIMEOUT_SECS, "1e20").unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == ENV_TIMEOUT_SECS));
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "1e20")])).is_err());
    }

    #[test]
    fn test_blank_python_is_ignored() {
        let config = EngineConfig::from_lookup(lookup(&[(ENV_PYTHON, "  ")])).unwrap();
        assert!(config.interpreter.is_none());
    }
}
