// Engine configuration, read from the environment

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SANDBOX_URL: &str = "http://localhost:2358";
pub const DEFAULT_LANGUAGES_PATH: &str = "config/languages.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// What to do when some units were affected by infrastructure failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialPolicy {
    /// Publish no grade; the attempt fails with a visible infrastructure error.
    #[default]
    Block,
    /// Grade over the units that completed and mark the attempt as partial.
    CompletedOnly,
}

impl FromStr for PartialPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(PartialPolicy::Block),
            "completed-only" | "completed_only" => Ok(PartialPolicy::CompletedOnly),
            other => Err(format!("expected block or completed-only, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingConfig {
    pub sandbox_url: String,
    /// Global cap on concurrent sandbox executions across all grading runs.
    pub worker_pool_size: usize,
    /// Wall-clock wait per unit, distinct from the sandbox CPU limit.
    pub unit_timeout: Duration,
    pub transport_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    pub max_poll: Duration,
    pub max_output_bytes: usize,
    pub partial_policy: PartialPolicy,
    pub redis_url: Option<String>,
    pub languages_path: String,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            sandbox_url: DEFAULT_SANDBOX_URL.to_string(),
            worker_pool_size: 4,
            unit_timeout: Duration::from_secs(20),
            transport_attempts: 3,
            backoff_base: Duration::from_millis(200),
            poll_interval: Duration::from_millis(300),
            max_poll: Duration::from_secs(20),
            max_output_bytes: 64 * 1024,
            partial_policy: PartialPolicy::Block,
            redis_url: None,
            languages_path: DEFAULT_LANGUAGES_PATH.to_string(),
        }
    }
}

impl GradingConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let worker_pool_size = parse_or(&lookup, "GRADER_WORKERS", defaults.worker_pool_size)?;
        if worker_pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "GRADER_WORKERS",
                value: "0".to_string(),
                reason: "pool size must be at least 1".to_string(),
            });
        }

        let transport_attempts = parse_or(&lookup, "GRADER_TRANSPORT_ATTEMPTS", defaults.transport_attempts)?.max(1);

        let partial_policy = match lookup("GRADER_PARTIAL_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "GRADER_PARTIAL_POLICY",
                value: raw.clone(),
                reason,
            })?,
            None => defaults.partial_policy,
        };

        Ok(Self {
            sandbox_url: lookup("JUDGE0_URL").unwrap_or(defaults.sandbox_url),
            worker_pool_size,
            unit_timeout: millis_or(&lookup, "GRADER_UNIT_TIMEOUT_MS", defaults.unit_timeout)?,
            transport_attempts,
            backoff_base: millis_or(&lookup, "GRADER_BACKOFF_MS", defaults.backoff_base)?,
            poll_interval: millis_or(&lookup, "GRADER_POLL_INTERVAL_MS", defaults.poll_interval)?,
            max_poll: millis_or(&lookup, "GRADER_MAX_POLL_MS", defaults.max_poll)?,
            max_output_bytes: parse_or(&lookup, "GRADER_MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
            partial_policy,
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            languages_path: lookup("GRADER_LANGUAGES").unwrap_or(defaults.languages_path),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = default.as_millis() as u64;
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}
