use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, RetryConfig};

/// Backoff schedule used between attempts against the primary endpoint.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicyKind {
    /// `(2^(n-1) - 1) * delay` before the n-th primary try.
    #[default]
    Exponential,
    /// No wait before the first try, `delay` before every later one.
    Fixed,
}

impl fmt::Display for RetryPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exponential => f.write_str("exponential"),
            Self::Fixed => f.write_str("fixed"),
        }
    }
}

impl FromStr for RetryPolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "fixed" => Ok(Self::Fixed),
            _ => Err(ConfigError::UnknownPolicy(s.to_owned())),
        }
    }
}

/// Raw retry options as supplied by a user or a config file.
///
/// A zero value means "use the default for the selected policy". Build a
/// [`RetryConfig`] with [`RetryOptions::validate`] before use.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Backoff schedule.
    pub policy: RetryPolicyKind,
    /// Total number of attempts, including the first one.
    pub max_tries: u32,
    /// Upper bound on one attempt's lifetime, in milliseconds.
    ///
    /// Large transfers need a budget that covers the whole payload.
    pub try_timeout_ms: u64,
    /// Base backoff delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Read-only replica host (`host` or `host:port`) for GET and HEAD retries.
    ///
    /// Reads served by the secondary may be stale.
    pub secondary_host: Option<String>,
}

impl RetryOptions {
    pub const ENV_POLICY: &'static str = "XFER_RETRY_POLICY";
    pub const ENV_MAX_TRIES: &'static str = "XFER_RETRY_MAX_TRIES";
    pub const ENV_TRY_TIMEOUT_MS: &'static str = "XFER_RETRY_TRY_TIMEOUT_MS";
    pub const ENV_DELAY_MS: &'static str = "XFER_RETRY_DELAY_MS";
    pub const ENV_MAX_DELAY_MS: &'static str = "XFER_RETRY_MAX_DELAY_MS";
    pub const ENV_SECONDARY_HOST: &'static str = "XFER_RETRY_SECONDARY_HOST";

    /// Reads options from `XFER_RETRY_*` environment variables.
    ///
    /// Unset variables keep their default. Returns an error when a variable
    /// is set to something that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RetryOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(policy) = lookup(Self::ENV_POLICY) {
            options.policy = policy.parse()?;
        }
        if let Some(value) = lookup(Self::ENV_MAX_TRIES) {
            options.max_tries = parse_number(Self::ENV_MAX_TRIES, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_TRY_TIMEOUT_MS) {
            options.try_timeout_ms = parse_number(Self::ENV_TRY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_DELAY_MS) {
            options.retry_delay_ms = parse_number(Self::ENV_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_MAX_DELAY_MS) {
            options.max_retry_delay_ms = parse_number(Self::ENV_MAX_DELAY_MS, &value)?;
        }
        if let Some(host) = lookup(Self::ENV_SECONDARY_HOST) {
            options.secondary_host = Some(host);
        }

        Ok(options)
    }

    /// Applies defaults and validates the options.
    pub fn validate(self) -> Result<RetryConfig, ConfigError> {
        RetryConfig::new(self)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}
