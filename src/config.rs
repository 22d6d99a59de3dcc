use std::time::Duration;

use reqwest::Url;

use crate::{ConfigError, RetryOptions, RetryPolicyKind};

const DEFAULT_MAX_TRIES: u32 = 4;
const DEFAULT_TRY_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_EXPONENTIAL_DELAY: Duration = Duration::from_secs(4);
const DEFAULT_FIXED_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Validated, immutable retry configuration.
///
/// Safe to share between concurrent operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryConfig {
    policy: RetryPolicyKind,
    max_tries: u32,
    try_timeout: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
    secondary_host: Option<SecondaryHost>,
}

impl RetryConfig {
    /// Validates `options` and fills unset (zero) values with policy defaults.
    pub fn new(options: RetryOptions) -> Result<Self, ConfigError> {
        let RetryOptions {
            policy,
            max_tries,
            try_timeout_ms,
            retry_delay_ms,
            max_retry_delay_ms,
            secondary_host,
        } = options;

        if retry_delay_ms > max_retry_delay_ms {
            return Err(ConfigError::RetryDelayExceedsMax {
                delay_ms: retry_delay_ms,
                max_delay_ms: max_retry_delay_ms,
            });
        }
        if (retry_delay_ms == 0) != (max_retry_delay_ms == 0) {
            return Err(ConfigError::MismatchedDelays);
        }

        let secondary_host = match secondary_host.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(SecondaryHost::parse(raw)?),
        };

        let default_delay = match policy {
            RetryPolicyKind::Exponential => DEFAULT_EXPONENTIAL_DELAY,
            RetryPolicyKind::Fixed => DEFAULT_FIXED_DELAY,
        };

        Ok(Self {
            policy,
            max_tries: if max_tries == 0 {
                DEFAULT_MAX_TRIES
            } else {
                max_tries
            },
            try_timeout: millis_or(try_timeout_ms, DEFAULT_TRY_TIMEOUT),
            retry_delay: millis_or(retry_delay_ms, default_delay),
            max_retry_delay: millis_or(max_retry_delay_ms, DEFAULT_MAX_RETRY_DELAY),
            secondary_host,
        })
    }

    /// Backoff schedule between primary attempts.
    pub fn policy(&self) -> RetryPolicyKind {
        self.policy
    }

    /// Total attempts allowed per operation, always at least 1.
    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Upper bound on a single attempt.
    pub fn try_timeout(&self) -> Duration {
        self.try_timeout
    }

    /// Base delay the backoff schedule scales.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Cap on any primary delay after jitter.
    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// Read-only replica for GET and HEAD retries, if configured.
    pub fn secondary_host(&self) -> Option<&SecondaryHost> {
        self.secondary_host.as_ref()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicyKind::Exponential,
            max_tries: DEFAULT_MAX_TRIES,
            try_timeout: DEFAULT_TRY_TIMEOUT,
            retry_delay: DEFAULT_EXPONENTIAL_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            secondary_host: None,
        }
    }
}

impl TryFrom<RetryOptions> for RetryConfig {
    type Error = ConfigError;

    fn try_from(options: RetryOptions) -> Result<Self, Self::Error> {
        Self::new(options)
    }
}

fn millis_or(value_ms: u64, default: Duration) -> Duration {
    if value_ms == 0 {
        default
    } else {
        Duration::from_millis(value_ms)
    }
}

/// Host (and optional port) of the read-only secondary endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecondaryHost {
    host: String,
    port: Option<u16>,
}

impl SecondaryHost {
    /// Parses `host` or `host:port`. Schemes, paths and credentials are rejected.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSecondaryHost(raw.to_owned());

        if raw.is_empty() || raw.contains(['/', '?', '#', '@']) {
            return Err(invalid());
        }
        let url = Url::parse(&format!("http://{raw}/")).map_err(|_| invalid())?;
        let host = url.host_str().ok_or_else(invalid)?.to_owned();

        Ok(Self {
            host,
            port: url.port(),
        })
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port; `None` keeps the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Points `url` at this host, keeping its scheme, path and query.
    pub(crate) fn apply(&self, url: &mut Url) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidSecondaryHost(self.to_string());
        url.set_host(Some(&self.host)).map_err(|_| invalid())?;
        url.set_port(self.port).map_err(|_| invalid())
    }
}

impl std::fmt::Display for SecondaryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}
