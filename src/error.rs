use std::{error::Error as StdError, io, time::Duration};

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// I/O failure reported by a custom executor or while reading a body.
    #[error("io error: {0}")]
    Io(io::Error),
    /// The attempt did not finish inside its per-try deadline.
    #[error("attempt timed out after {timeout:?}")]
    AttemptTimedOut { timeout: Duration },
    /// The caller's operation context was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// The caller's operation deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    /// The request body could not be rewound to its first byte.
    ///
    /// This is never retried: a body that cannot be replayed once will not
    /// replay on the next attempt either.
    #[error("failed to rewind request body: {0}")]
    Rewind(io::Error),
    /// Invalid retry configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Any other error raised by an executor.
    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync>),
}

impl TransferError {
    /// Wraps an arbitrary executor error.
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// Returns `true` when the failure originated in the network layer.
    ///
    /// This is deliberately broader than "timeout or temporary": resets,
    /// refused connections and broken pipes are all retryable.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Transport(err) => is_network_reqwest(err),
            Self::Io(err) => is_network_io(err),
            Self::AttemptTimedOut { .. } => true,
            Self::Other(err) => source_chain_is_network(err.as_ref()),
            Self::Cancelled | Self::DeadlineExceeded | Self::Rewind(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err)
    }
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Invalid retry configuration, reported when the configuration is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("retry delay ({delay_ms} ms) must not exceed max retry delay ({max_delay_ms} ms)")]
    RetryDelayExceedsMax { delay_ms: u64, max_delay_ms: u64 },
    #[error("retry delay and max retry delay must both be zero or both be non-zero")]
    MismatchedDelays,
    #[error("unknown retry policy '{0}', expected 'exponential' or 'fixed'")]
    UnknownPolicy(String),
    #[error("invalid secondary host '{0}', expected host[:port]")]
    InvalidSecondaryHost(String),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

fn is_network_reqwest(err: &reqwest::Error) -> bool {
    !(err.is_builder() || err.is_redirect() || err.is_decode() || err.is_status())
}

fn is_network_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::UnexpectedEof
    )
}

fn source_chain_is_network(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(err) = err.downcast_ref::<io::Error>() {
            if is_network_io(err) {
                return true;
            }
        }
        if let Some(err) = err.downcast_ref::<reqwest::Error>() {
            if is_network_reqwest(err) {
                return true;
            }
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{ConfigError, TransferError};

    #[test]
    fn io_connection_failures_are_network() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::TimedOut,
            io::ErrorKind::ConnectionRefused,
        ] {
            assert!(TransferError::Io(io::Error::new(kind, "net")).is_network());
        }
    }

    #[test]
    fn io_local_failures_are_not_network() {
        let err = TransferError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!err.is_network());
    }

    #[test]
    fn attempt_timeout_is_network_but_cancellation_is_not() {
        let timed_out = TransferError::AttemptTimedOut {
            timeout: std::time::Duration::from_secs(1),
        };
        assert!(timed_out.is_network());
        assert!(!TransferError::Cancelled.is_network());
        assert!(!TransferError::DeadlineExceeded.is_network());
    }

    #[test]
    fn other_error_is_network_when_source_chain_contains_io_error() {
        #[derive(Debug, thiserror::Error)]
        #[error("wrapped")]
        struct Wrapped(#[source] io::Error);

        let wrapped = TransferError::other(Wrapped(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset by peer",
        )));
        assert!(wrapped.is_network());
        assert!(!TransferError::other("unrelated failure").is_network());
    }

    #[test]
    fn rewind_and_config_errors_are_not_network() {
        let rewind = TransferError::Rewind(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!rewind.is_network());
        assert!(!TransferError::from(ConfigError::MismatchedDelays).is_network());
    }
}
