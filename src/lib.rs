//! `xfer-retry` is the retry policy of a data-transfer client talking to a
//! replicated storage service.
//!
//! [`RetryPolicy::execute`] sends a [`TransferRequest`] up to
//! [`RetryConfig::max_tries`] times:
//! - waits between primary attempts on an exponential or fixed schedule
//!   with jitter,
//! - alternates GET/HEAD retries with a read-only secondary host when one is
//!   configured,
//! - bounds every attempt by a per-try timeout (also advertised to the
//!   server as the `timeout` query parameter) and by the caller's
//!   [`OperationContext`],
//! - retries network failures only, and drains discarded response bodies.

mod backoff;
mod classify;
mod config;
mod context;
mod error;
mod executor;
mod observer;
mod options;
mod policy;
mod request;
mod response;

pub use backoff::{
    delay_for, draw, primary_delay, raw_delay, secondary_delay, PRIMARY_JITTER_OFFSET,
    PRIMARY_JITTER_SPAN, SECONDARY_JITTER_OFFSET, SECONDARY_JITTER_SPAN, SECONDARY_PROBE_DELAY,
};
pub use classify::{classify, AbortReason, Action, Endpoint, RetryReason};
pub use config::{RetryConfig, SecondaryHost};
pub use context::{AttemptScope, OperationContext};
pub use error::{ConfigError, TransferError};
pub use executor::{AttemptExecutor, ReqwestExecutor};
#[cfg(feature = "tracing")]
pub use observer::TracingObserver;
pub use observer::{NoopObserver, RetryEvent, RetryObserver};
pub use options::{RetryOptions, RetryPolicyKind};
pub use policy::RetryPolicy;
pub use request::{BodySource, FileSection, RequestBody, TransferRequest, TIMEOUT_QUERY_PARAM};
pub use response::TransferResponse;

pub type Result<T> = std::result::Result<T, TransferError>;
