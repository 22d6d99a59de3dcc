use std::time::Duration;

use reqwest::{StatusCode, Url};

use crate::{Action, Endpoint, TransferError};

/// Diagnostic event emitted by the retry loop.
#[derive(Debug)]
pub enum RetryEvent<'a> {
    /// An attempt was scheduled and will start after `delay`.
    Scheduled {
        try_number: u32,
        endpoint: Endpoint,
        primary_try: u32,
        delay: Duration,
    },
    /// The prepared request is about to be handed to the executor.
    Dispatched {
        try_number: u32,
        url: &'a Url,
        timeout_secs: u64,
    },
    /// The attempt finished and was classified.
    Classified {
        try_number: u32,
        action: Action,
        status: Option<StatusCode>,
        error: Option<&'a TransferError>,
    },
}

/// Receives [`RetryEvent`]s. Must be cheap; it runs inline in the loop.
pub trait RetryObserver: Send + Sync {
    fn on_event(&self, event: &RetryEvent<'_>);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_event(&self, _event: &RetryEvent<'_>) {}
}

/// Forwards events to `tracing` at debug level.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl RetryObserver for TracingObserver {
    fn on_event(&self, event: &RetryEvent<'_>) {
        match event {
            RetryEvent::Scheduled {
                try_number,
                endpoint,
                primary_try,
                delay,
            } => tracing::debug!(
                try_number,
                primary_try,
                ?endpoint,
                delay_ms = delay.as_millis() as u64,
                "scheduling attempt"
            ),
            RetryEvent::Dispatched {
                try_number,
                url,
                timeout_secs,
            } => tracing::debug!(try_number, timeout_secs, %url, "dispatching attempt"),
            RetryEvent::Classified {
                try_number,
                action,
                status,
                error,
            } => tracing::debug!(
                try_number,
                %action,
                status = status.map(|s| s.as_u16()),
                error = error.map(tracing::field::display),
                "attempt classified"
            ),
        }
    }
}
