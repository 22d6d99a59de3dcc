use std::{fmt, sync::Arc, time::Duration};

use crate::{
    backoff,
    classify::{classify, AbortReason, Action, Endpoint, RetryReason},
    response::drain,
    AttemptExecutor, NoopObserver, OperationContext, ReqwestExecutor, Result, RetryConfig,
    RetryEvent, RetryObserver, TransferRequest, TransferResponse,
};

/// Retries HTTP requests against a primary endpoint and, for reads, an
/// optional read-only secondary.
///
/// Cheap to clone; clones share the configuration, executor and observer.
pub struct RetryPolicy<E = ReqwestExecutor> {
    config: Arc<RetryConfig>,
    executor: Arc<E>,
    observer: Arc<dyn RetryObserver>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            executor: Arc::clone(&self.executor),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy<ReqwestExecutor> {
    /// Creates a policy that sends attempts through a default `reqwest` client.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_executor(config, ReqwestExecutor::default())
    }

    /// Creates a policy that sends attempts through `http`.
    pub fn from_client(config: RetryConfig, http: reqwest::Client) -> Self {
        Self::with_executor(config, ReqwestExecutor::new(http))
    }
}

impl<E: AttemptExecutor> RetryPolicy<E> {
    /// Creates a policy that sends attempts through `executor`.
    pub fn with_executor(config: RetryConfig, executor: E) -> Self {
        Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Installs a diagnostic observer. The default discards all events.
    pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Validated configuration in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executor that sends each attempt.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Sends `request`, retrying as configured, and returns the outcome of
    /// the last attempt made.
    ///
    /// At most `max_tries` attempts are made. Bodies of responses that are
    /// retried are drained before the next attempt starts. A returned
    /// response keeps its attempt's deadline for body reads.
    pub async fn execute(
        &self,
        ctx: &OperationContext,
        request: TransferRequest,
    ) -> Result<TransferResponse> {
        let config = &*self.config;
        let mut state = AttemptState::new(config, &request);
        let mut try_number = 0u32;

        loop {
            try_number += 1;

            let endpoint = state.next_endpoint(try_number);
            let delay = match endpoint {
                Endpoint::Primary => {
                    backoff::delay_for(config, state.primary_tries, backoff::draw())
                }
                Endpoint::Secondary => backoff::secondary_delay(backoff::draw()),
            };
            self.observer.on_event(&RetryEvent::Scheduled {
                try_number,
                endpoint,
                primary_try: state.primary_tries,
                delay,
            });
            ctx.sleep(delay).await;

            let mut prepared = request.clone();
            prepared.rewind_body()?;
            if endpoint == Endpoint::Secondary {
                if let Some(host) = config.secondary_host() {
                    host.apply(prepared.url_mut())?;
                }
            }

            let (timeout_secs, timeout) = attempt_timeout(config.try_timeout(), ctx.remaining());
            prepared.set_timeout_hint(timeout_secs + 1);
            self.observer.on_event(&RetryEvent::Dispatched {
                try_number,
                url: prepared.url(),
                timeout_secs,
            });

            let scope = ctx.attempt_scope(timeout);
            let outcome = scope.bound(self.executor.execute(&scope, prepared)).await;

            let action = classify(ctx.is_done(), endpoint, &outcome);
            self.observer.on_event(&RetryEvent::Classified {
                try_number,
                action,
                status: outcome.as_ref().ok().map(reqwest::Response::status),
                error: outcome.as_ref().err(),
            });

            if action == Action::Retry(RetryReason::SecondaryNotFound) {
                state.consider_secondary = false;
            }

            if !action.is_retry() || try_number >= config.max_tries() {
                return match outcome {
                    Ok(response) => Ok(TransferResponse::new(
                        response, scope, endpoint, try_number,
                    )),
                    Err(err) => {
                        drop(scope);
                        if action == Action::Abort(AbortReason::OperationExpired) {
                            Err(ctx.error().unwrap_or(err))
                        } else {
                            Err(err)
                        }
                    }
                };
            }

            if let Ok(response) = outcome {
                drain(response, &scope).await;
            }
            drop(scope);
        }
    }
}

/// Per-operation retry bookkeeping.
#[derive(Debug)]
struct AttemptState {
    primary_tries: u32,
    consider_secondary: bool,
}

impl AttemptState {
    fn new(config: &RetryConfig, request: &TransferRequest) -> Self {
        Self {
            primary_tries: 0,
            consider_secondary: request.is_idempotent_read() && config.secondary_host().is_some(),
        }
    }

    /// Odd tries go to the primary, even ones to the secondary while it is
    /// still in play.
    fn next_endpoint(&mut self, try_number: u32) -> Endpoint {
        if self.consider_secondary && try_number % 2 == 0 {
            Endpoint::Secondary
        } else {
            self.primary_tries += 1;
            Endpoint::Primary
        }
    }
}

/// Returns the whole-second timeout advertised to the server and the exact
/// client-side budget for one attempt.
///
/// Both are capped by the time left on the caller's deadline.
fn attempt_timeout(try_timeout: Duration, remaining: Option<Duration>) -> (u64, Duration) {
    match remaining {
        Some(remaining) => (
            try_timeout.as_secs().min(remaining.as_secs()),
            try_timeout.min(remaining),
        ),
        None => (try_timeout.as_secs(), try_timeout),
    }
}
