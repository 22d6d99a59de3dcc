use std::{future::Future, time::Duration};

use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::{Result, TransferError};

// Stand-in for "no deadline" when a timeout overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Cancellation and deadline for one retried operation.
///
/// Cancelling the context (or reaching its deadline) stops the in-flight
/// attempt and prevents any further ones.
#[derive(Clone, Debug, Default)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token, e.g. one shared with a shutdown signal.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Ends the operation at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Ends the operation `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(deadline_after(Instant::now(), timeout))
    }

    /// Deadline of the operation, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the operation and any attempt in flight.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The error describing why the context is done, if it is.
    pub fn error(&self) -> Option<TransferError> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(TransferError::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(TransferError::Cancelled)
        } else {
            None
        }
    }

    /// Time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Sleeps for `delay`, returning early if the context finishes first.
    pub(crate) async fn sleep(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let deadline = self.deadline;
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = sleep(delay) => {}
            _ = async move {
                match deadline {
                    Some(d) => sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            } => {}
        }
    }

    /// Derives a per-attempt scope that ends after `timeout`, on cancellation
    /// of this context, or when dropped.
    pub(crate) fn attempt_scope(&self, timeout: Duration) -> AttemptScope {
        let mut deadline = deadline_after(Instant::now(), timeout);
        if let Some(outer) = self.deadline {
            deadline = deadline.min(outer);
        }
        AttemptScope {
            token: self.token.child_token(),
            deadline,
            timeout,
        }
    }
}

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Cancellation scope of a single attempt.
///
/// The scope is released (cancelled) when dropped. A successful response
/// keeps its scope alive until the response itself is dropped, so the body
/// stays readable for the rest of the attempt's budget.
#[derive(Debug)]
pub struct AttemptScope {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl AttemptScope {
    /// Token cancelled when the scope ends early. Executors may select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Instant at which the attempt times out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the attempt times out.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the scope is cancelled, released or timed out.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Runs `fut` until it completes or the scope ends, whichever is first.
    pub async fn bound<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TransferError::Cancelled),
            _ = sleep_until(self.deadline) => Err(TransferError::AttemptTimedOut {
                timeout: self.timeout,
            }),
            result = fut => result,
        }
    }
}

impl Drop for AttemptScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::OperationContext;
    use crate::TransferError;

    #[tokio::test(start_paused = true)]
    async fn context_reports_deadline_after_it_passes() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(2));
        assert!(!ctx.is_done());
        assert!(ctx.error().is_none());

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(ctx.is_done());
        assert!(matches!(ctx.error(), Some(TransferError::DeadlineExceeded)));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_returns_early_on_cancel() {
        let ctx = OperationContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        ctx.sleep(Duration::from_secs(60)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(ctx.error(), Some(TransferError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_stops_at_context_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(5));
        let started = Instant::now();

        ctx.sleep(Duration::from_secs(60)).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_does_not_overflow() {
        let ctx = OperationContext::new().with_timeout(Duration::MAX);

        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_some_and(|left| left > Duration::from_secs(3600)));
        let scope = ctx.attempt_scope(Duration::MAX);
        assert_eq!(Some(scope.deadline()), ctx.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_scope_never_outlives_context_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(3));
        let scope = ctx.attempt_scope(Duration::from_secs(60));

        assert_eq!(Some(scope.deadline()), ctx.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn bound_times_out_with_attempt_error() {
        let ctx = OperationContext::new();
        let scope = ctx.attempt_scope(Duration::from_secs(1));

        let result: crate::Result<()> = scope
            .bound(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(TransferError::AttemptTimedOut { timeout }) if timeout == Duration::from_secs(1)
        ));
    }

    #[tokio::test]
    async fn cancelling_context_ends_attempt_scope_but_not_the_reverse() {
        let ctx = OperationContext::new();
        let scope = ctx.attempt_scope(Duration::from_secs(30));
        let token = scope.token().clone();

        drop(scope);
        assert!(token.is_cancelled());
        assert!(!ctx.is_done());

        let scope = ctx.attempt_scope(Duration::from_secs(30));
        ctx.cancel();
        assert!(scope.is_done());
    }
}
