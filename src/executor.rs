use async_trait::async_trait;

use crate::{AttemptScope, Result, TransferError, TransferRequest};

/// Issues exactly one HTTP attempt.
///
/// Implementations must not retry internally; the retry policy owns that
/// decision. The attempt is abandoned once `scope` ends, so executors do not
/// need to enforce the per-try timeout themselves.
#[async_trait]
pub trait AttemptExecutor: Send + Sync {
    async fn execute(
        &self,
        scope: &AttemptScope,
        request: TransferRequest,
    ) -> Result<reqwest::Response>;
}

/// Executor backed by a shared [`reqwest::Client`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestExecutor {
    http: reqwest::Client,
}

impl ReqwestExecutor {
    /// Sends attempts through `http`.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AttemptExecutor for ReqwestExecutor {
    async fn execute(
        &self,
        scope: &AttemptScope,
        request: TransferRequest,
    ) -> Result<reqwest::Response> {
        let (method, url, headers, body) = request.into_parts();
        let mut builder = self
            .http
            .request(method, url)
            .headers(headers)
            .timeout(scope.remaining());
        if let Some(bytes) = body.into_bytes().map_err(TransferError::Rewind)? {
            builder = builder.body(bytes);
        }
        builder.send().await.map_err(TransferError::Transport)
    }
}
