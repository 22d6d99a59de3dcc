use std::fmt;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode, Url};

use crate::{AttemptScope, Endpoint, Result, TransferError};

/// Response of the attempt that ended a retried operation.
///
/// Owns the attempt's cancellation scope: body reads are bounded by what is
/// left of the per-try deadline, and dropping the response releases the
/// scope.
pub struct TransferResponse {
    inner: reqwest::Response,
    scope: AttemptScope,
    endpoint: Endpoint,
    attempts: u32,
}

impl fmt::Debug for TransferResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferResponse")
            .field("status", &self.inner.status())
            .field("url", self.inner.url())
            .field("endpoint", &self.endpoint)
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl TransferResponse {
    pub(crate) fn new(
        inner: reqwest::Response,
        scope: AttemptScope,
        endpoint: Endpoint,
        attempts: u32,
    ) -> Self {
        Self {
            inner,
            scope,
            endpoint,
            attempts,
        }
    }

    /// Status code of the final attempt.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// URL the attempt was sent to, including the `timeout` parameter.
    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    /// Body length announced by the server, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    /// Endpoint that served this response.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Number of attempts made, including the one that produced this response.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Next chunk of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let Self { inner, scope, .. } = self;
        scope
            .bound(async { inner.chunk().await.map_err(TransferError::Transport) })
            .await
    }

    /// Reads the rest of the body.
    pub async fn bytes(self) -> Result<Bytes> {
        let Self { inner, scope, .. } = self;
        scope
            .bound(async { inner.bytes().await.map_err(TransferError::Transport) })
            .await
    }

    /// Reads the rest of the body as text.
    pub async fn text(self) -> Result<String> {
        let Self { inner, scope, .. } = self;
        scope
            .bound(async { inner.text().await.map_err(TransferError::Transport) })
            .await
    }
}

/// Reads and discards the rest of a response body so the connection can be
/// reused. Errors are ignored; the response is dropped either way.
pub(crate) async fn drain(mut response: reqwest::Response, scope: &AttemptScope) {
    let _ = scope
        .bound(async {
            while response
                .chunk()
                .await
                .map_err(TransferError::Transport)?
                .is_some()
            {}
            Ok(())
        })
        .await;
}
