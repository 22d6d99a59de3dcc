//! Outcome classification for a single attempt.

use std::fmt;

use reqwest::StatusCode;

use crate::{Result, TransferError};

/// Endpoint targeted by an attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Endpoint {
    Primary,
    Secondary,
}

/// What the retry loop does after an attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Retry(RetryReason),
    Abort(AbortReason),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryReason {
    /// The secondary answered 404, most likely replication lag. The
    /// secondary is not used again for this operation.
    SecondaryNotFound,
    /// Network-level failure.
    NetworkError,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortReason {
    /// The caller's context was cancelled or ran past its deadline.
    OperationExpired,
    /// 400 Bad Request; the same request will fail again.
    BadRequest,
    /// An error that is not network related.
    UnrecognizedError,
    /// The attempt produced a response, whatever its status.
    Success,
}

impl Action {
    /// Returns `true` when another attempt should follow.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Retry(RetryReason::SecondaryNotFound) => "retry: secondary returned 404",
            Self::Retry(RetryReason::NetworkError) => "retry: network error",
            Self::Abort(AbortReason::OperationExpired) => "no retry: operation expired",
            Self::Abort(AbortReason::BadRequest) => "no retry: bad request",
            Self::Abort(AbortReason::UnrecognizedError) => "no retry: unrecognized error",
            Self::Abort(AbortReason::Success) => "no retry: request completed",
        };
        f.write_str(text)
    }
}

/// Classifies one attempt's outcome.
///
/// The checks run in a fixed order and the first match wins; an expired
/// operation context overrides every other outcome.
pub fn classify(
    operation_done: bool,
    endpoint: Endpoint,
    outcome: &Result<reqwest::Response>,
) -> Action {
    let status = outcome.as_ref().ok().map(reqwest::Response::status);
    classify_parts(operation_done, endpoint, status, outcome.as_ref().err())
}

pub(crate) fn classify_parts(
    operation_done: bool,
    endpoint: Endpoint,
    status: Option<StatusCode>,
    error: Option<&TransferError>,
) -> Action {
    if operation_done {
        return Action::Abort(AbortReason::OperationExpired);
    }
    if endpoint == Endpoint::Secondary && status == Some(StatusCode::NOT_FOUND) {
        return Action::Retry(RetryReason::SecondaryNotFound);
    }
    if status == Some(StatusCode::BAD_REQUEST) {
        return Action::Abort(AbortReason::BadRequest);
    }
    match error {
        Some(err) if err.is_network() => Action::Retry(RetryReason::NetworkError),
        Some(_) => Action::Abort(AbortReason::UnrecognizedError),
        None => Action::Abort(AbortReason::Success),
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use reqwest::StatusCode;

    use super::{classify_parts, AbortReason, Action, Endpoint, RetryReason};
    use crate::TransferError;

    fn reset() -> TransferError {
        TransferError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
    }

    #[test]
    fn expired_operation_wins_over_everything() {
        let err = reset();
        for (status, error) in [
            (Some(StatusCode::NOT_FOUND), None),
            (Some(StatusCode::BAD_REQUEST), None),
            (Some(StatusCode::OK), None),
            (None, Some(&err)),
        ] {
            assert_eq!(
                classify_parts(true, Endpoint::Secondary, status, error),
                Action::Abort(AbortReason::OperationExpired)
            );
        }
    }

    #[test]
    fn not_found_retries_only_on_secondary() {
        assert_eq!(
            classify_parts(false, Endpoint::Secondary, Some(StatusCode::NOT_FOUND), None),
            Action::Retry(RetryReason::SecondaryNotFound)
        );
        assert_eq!(
            classify_parts(false, Endpoint::Primary, Some(StatusCode::NOT_FOUND), None),
            Action::Abort(AbortReason::Success)
        );
    }

    #[test]
    fn bad_request_aborts_on_either_endpoint() {
        for endpoint in [Endpoint::Primary, Endpoint::Secondary] {
            assert_eq!(
                classify_parts(false, endpoint, Some(StatusCode::BAD_REQUEST), None),
                Action::Abort(AbortReason::BadRequest)
            );
        }
    }

    #[test]
    fn errors_split_on_network_origin() {
        let network = reset();
        assert_eq!(
            classify_parts(false, Endpoint::Primary, None, Some(&network)),
            Action::Retry(RetryReason::NetworkError)
        );

        let other = TransferError::other("checksum mismatch");
        assert_eq!(
            classify_parts(false, Endpoint::Primary, None, Some(&other)),
            Action::Abort(AbortReason::UnrecognizedError)
        );
    }

    #[test]
    fn server_errors_without_transport_error_are_success() {
        for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::SERVICE_UNAVAILABLE] {
            let action = classify_parts(false, Endpoint::Primary, Some(status), None);
            assert_eq!(action, Action::Abort(AbortReason::Success));
            assert!(!action.is_retry());
        }
    }
}
