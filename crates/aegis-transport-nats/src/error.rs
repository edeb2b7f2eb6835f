//! Maps `async-nats` error types onto [`aegis_core::error::CoreError`].
//! Grounded on the teacher's `spark-transport-tcp::error` module: one
//! `OperationKind`-style stable code per failing operation, `io::Error`
//! kind dispatch generalized here to `async_nats`'s own error enums.

use std::time::Duration;

use aegis_core::error::{CoreError, ErrorCategory};

pub(crate) fn connect_failed(err: async_nats::ConnectError) -> CoreError {
    CoreError::transport_unavailable(format!("nats connect failed: {err}")).with_cause(err)
}

pub(crate) fn publish_failed(err: async_nats::PublishError) -> CoreError {
    retryable("NATS_PUBLISH_FAILED", format!("nats publish failed: {err}"), err)
}

pub(crate) fn request_failed(err: async_nats::RequestError) -> CoreError {
    use async_nats::RequestErrorKind;
    match err.kind() {
        RequestErrorKind::TimedOut => {
            CoreError::from_code(aegis_core::error::ErrorCode::Timeout, format!("nats request timed out: {err}"))
        }
        RequestErrorKind::NoResponders => CoreError::from_code(
            aegis_core::error::ErrorCode::ServiceUnavailable,
            format!("no responders on subject: {err}"),
        ),
        _ => retryable("NATS_REQUEST_FAILED", format!("nats request failed: {err}"), err),
    }
}

pub(crate) fn subscribe_failed(err: async_nats::SubscribeError) -> CoreError {
    retryable("NATS_SUBSCRIBE_FAILED", format!("nats subscribe failed: {err}"), err)
}

pub(crate) fn consumer_failed(err: impl std::error::Error + Send + Sync + 'static) -> CoreError {
    CoreError::new("NATS_CONSUMER_FAILED", err.to_string())
        .with_category(ErrorCategory::Retryable)
        .with_cause(err)
}

pub(crate) fn kv_failed(err: impl std::error::Error + Send + Sync + 'static) -> CoreError {
    CoreError::new("NATS_KV_FAILED", err.to_string())
        .with_category(ErrorCategory::Retryable)
        .with_cause(err)
}

pub(crate) fn kv_cas_conflict(key: &str) -> CoreError {
    CoreError::cas_conflict(format!("key {key} was modified concurrently"))
}

fn retryable(code: &'static str, message: String, cause: impl std::error::Error + Send + Sync + 'static) -> CoreError {
    CoreError::new(code, message)
        .with_category(ErrorCategory::Retryable)
        .with_cause(cause)
}

/// Default jitter span applied to reconnect backoff (spec §4.8's jitter
/// technique, reused here for the connection pool's re-probe cadence
/// rather than client-side RPC retry).
pub(crate) const RECONNECT_JITTER: Duration = Duration::from_millis(250);
