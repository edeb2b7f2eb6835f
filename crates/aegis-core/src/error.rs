//! Error taxonomy shared by every port and by the wire protocol.
//!
//! `CoreError` is the single error type every port returns. It carries a
//! stable code, a human-readable message, an optional boxed cause, and a
//! structured [`ErrorCategory`] that downstream policy (retry, runtime
//! failure transitions) can match on without parsing strings.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// The closed set of error codes that can appear on the wire, in an
/// [`crate::model::RpcResponse`] or propagated to a caller.
///
/// # Contract
/// - This set is closed: adding a variant is a breaking change for wire
///   consumers, since `ErrorCode` round-trips through JSON/msgpack as a
///   plain string (see `Display`/`FromStr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    NotActive,
    ServiceUnavailable,
    Timeout,
    InvalidRequest,
    InternalError,
    Electing,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotActive => "NOT_ACTIVE",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::Electing => "ELECTING",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a `CoreError` should be treated by automated policy (retry,
/// runtime state transitions). Mirrors the teacher's
/// `CoreError::with_category`/`category()` pattern: an explicit tag instead
/// of string-matching on the error code everywhere it's consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Safe to retry per the caller's `RetryPolicy` (e.g. `TIMEOUT`,
    /// `SERVICE_UNAVAILABLE`, `NOT_ACTIVE`, `ELECTING`).
    Retryable,
    /// Will not succeed on retry (e.g. `INVALID_REQUEST`).
    NonRetryable,
    /// Fatal to the runtime that raised it (e.g. `REGISTRATION_FAILED`
    /// during startup).
    Fatal,
}

/// The framework-wide error type. Every port (`Transport`, `KvStore`,
/// `Registry`, `ElectionRepository`, `Discovery`, `Router`, `ServiceRuntime`)
/// returns `Result<T, CoreError>`.
#[derive(Debug)]
pub struct CoreError {
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(code: impl Into<Cow<'static, str>>, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category: ErrorCategory::NonRetryable,
            cause: None,
        }
    }

    /// Construct directly from a closed wire [`ErrorCode`], inferring the
    /// category from the taxonomy in spec §7.
    pub fn from_code(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        let category = match code {
            ErrorCode::NotActive
            | ErrorCode::Electing
            | ErrorCode::ServiceUnavailable
            | ErrorCode::Timeout => ErrorCategory::Retryable,
            ErrorCode::InvalidRequest | ErrorCode::InternalError => ErrorCategory::NonRetryable,
        };
        Self {
            code: Cow::Borrowed(code.as_str()),
            message: message.into(),
            category,
            cause: None,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// True when this error corresponds to one of the closed wire codes in
    /// [`ErrorCode`] (as opposed to an internal/technical error such as
    /// `CAS_CONFLICT` that never crosses the wire).
    pub fn as_error_code(&self) -> Option<ErrorCode> {
        match self.code.as_ref() {
            "NOT_ACTIVE" => Some(ErrorCode::NotActive),
            "SERVICE_UNAVAILABLE" => Some(ErrorCode::ServiceUnavailable),
            "TIMEOUT" => Some(ErrorCode::Timeout),
            "INVALID_REQUEST" => Some(ErrorCode::InvalidRequest),
            "INTERNAL_ERROR" => Some(ErrorCode::InternalError),
            "ELECTING" => Some(ErrorCode::Electing),
            _ => None,
        }
    }

    // Internal/technical error constructors (never serialized onto the wire).

    pub fn transport_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new("TRANSPORT_UNAVAILABLE", message).with_category(ErrorCategory::Fatal)
    }

    pub fn cas_conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new("CAS_CONFLICT", message).with_category(ErrorCategory::NonRetryable)
    }

    pub fn registration_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new("REGISTRATION_FAILED", message).with_category(ErrorCategory::Fatal)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
