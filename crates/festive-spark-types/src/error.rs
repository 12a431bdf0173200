// Error hierarchy -- one error type for the whole pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::validation::ValidationError;

/// Discriminator for what went wrong in a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller-supplied values violate the input spec.
    InvalidInput,
    /// The backend answered, but the answer does not satisfy the output spec.
    InvalidOutput,
    /// Transport, availability, or refusal problem talking to the backend.
    BackendFailure,
    /// The caller cancelled the generation.
    Abort,
    /// Bad spec, bad template, or missing credentials.
    Configuration,
}

/// Finer classification of a `BackendFailure`, for diagnostics and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendCause {
    Network,
    Timeout,
    RateLimit,
    Server,
    Authentication,
    AccessDenied,
    NotFound,
    InvalidRequest,
    ContextLength,
    QuotaExceeded,
    /// The backend declined to produce content (safety filter, policy refusal).
    Refusal,
    /// The backend's response body could not be understood at all.
    MalformedResponse,
}

impl BackendCause {
    /// Whether a failure with this cause may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server
        )
    }
}

/// The single error type for the whole library.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,

    /// Field-level violations for `InvalidInput` / `InvalidOutput`.
    pub violations: Option<ValidationError>,
    /// Raw backend text that failed to parse or validate.
    pub raw_text: Option<String>,

    // Backend failure fields
    pub cause: Option<BackendCause>,
    pub backend: Option<String>,
    pub status_code: Option<u16>,
    pub error_code: Option<String>,
    pub retry_after: Option<Duration>,
    pub raw: Option<serde_json::Value>,
}

impl Error {
    fn bare(kind: ErrorKind, message: String, retryable: bool) -> Self {
        Self {
            kind,
            message,
            retryable,
            source: None,
            violations: None,
            raw_text: None,
            cause: None,
            backend: None,
            status_code: None,
            error_code: None,
            retry_after: None,
            raw: None,
        }
    }

    /// Caller input failed the input spec. Not retryable: the caller must fix it.
    pub fn invalid_input(violations: ValidationError) -> Self {
        let mut err = Self::bare(
            ErrorKind::InvalidInput,
            format!("Invalid input: {violations}"),
            false,
        );
        err.violations = Some(violations);
        err
    }

    /// Backend output failed the output spec.
    pub fn invalid_output(violations: ValidationError, raw_text: Option<String>) -> Self {
        let mut err = Self::bare(
            ErrorKind::InvalidOutput,
            format!("Backend output does not match the output spec: {violations}"),
            true,
        );
        err.violations = Some(violations);
        err.raw_text = raw_text;
        err
    }

    /// Backend output could not be turned into a field mapping at all.
    pub fn unparseable_output(reason: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut err = Self::bare(
            ErrorKind::InvalidOutput,
            format!("Backend output could not be parsed: {reason}"),
            true,
        );
        err.raw_text = Some(raw_text.into());
        err
    }

    /// Construct from an HTTP status code (for backends).
    pub fn from_http_status(
        status: u16,
        message: String,
        backend: &str,
        raw: Option<serde_json::Value>,
        retry_after: Option<Duration>,
    ) -> Self {
        let cause = match status {
            400 | 422 => BackendCause::InvalidRequest,
            401 => BackendCause::Authentication,
            402 => BackendCause::QuotaExceeded,
            403 => BackendCause::AccessDenied,
            404 => BackendCause::NotFound,
            408 => BackendCause::Timeout,
            413 => BackendCause::ContextLength,
            429 => BackendCause::RateLimit,
            _ => BackendCause::Server, // 5xx and unknown codes
        };

        // Message-based reclassification can change retryability
        // (e.g. a 500 saying "blocked by safety" is a refusal).
        let cause = Self::classify_by_message(&message, cause);

        let mut err = Self::bare(ErrorKind::BackendFailure, message, cause.is_transient());
        err.cause = Some(cause);
        err.backend = Some(backend.to_string());
        err.status_code = Some(status);
        err.retry_after = retry_after;
        err.raw = raw;
        err
    }

    /// Reclassify a backend cause based on the error message body.
    /// Public so backends can apply it after provider-specific status overrides.
    pub fn classify_by_message(message: &str, default: BackendCause) -> BackendCause {
        let lower = message.to_lowercase();
        if lower.contains("unauthorized")
            || lower.contains("invalid api key")
            || lower.contains("api key not valid")
        {
            BackendCause::Authentication
        } else if lower.contains("context length")
            || lower.contains("context window")
            || lower.contains("too many tokens")
        {
            BackendCause::ContextLength
        } else if lower.contains("content filter")
            || lower.contains("safety")
            || lower.contains("blocked")
        {
            BackendCause::Refusal
        } else if lower.contains("quota")
            || lower.contains("billing")
            || lower.contains("insufficient funds")
        {
            BackendCause::QuotaExceeded
        } else {
            default
        }
    }

    /// Backend failure with an explicit cause.
    pub fn backend(cause: BackendCause, backend: &str, message: impl Into<String>) -> Self {
        let mut err = Self::bare(
            ErrorKind::BackendFailure,
            message.into(),
            cause.is_transient(),
        );
        err.cause = Some(cause);
        err.backend = Some(backend.to_string());
        err
    }

    /// Transport failure with source.
    pub fn network(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let mut err = Self::bare(ErrorKind::BackendFailure, message.into(), true);
        err.cause = Some(BackendCause::Network);
        err.source = Some(Box::new(source));
        err
    }

    /// The backend declined to generate content.
    pub fn refusal(backend: &str, message: impl Into<String>) -> Self {
        Self::backend(BackendCause::Refusal, backend, message)
    }

    /// The backend's response body was not in the expected wire shape.
    pub fn malformed_response(backend: &str, message: impl Into<String>) -> Self {
        Self::backend(BackendCause::MalformedResponse, backend, message)
    }

    /// The generation was cancelled through its cancellation token.
    pub fn abort() -> Self {
        Self::bare(ErrorKind::Abort, "operation aborted".into(), false)
    }

    /// Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::bare(ErrorKind::Configuration, message.into(), false)
    }

    /// Attach a backend name (used by backends that build errors through shared helpers).
    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = Some(backend.to_string());
        self
    }

    /// True when the caller can fix the problem by changing their input.
    pub fn is_caller_fixable(&self) -> bool {
        self.kind == ErrorKind::InvalidInput
    }

    /// Names of violated fields, empty for non-validation errors.
    pub fn violated_fields(&self) -> Vec<&str> {
        self.violations
            .as_ref()
            .map(|v| v.fields())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cause {
            Some(cause) => write!(f, "{:?}({:?}): {}", self.kind, cause, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
