// Shared HTTP helpers for the backends.

use std::time::Duration;

use festive_spark_types::{BackendCause, Error};
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Map a reqwest failure to a backend error, keeping the source.
pub fn transport_error(backend: &str, context: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        let mut timeout = Error::backend(BackendCause::Timeout, backend, format!("{context}: {err}"));
        timeout.source = Some(Box::new(err));
        timeout
    } else {
        Error::network(format!("{context}: {err}"), err).with_backend(backend)
    }
}

/// Read `Retry-After` as numeric seconds or an HTTP-date.
/// Missing, unparseable, negative and past values all yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(secs) = value.trim().parse::<f64>() {
        // Duration::from_secs_f64 panics on negative or non-finite input.
        return (secs >= 0.0 && secs.is_finite()).then(|| Duration::from_secs_f64(secs));
    }

    let date = httpdate::parse_http_date(value.trim()).ok()?;
    date.duration_since(std::time::SystemTime::now()).ok()
}

/// Follow `path` through nested objects.
pub fn extract_json_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Pull `(message, code)` out of a backend error body.
///
/// When `message_path` does not resolve to a string the whole body is used as
/// the message, so nothing the backend said is lost.
pub fn parse_provider_error_message(
    body: &Value,
    message_path: &[&str],
    code_path: &[&str],
) -> (String, Option<String>) {
    let message = extract_json_path(body, message_path)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let code = extract_json_path(body, code_path)
        .and_then(Value::as_str)
        .map(str::to_string);
    (message, code)
}
