// Backends behind feature flags, plus environment-driven selection.

use std::sync::Arc;
use std::time::Duration;

use festive_spark_types::{Backend, BackendTimeout, Error};

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "openai-compat")]
pub mod openai_compat;

pub const MODEL_ENV: &str = "FESTIVE_SPARK_MODEL";

#[cfg(feature = "gemini")]
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[cfg(feature = "openai-compat")]
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// HTTP client with `connect` wired to `connect_timeout()` and `request` to
/// `timeout()`.
#[allow(dead_code)]
pub(crate) fn build_http_client(
    timeout: &BackendTimeout,
    default_headers: Option<reqwest::header::HeaderMap>,
) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs_f64(timeout.connect))
        .timeout(Duration::from_secs_f64(timeout.request));
    if let Some(headers) = default_headers {
        builder = builder.default_headers(headers);
    }
    builder.build().map_err(|e| {
        let mut err = Error::configuration(format!("Failed to build HTTP client: {e}"));
        err.source = Some(Box::new(e));
        err
    })
}

/// Timeouts from `FESTIVE_SPARK_CONNECT_TIMEOUT` and
/// `FESTIVE_SPARK_REQUEST_TIMEOUT` (seconds). Unset, unparseable or
/// non-positive values fall back to the defaults.
pub fn timeout_from_env() -> BackendTimeout {
    let defaults = BackendTimeout::default();
    let seconds = |name: &str| {
        std::env::var(name)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    };
    BackendTimeout {
        connect: seconds("FESTIVE_SPARK_CONNECT_TIMEOUT").unwrap_or(defaults.connect),
        request: seconds("FESTIVE_SPARK_REQUEST_TIMEOUT").unwrap_or(defaults.request),
    }
}

/// Select a backend from environment variables.
///
/// `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) selects Gemini; otherwise
/// `OPENAI_API_KEY` selects the OpenAI-compatible backend. `FESTIVE_SPARK_MODEL`
/// overrides the model. With no key set this is a `Configuration` error.
pub fn from_env() -> Result<Arc<dyn Backend>, Error> {
    #[allow(unused_variables)]
    let timeout = timeout_from_env();
    #[allow(unused_variables)]
    let model = std::env::var(MODEL_ENV).ok().filter(|m| !m.trim().is_empty());

    #[cfg(feature = "gemini")]
    if let Some(key) = env_key("GEMINI_API_KEY").or_else(|| env_key("GOOGLE_API_KEY")) {
        let mut builder = gemini::GeminiBackend::builder(
            secrecy::SecretString::from(key),
            model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        )
        .timeout(timeout);
        if let Ok(base_url) = std::env::var("GEMINI_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        let backend = builder.build()?;
        tracing::debug!(
            backend = gemini::NAME,
            model = backend.model(),
            "Backend selected from environment"
        );
        return Ok(Arc::new(backend));
    }

    #[cfg(feature = "openai-compat")]
    if let Some(key) = env_key("OPENAI_API_KEY") {
        let mut builder = openai_compat::OpenAICompatibleBackend::builder(
            secrecy::SecretString::from(key),
            model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        )
        .timeout(timeout);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            // Requests append "/v1/chat/completions".
            let normalized = base_url
                .strip_suffix("/v1/")
                .or_else(|| base_url.strip_suffix("/v1"))
                .unwrap_or(&base_url);
            builder = builder.base_url(normalized);
        }
        if let Some(headers) = openai_default_headers() {
            builder = builder.default_headers(headers);
        }
        let backend = builder.build()?;
        tracing::debug!(
            backend = openai_compat::NAME,
            model = backend.model(),
            "Backend selected from environment"
        );
        return Ok(Arc::new(backend));
    }

    Err(Error::configuration(
        "No backend configured: set GEMINI_API_KEY, GOOGLE_API_KEY or OPENAI_API_KEY",
    ))
}

#[allow(dead_code)]
fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}

/// `OPENAI_ORG_ID` / `OPENAI_PROJECT_ID` as default headers.
#[cfg(feature = "openai-compat")]
fn openai_default_headers() -> Option<reqwest::header::HeaderMap> {
    let mut headers = reqwest::header::HeaderMap::new();
    for (var, header) in [
        ("OPENAI_ORG_ID", "OpenAI-Organization"),
        ("OPENAI_PROJECT_ID", "OpenAI-Project"),
    ] {
        if let Some(value) = env_key(var).and_then(|v| v.parse().ok()) {
            headers.insert(header, value);
        }
    }
    (!headers.is_empty()).then_some(headers)
}
