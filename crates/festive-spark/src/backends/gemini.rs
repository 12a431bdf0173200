// Gemini generateContent backend.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use festive_spark_types::{
    Backend, BackendCause, BackendPayload, BackendRequest, BackendResponse, BackendTimeout,
    BoxFuture, Error, FinishReason, Spec, Usage,
};

use crate::util::http::{parse_provider_error_message, parse_retry_after, transport_error};

pub(crate) const NAME: &str = "gemini";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Finish reasons that mean the model declined to answer.
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "PROHIBITED_CONTENT", "BLOCKLIST"];

/// Backend for Google's Gemini API (`generateContent`).
///
/// Requests JSON output with `responseMimeType = application/json` and a
/// `responseSchema` derived from the output spec.
pub struct GeminiBackend {
    api_key: SecretString,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl GeminiBackend {
    /// Backend for `model` on the public endpoint with default timeouts.
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self, Error> {
        Self::builder(api_key, model).build()
    }

    pub fn builder(api_key: SecretString, model: impl Into<String>) -> GeminiBackendBuilder {
        GeminiBackendBuilder {
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: BackendTimeout::default(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        let key = self.api_key.expose_secret().parse().map_err(|_| {
            Error::configuration("Invalid API key: contains non-ASCII or control characters")
        })?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }

    async fn do_complete(&self, request: BackendRequest) -> Result<BackendResponse, Error> {
        let body = translate_request(&request);

        let http_response = self
            .http_client
            .post(self.build_url())
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(NAME, "HTTP request failed", e))?;

        let status = http_response.status().as_u16();
        let headers = http_response.headers().clone();

        if status >= 400 {
            let error_body: Value = http_response.json().await.unwrap_or(
                json!({"error": {"message": format!("HTTP {status} with unreadable body")}}),
            );
            return Err(parse_error(status, &headers, error_body));
        }

        let raw: Value = http_response.json().await.map_err(|e| {
            let mut err = Error::malformed_response(NAME, format!("Response body is not JSON: {e}"));
            err.source = Some(Box::new(e));
            err
        })?;

        parse_response(raw, &self.model)
    }
}

impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse, Error>> {
        Box::pin(self.do_complete(request))
    }
}

/// Builder for `GeminiBackend`.
pub struct GeminiBackendBuilder {
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: BackendTimeout,
}

impl GeminiBackendBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = crate::util::normalize_base_url(&base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: BackendTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<GeminiBackend, Error> {
        Ok(GeminiBackend {
            http_client: super::build_http_client(&self.timeout, None)?,
            api_key: self.api_key,
            base_url: self.base_url,
            model: self.model,
        })
    }
}

// === Request Translation ===

pub(crate) fn translate_request(request: &BackendRequest) -> Value {
    let mut generation_config = Map::new();
    generation_config.insert("responseMimeType".into(), json!("application/json"));
    generation_config.insert("responseSchema".into(), response_schema(&request.output_spec));
    if let Some(temperature) = request.temperature {
        generation_config.insert("temperature".into(), json!(temperature));
    }
    if let Some(max_tokens) = request.max_tokens {
        generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
    }

    let mut body = json!({
        "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
        "generationConfig": generation_config,
    });
    if let Some(system) = &request.system {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    body
}

/// The output spec as a Gemini `responseSchema`.
///
/// Gemini accepts an OpenAPI subset: string length bounds and
/// `additionalProperties` are dropped (the output validator still enforces
/// them) and `propertyOrdering` keeps the spec's field order.
pub(crate) fn response_schema(spec: &Spec) -> Value {
    let mut schema = spec.json_schema();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("additionalProperties");
        if let Some(properties) = obj.get_mut("properties").and_then(Value::as_object_mut) {
            for property in properties.values_mut().filter_map(Value::as_object_mut) {
                property.remove("minLength");
                property.remove("maxLength");
            }
        }
        obj.insert(
            "propertyOrdering".into(),
            json!(spec.field_names().collect::<Vec<_>>()),
        );
    }
    schema
}

// === Response Translation ===

pub(crate) fn parse_response(raw: Value, requested_model: &str) -> Result<BackendResponse, Error> {
    if let Some(block_reason) = raw
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(Value::as_str)
    {
        tracing::warn!(backend = NAME, block_reason, "Prompt was blocked");
        let mut err = Error::refusal(NAME, format!("Prompt was blocked: {block_reason}"));
        err.error_code = Some(block_reason.to_string());
        err.raw = Some(raw.clone());
        return Err(err);
    }

    let candidate = raw
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| Error::malformed_response(NAME, "Response has no candidates"))?;

    let raw_finish = candidate.get("finishReason").and_then(Value::as_str);
    if let Some(reason) = raw_finish.filter(|r| BLOCKED_FINISH_REASONS.contains(r)) {
        tracing::warn!(backend = NAME, finish_reason = reason, "Response was blocked");
        let mut err = Error::refusal(NAME, format!("Response was blocked: {reason}"));
        err.error_code = Some(reason.to_string());
        err.raw = Some(raw.clone());
        return Err(err);
    }
    let finish_reason = match raw_finish {
        Some(reason) => map_finish_reason(reason),
        None => FinishReason::stop(),
    };

    let text: String = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(Error::malformed_response(NAME, "Candidate has no text"));
    }

    let payload = match serde_json::from_str::<Map<String, Value>>(&text) {
        Ok(map) => BackendPayload::Structured(map),
        Err(_) => BackendPayload::Text(text),
    };

    let usage_obj = raw.get("usageMetadata");
    let token_count = |key: &str| {
        usage_obj
            .and_then(|u| u.get(key))
            .and_then(Value::as_u64)
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    };
    let usage = Usage {
        raw: usage_obj.cloned(),
        ..Usage::new(
            token_count("promptTokenCount"),
            token_count("candidatesTokenCount"),
        )
    };

    Ok(BackendResponse {
        id: raw
            .get("responseId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        model: raw
            .get("modelVersion")
            .and_then(Value::as_str)
            .unwrap_or(requested_model)
            .to_string(),
        backend: NAME.to_string(),
        payload,
        finish_reason,
        usage,
        raw: Some(raw),
    })
}

fn map_finish_reason(reason: &str) -> FinishReason {
    let mapped = match reason {
        "STOP" => FinishReason::stop(),
        "MAX_TOKENS" => FinishReason::length(),
        _ => FinishReason::other(),
    };
    FinishReason {
        raw: Some(reason.to_string()),
        ..mapped
    }
}

// === Error Translation ===

/// Gemini errors carry a gRPC-style `error.status` that is more precise than
/// the HTTP status; it wins, then the message may refine it further.
pub(crate) fn parse_error(status: u16, headers: &reqwest::header::HeaderMap, body: Value) -> Error {
    let (message, code) =
        parse_provider_error_message(&body, &["error", "message"], &["error", "status"]);
    let mut err = Error::from_http_status(
        status,
        message,
        NAME,
        Some(body),
        parse_retry_after(headers),
    );

    let grpc_cause = code.as_deref().and_then(|code| match code {
        "DEADLINE_EXCEEDED" => Some(BackendCause::Timeout),
        "PERMISSION_DENIED" => Some(BackendCause::AccessDenied),
        "RESOURCE_EXHAUSTED" => Some(BackendCause::RateLimit),
        "UNAUTHENTICATED" => Some(BackendCause::Authentication),
        "NOT_FOUND" => Some(BackendCause::NotFound),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => Some(BackendCause::InvalidRequest),
        "UNAVAILABLE" | "INTERNAL" => Some(BackendCause::Server),
        _ => None,
    });
    if let Some(cause) = grpc_cause {
        let cause = Error::classify_by_message(&err.message, cause);
        err.cause = Some(cause);
        err.retryable = cause.is_transient();
    }
    err.error_code = code;
    err
}
