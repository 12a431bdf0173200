// OpenAI-compatible Chat Completions backend.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use festive_spark_types::{
    Backend, BackendPayload, BackendRequest, BackendResponse, BackendTimeout, BoxFuture, Error,
    FinishReason, Usage,
};

use crate::util::http::{parse_provider_error_message, parse_retry_after, transport_error};

pub(crate) const NAME: &str = "openai-compatible";

/// Default endpoint. `/v1/chat/completions` is appended per request.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Backend for any service speaking the Chat Completions protocol
/// (OpenAI, vLLM, Ollama, Groq, Together AI, ...).
///
/// The output spec is sent as `response_format = json_schema`, so a
/// well-behaved model answers with a JSON object.
pub struct OpenAICompatibleBackend {
    api_key: SecretString,
    base_url: String,
    model: String,
    strict: bool,
    http_client: reqwest::Client,
}

impl OpenAICompatibleBackend {
    /// Backend for `model` at `base_url` with default timeouts.
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::builder(api_key, model).base_url(base_url).build()
    }

    pub fn builder(api_key: SecretString, model: impl Into<String>) -> OpenAICompatibleBackendBuilder {
        OpenAICompatibleBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn do_complete(&self, request: BackendRequest) -> Result<BackendResponse, Error> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = translate_request(&request, &self.model, self.strict);

        let http_response = self
            .http_client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(NAME, "HTTP request failed", e))?;

        let status = http_response.status().as_u16();
        let headers = http_response.headers().clone();

        if status >= 400 {
            let error_body: Value = http_response
                .json()
                .await
                .unwrap_or(json!({"error": {"message": format!("HTTP {status} with unreadable body")}}));
            return Err(parse_error(status, &headers, error_body));
        }

        let raw: Value = http_response.json().await.map_err(|e| {
            let mut err = Error::malformed_response(NAME, format!("Response body is not JSON: {e}"));
            err.source = Some(Box::new(e));
            err
        })?;

        parse_response(raw)
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.expose_secret())
            .parse()
            .map_err(|_| {
                Error::configuration("Invalid API key: contains non-ASCII or control characters")
            })?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        Ok(headers)
    }
}

impl Backend for OpenAICompatibleBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse, Error>> {
        Box::pin(self.do_complete(request))
    }
}

/// Builder for `OpenAICompatibleBackend`.
pub struct OpenAICompatibleBackendBuilder {
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: BackendTimeout,
    strict: bool,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl OpenAICompatibleBackendBuilder {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: BackendTimeout::default(),
            strict: false,
            default_headers: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = crate::util::normalize_base_url(&base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: BackendTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask for strict schema adherence. Only services that accept every
    /// keyword the schema uses support this.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Headers sent with every request (e.g. `OpenAI-Organization`).
    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<OpenAICompatibleBackend, Error> {
        let http_client = super::build_http_client(&self.timeout, self.default_headers)?;
        Ok(OpenAICompatibleBackend {
            api_key: self.api_key,
            base_url: self.base_url,
            model: self.model,
            strict: self.strict,
            http_client,
        })
    }
}

// === Request Translation ===

pub(crate) fn translate_request(request: &BackendRequest, model: &str, strict: bool) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "schema": request.output_spec.json_schema(),
                "strict": strict,
            }
        },
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

// === Response Translation ===

pub(crate) fn parse_response(raw: Value) -> Result<BackendResponse, Error> {
    let choice = raw
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| Error::malformed_response(NAME, "Response has no choices"))?;
    let message = choice.get("message");

    let raw_finish = choice.get("finish_reason").and_then(Value::as_str);
    let finish_reason = match raw_finish {
        Some("stop") => FinishReason::stop(),
        Some("length") => FinishReason::length(),
        Some("content_filter") => FinishReason::content_filter(),
        Some(_) => FinishReason::other(),
        None => FinishReason::stop(),
    };
    let finish_reason = FinishReason {
        raw: raw_finish.map(str::to_string),
        ..finish_reason
    };

    if let Some(refusal) = message
        .and_then(|m| m.get("refusal"))
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
    {
        tracing::warn!(backend = NAME, "Model refused the request");
        let mut err = Error::refusal(NAME, format!("Model refused: {refusal}"));
        err.raw = Some(raw.clone());
        return Err(err);
    }
    if finish_reason.reason == "content_filter" {
        tracing::warn!(backend = NAME, "Response stopped by content filter");
        let mut err = Error::refusal(NAME, "Response was blocked by the content filter");
        err.raw = Some(raw.clone());
        return Err(err);
    }

    let content = message
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::malformed_response(NAME, "Response message has no content"))?;

    let payload = match serde_json::from_str::<Map<String, Value>>(content) {
        Ok(map) => BackendPayload::Structured(map),
        Err(_) => BackendPayload::Text(content.to_string()),
    };

    let usage_obj = raw.get("usage");
    let token_count = |key: &str| {
        usage_obj
            .and_then(|u| u.get(key))
            .and_then(Value::as_u64)
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    };
    let usage = Usage {
        raw: usage_obj.cloned(),
        ..Usage::new(token_count("prompt_tokens"), token_count("completion_tokens"))
    };

    Ok(BackendResponse {
        id: raw.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
        model: raw.get("model").and_then(Value::as_str).unwrap_or("").to_string(),
        backend: NAME.to_string(),
        payload,
        finish_reason,
        usage,
        raw: Some(raw),
    })
}

// === Error Translation ===

pub(crate) fn parse_error(status: u16, headers: &reqwest::header::HeaderMap, body: Value) -> Error {
    let (message, code) =
        parse_provider_error_message(&body, &["error", "message"], &["error", "code"]);
    let mut err = Error::from_http_status(
        status,
        message,
        NAME,
        Some(body),
        parse_retry_after(headers),
    );
    err.error_code = code;
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use festive_spark_types::{BackendCause, ErrorKind, FieldSpec, Spec};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn output_spec() -> Arc<Spec> {
        Arc::new(
            Spec::new(vec![
                FieldSpec::string("idea").min_length(1),
                FieldSpec::string("rationale").min_length(1),
            ])
            .unwrap(),
        )
    }

    fn backend(server: &MockServer) -> OpenAICompatibleBackend {
        OpenAICompatibleBackend::new(SecretString::from("sk-test".to_string()), server.uri(), "gpt-4o-mini")
            .unwrap()
    }

    fn chat_body(content: &str, finish_reason: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": finish_reason
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
        })
    }

    #[test]
    fn test_translate_request_shape() {
        let request = BackendRequest::new("Festival: Diwali", output_spec())
            .system(Some("Be creative.".into()))
            .temperature(Some(0.9))
            .max_tokens(Some(512));
        let body = translate_request(&request, "gpt-4o-mini", false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "Be creative."}));
        assert_eq!(body["messages"][1]["content"], "Festival: Diwali");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"],
            json!(["idea", "rationale"])
        );
        assert_eq!(body["response_format"]["json_schema"]["strict"], false);
        assert_eq!(body["temperature"], 0.9);
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn test_translate_request_omits_unset_options() {
        let body = translate_request(&BackendRequest::new("p", output_spec()), "m", true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_parse_response_json_content_is_structured() {
        let response =
            parse_response(chat_body(r#"{"idea": "Lamps", "rationale": "Harmony"}"#, "stop"))
                .unwrap();
        match &response.payload {
            BackendPayload::Structured(map) => assert_eq!(map["idea"], "Lamps"),
            other => panic!("expected structured payload, got {other:?}"),
        }
        assert_eq!(response.usage.total_tokens, 200);
        assert_eq!(response.finish_reason.raw.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_response_oversized_token_counts_saturate() {
        let mut raw = chat_body(r#"{"idea": "Lamps"}"#, "stop");
        raw["usage"] = json!({"prompt_tokens": 120, "completion_tokens": 5_000_000_000u64});
        let response = parse_response(raw).unwrap();
        assert_eq!(response.usage.input_tokens, 120);
        assert_eq!(response.usage.output_tokens, u32::MAX);
        assert_eq!(response.usage.total_tokens, u32::MAX);
    }

    #[test]
    fn test_parse_response_prose_content_is_text() {
        let response = parse_response(chat_body("Idea: Lamps", "length")).unwrap();
        assert_eq!(response.payload, BackendPayload::Text("Idea: Lamps".into()));
        assert_eq!(response.finish_reason.reason, "length");
    }

    #[test]
    fn test_parse_response_refusal_field() {
        let raw = json!({
            "choices": [{
                "message": {"role": "assistant", "content": null, "refusal": "I can't help with that."},
                "finish_reason": "stop"
            }]
        });
        let err = parse_response(raw).unwrap_err();
        assert_eq!(err.cause, Some(BackendCause::Refusal));
        assert!(!err.retryable);
        assert!(err.message.contains("can't help"));
    }

    #[test]
    fn test_parse_response_content_filter() {
        let err = parse_response(chat_body("", "content_filter")).unwrap_err();
        assert_eq!(err.cause, Some(BackendCause::Refusal));
    }

    #[test]
    fn test_parse_response_malformed() {
        let err = parse_response(json!({"object": "list"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BackendFailure);
        assert_eq!(err.cause, Some(BackendCause::MalformedResponse));

        let err = parse_response(chat_body("   ", "stop")).unwrap_err();
        assert_eq!(err.cause, Some(BackendCause::MalformedResponse));
    }

    #[test]
    fn test_build_headers_rejects_control_characters() {
        let backend = OpenAICompatibleBackend::new(
            SecretString::from("bad\nkey".to_string()),
            "https://example.com",
            "m",
        )
        .unwrap();
        let err = backend.build_headers().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_normalizes_base_url() {
        let backend = OpenAICompatibleBackend::builder(SecretString::from("k".to_string()), "m")
            .base_url("http://localhost:11434/")
            .build()
            .unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
        assert_eq!(backend.model(), "m");
        assert_eq!(backend.name(), "openai-compatible");
    }

    #[tokio::test]
    async fn test_complete_success_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "response_format": {"type": "json_schema"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"idea": "Lamps", "rationale": "Contrast"}"#,
                "stop",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend(&server)
            .complete(BackendRequest::new("prompt", output_spec()))
            .await
            .unwrap();
        assert_eq!(response.backend, "openai-compatible");
        assert_eq!(response.model, "gpt-4o-mini");
        assert!(matches!(response.payload, BackendPayload::Structured(_)));
    }

    #[tokio::test]
    async fn test_complete_401_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
            })))
            .mount(&server)
            .await;

        let err = backend(&server)
            .complete(BackendRequest::new("prompt", output_spec()))
            .await
            .unwrap_err();
        assert_eq!(err.cause, Some(BackendCause::Authentication));
        assert_eq!(err.status_code, Some(401));
        assert_eq!(err.error_code.as_deref(), Some("invalid_api_key"));
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_complete_429_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
            )
            .mount(&server)
            .await;

        let err = backend(&server)
            .complete(BackendRequest::new("prompt", output_spec()))
            .await
            .unwrap_err();
        assert_eq!(err.cause, Some(BackendCause::RateLimit));
        assert!(err.retryable);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_complete_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .complete(BackendRequest::new("prompt", output_spec()))
            .await
            .unwrap_err();
        assert_eq!(err.cause, Some(BackendCause::MalformedResponse));
        assert_eq!(err.backend.as_deref(), Some("openai-compatible"));
    }

    #[tokio::test]
    async fn test_complete_connection_refused_is_network() {
        // Nothing listens on port 9 in the test environment.
        let backend =
            OpenAICompatibleBackend::new(SecretString::from("k".to_string()), "http://127.0.0.1:9", "m")
                .unwrap();
        let err = backend
            .complete(BackendRequest::new("prompt", output_spec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BackendFailure);
        assert!(err.retryable);
        assert_eq!(err.backend.as_deref(), Some("openai-compatible"));
    }
}
