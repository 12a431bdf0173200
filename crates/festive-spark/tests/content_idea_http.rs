//! Content-idea generation over HTTP against wiremock servers for each backend.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use festive_spark::{
    BackendCause, ContentIdeaGenerator, ErrorKind, GeminiBackend, OpenAICompatibleBackend,
    Technique,
};

const FESTIVAL: &str = "Holi";
const BRAND: &str = "Cadbury";
const INSIGHT: &str = "Sweet moments are best shared with family.";

fn idea() -> Value {
    json!({
        "idea": "A colour-fight where every splash reveals a chocolate",
        "format": "Instagram reel",
        "visualCue": "Powdered colours bursting over purple wrappers",
        "copyLine": "Play sweet this Holi",
        "rationale": "Contrast: the chaos of colour against the calm sweetness of sharing."
    })
}

fn openai_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
    })
}

fn gemini_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 80},
        "modelVersion": "gemini-2.0-flash"
    })
}

async fn openai_generator(server: &MockServer) -> ContentIdeaGenerator {
    let backend = OpenAICompatibleBackend::new(
        SecretString::from("sk-test".to_string()),
        server.uri(),
        "gpt-4o-mini",
    )
    .unwrap();
    ContentIdeaGenerator::new(Arc::new(backend)).unwrap()
}

async fn gemini_generator(server: &MockServer) -> ContentIdeaGenerator {
    let backend = GeminiBackend::builder(SecretString::from("gm-test".to_string()), "gemini-2.0-flash")
        .base_url(server.uri())
        .build()
        .unwrap();
    ContentIdeaGenerator::new(Arc::new(backend)).unwrap()
}

#[tokio::test]
async fn test_openai_compatible_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_schema"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&idea().to_string())))
        .expect(1)
        .mount(&server)
        .await;

    let idea = openai_generator(&server)
        .await
        .generate_content_idea(FESTIVAL, BRAND, INSIGHT)
        .await
        .unwrap();
    assert_eq!(idea.copy_line(), "Play sweet this Holi");
    assert_eq!(idea.technique(), Some(Technique::Contrast));
}

#[tokio::test]
async fn test_openai_compatible_fenced_json_is_accepted() {
    let server = MockServer::start().await;
    let fenced = format!("Here you go:\n```json\n{}\n```", idea());
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(&fenced)))
        .mount(&server)
        .await;

    let idea = openai_generator(&server)
        .await
        .generate_content_idea(FESTIVAL, BRAND, INSIGHT)
        .await
        .unwrap();
    assert_eq!(idea.format(), "Instagram reel");
}

#[tokio::test]
async fn test_openai_compatible_prose_answer_is_invalid_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_body("Sorry, I only write poems about chocolate.")),
        )
        .mount(&server)
        .await;

    let err = openai_generator(&server)
        .await
        .generate_content_idea(FESTIVAL, BRAND, INSIGHT)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidOutput);
    assert_eq!(
        err.raw_text.as_deref(),
        Some("Sorry, I only write poems about chocolate.")
    );
}

#[tokio::test]
async fn test_gemini_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "gm-test"))
        .and(body_partial_json(json!({
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {"required": ["idea", "format", "visualCue", "copyLine", "rationale"]}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(&idea().to_string())))
        .expect(1)
        .mount(&server)
        .await;

    let idea = gemini_generator(&server)
        .await
        .generate_content_idea(FESTIVAL, BRAND, INSIGHT)
        .await
        .unwrap();
    assert_eq!(idea.visual_cue(), "Powdered colours bursting over purple wrappers");
}

#[tokio::test]
async fn test_gemini_blank_field_is_invalid_output() {
    let server = MockServer::start().await;
    let mut answer = idea();
    answer["copyLine"] = json!("   ");
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(&answer.to_string())))
        .mount(&server)
        .await;

    let err = gemini_generator(&server)
        .await
        .generate_content_idea(FESTIVAL, BRAND, INSIGHT)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidOutput);
    assert_eq!(err.violated_fields(), vec!["copyLine"]);
    assert!(err.retryable);
}

#[tokio::test]
async fn test_gemini_rate_limit_is_transient_backend_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let err = gemini_generator(&server)
        .await
        .generate_content_idea(FESTIVAL, BRAND, INSIGHT)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendFailure);
    assert_eq!(err.cause, Some(BackendCause::RateLimit));
    assert!(err.retryable);
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(&idea().to_string())))
        .expect(0)
        .mount(&server)
        .await;

    let err = gemini_generator(&server)
        .await
        .generate_content_idea("Di", "C", "short")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}
