use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a backend produced: already-structured fields or raw text that still
/// needs parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum BackendPayload {
    Structured(Map<String, Value>),
    Text(String),
}

impl BackendPayload {
    /// Text view of the payload, for diagnostics.
    pub fn raw_text(&self) -> String {
        match self {
            Self::Structured(map) => Value::Object(map.clone()).to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// A backend's answer plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    pub id: String,
    pub model: String,
    pub backend: String,
    pub payload: BackendPayload,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Dual representation: normalized reason + backend-native raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishReason {
    pub reason: String, // "stop", "length", "content_filter", "error", "other"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl FinishReason {
    pub fn stop() -> Self {
        Self {
            reason: "stop".into(),
            raw: None,
        }
    }
    pub fn length() -> Self {
        Self {
            reason: "length".into(),
            raw: None,
        }
    }
    pub fn content_filter() -> Self {
        Self {
            reason: "content_filter".into(),
            raw: None,
        }
    }
    pub fn other() -> Self {
        Self {
            reason: "other".into(),
            raw: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            raw: None,
        }
    }
}
