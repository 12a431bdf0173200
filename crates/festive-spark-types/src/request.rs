use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::schema::OutputSpec;

/// The input field values for one generation.
///
/// Values are raw: the pipeline validates and normalizes them against the
/// input spec before anything else happens.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationRequest {
    fields: Map<String, Value>,
}

impl GenerationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for one field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for GenerationRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// What the pipeline hands to a backend: a rendered prompt plus the shape the
/// answer must take.
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    /// Per-invocation id for log correlation.
    pub request_id: String,
    pub prompt: String,
    pub output_spec: Arc<OutputSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl BackendRequest {
    pub fn new(prompt: impl Into<String>, output_spec: Arc<OutputSpec>) -> Self {
        Self {
            request_id: String::new(),
            prompt: prompt.into(),
            output_spec,
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Builder-style setter for request_id.
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Builder-style setter for the system instruction.
    pub fn system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    /// Builder-style setter for temperature.
    pub fn temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Builder-style setter for max_tokens.
    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
