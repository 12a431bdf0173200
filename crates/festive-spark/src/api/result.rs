// api/result.rs -- The value a successful generation returns, and the
// stages a generation moves through.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use festive_spark_types::{BackendResponse, Error, FinishReason, Usage};

use crate::validator::Validated;

/// Validated output of one generation.
///
/// The field mapping always satisfies the pipeline's output spec: the only
/// constructor takes a `Validated`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    fields: Map<String, Value>,
    pub request_id: String,
    pub backend: String,
    pub model: String,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

impl GenerationResult {
    pub(crate) fn new(output: Validated, response: &BackendResponse, request_id: &str) -> Self {
        Self {
            fields: output.into_fields(),
            request_id: request_id.to_string(),
            backend: response.backend.clone(),
            model: response.model.clone(),
            usage: response.usage.clone(),
            finish_reason: response.finish_reason.clone(),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Decode the output fields into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            Error::configuration(format!(
                "Generated fields do not match the target type: {e}"
            ))
        })
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Where a generation currently is.
///
/// A generation starts `Idle`, walks forward through the middle stages and
/// ends in exactly one of `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ValidatingInput,
    Rendering,
    AwaitingBackend,
    ValidatingOutput,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ValidatingInput => "validating_input",
            Self::Rendering => "rendering",
            Self::AwaitingBackend => "awaiting_backend",
            Self::ValidatingOutput => "validating_output",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
