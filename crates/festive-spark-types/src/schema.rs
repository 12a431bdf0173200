// Field specs -- declarative contracts for input and output mappings.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;

/// Semantic type of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    /// A string restricted to one of the listed values.
    Enum(Vec<String>),
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Enum(_) => "enum",
        }
    }
}

/// Contract for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Minimum length in characters, inclusive. Strings and enums only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum length in characters, inclusive. Strings and enums only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Inclusive lower bound. Numbers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound. Numbers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub description: String,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            description: String::new(),
        }
    }

    /// A required string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// A required number field.
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    /// A required enum field.
    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::Enum(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Shorthand for `min_length(min).max_length(max)`.
    pub fn length(self, min: usize, max: usize) -> Self {
        self.min_length(min).max_length(max)
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn check(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("Field name must not be empty"));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(Error::configuration(format!(
                    "Field '{}': min_length {min} exceeds max_length {max}",
                    self.name
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(Error::configuration(format!(
                    "Field '{}': minimum {min} exceeds maximum {max}",
                    self.name
                )));
            }
        }
        if let FieldType::Enum(values) = &self.field_type {
            if values.is_empty() {
                return Err(Error::configuration(format!(
                    "Field '{}': enum must list at least one value",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// JSON Schema fragment for this field.
    pub fn json_schema(&self) -> Value {
        let mut schema = serde_json::Map::new();
        match &self.field_type {
            FieldType::String => {
                schema.insert("type".into(), json!("string"));
            }
            FieldType::Number => {
                schema.insert("type".into(), json!("number"));
            }
            FieldType::Enum(values) => {
                schema.insert("type".into(), json!("string"));
                schema.insert("enum".into(), json!(values));
            }
        }
        if !self.description.is_empty() {
            schema.insert("description".into(), json!(self.description));
        }
        if let Some(min) = self.min_length {
            schema.insert("minLength".into(), json!(min));
        }
        if let Some(max) = self.max_length {
            schema.insert("maxLength".into(), json!(max));
        }
        if let Some(min) = self.minimum {
            schema.insert("minimum".into(), json!(min));
        }
        if let Some(max) = self.maximum {
            schema.insert("maximum".into(), json!(max));
        }
        Value::Object(schema)
    }
}

/// An ordered, immutable list of field contracts.
///
/// Built once at startup and shared read-only (usually behind an `Arc`)
/// by every generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldSpec>", into = "Vec<FieldSpec>")]
pub struct Spec {
    fields: Vec<FieldSpec>,
}

/// Contract for caller-supplied input.
pub type InputSpec = Spec;
/// Contract for the backend's structured response.
pub type OutputSpec = Spec;

impl Spec {
    /// Build a spec, rejecting duplicate names and inconsistent bounds.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for field in &fields {
            field.check()?;
            if !seen.insert(field.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Duplicate field name '{}' in spec",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON Schema object describing a conforming mapping.
    ///
    /// Unknown fields are tolerated by the validator, but the schema sent to a
    /// backend forbids them so the model does not pad its answer.
    pub fn json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.json_schema());
            if field.required {
                required.push(json!(field.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

impl TryFrom<Vec<FieldSpec>> for Spec {
    type Error = Error;

    fn try_from(fields: Vec<FieldSpec>) -> Result<Self, Self::Error> {
        Spec::new(fields)
    }
}

impl From<Spec> for Vec<FieldSpec> {
    fn from(spec: Spec) -> Self {
        spec.fields
    }
}
