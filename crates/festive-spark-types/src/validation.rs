// Validation failures -- one entry per violated field, collected rather than short-circuited.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The constraint a field failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    /// A required field was absent or `null`.
    Missing,
    /// A required string field was empty or whitespace-only.
    Empty,
    /// The value could not be coerced to the declared type.
    WrongType { expected: String },
    /// String shorter than `min` characters (after trimming).
    TooShort { min: usize, actual: usize },
    /// String longer than `max` characters (after trimming).
    TooLong { max: usize, actual: usize },
    BelowMinimum { min: f64 },
    AboveMaximum { max: f64 },
    /// Enum value not in the allowed set.
    NotAllowed { allowed: Vec<String> },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "is required"),
            Self::Empty => write!(f, "must not be empty"),
            Self::WrongType { expected } => write!(f, "must be a {expected}"),
            Self::TooShort { min, actual } => {
                write!(f, "must be at least {min} characters (got {actual})")
            }
            Self::TooLong { max, actual } => {
                write!(f, "must be at most {max} characters (got {actual})")
            }
            Self::BelowMinimum { min } => write!(f, "must be at least {min}"),
            Self::AboveMaximum { max } => write!(f, "must be at most {max}"),
            Self::NotAllowed { allowed } => write!(f, "must be one of: {}", allowed.join(", ")),
        }
    }
}

/// A single field that failed validation, with the offending value when there was one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub violation: Violation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, violation: Violation, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            violation,
            value,
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.violation)
    }
}

/// Every violation found in one candidate mapping, in spec field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// Names of the violated fields, in the order they were reported.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn violation_for(&self, field: &str) -> Option<&FieldViolation> {
        self.violations.iter().find(|v| v.field == field)
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}
