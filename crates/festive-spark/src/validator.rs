// validator.rs -- Schema validator (Layer 2).
//
// Checks a candidate mapping against a spec, coercing values to their
// declared types. Every violated field is reported; nothing short-circuits.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use festive_spark_types::{
    Error, FieldSpec, FieldType, FieldViolation, Spec, ValidationError, Violation,
};

/// A mapping that has passed validation against a spec.
///
/// Only `validate` can construct one, so holding a `Validated` proves every
/// required field is present and every constraint holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    fields: Map<String, Value>,
}

impl Validated {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Decode the normalized mapping into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            Error::configuration(format!(
                "Validated fields do not match the target type: {e}"
            ))
        })
    }
}

/// Validate `candidate` against `spec`.
///
/// On success the returned mapping holds only spec fields, in spec order,
/// with strings trimmed, numeric strings converted to numbers and enum values
/// in their canonical spelling. Unknown fields are dropped. Validating an
/// already-normalized mapping returns it unchanged.
pub fn validate(spec: &Spec, candidate: &Map<String, Value>) -> Result<Validated, ValidationError> {
    let mut fields = Map::new();
    let mut violations = Vec::new();

    for field in spec.fields() {
        match check_field(field, candidate.get(&field.name)) {
            Ok(Some(value)) => {
                fields.insert(field.name.clone(), value);
            }
            Ok(None) => {}
            Err(violation) => violations.push(violation),
        }
    }

    if violations.is_empty() {
        Ok(Validated { fields })
    } else {
        Err(ValidationError::new(violations))
    }
}

/// Check one field. `Ok(None)` means an optional field that is absent or empty.
fn check_field(field: &FieldSpec, raw: Option<&Value>) -> Result<Option<Value>, FieldViolation> {
    let raw = match raw {
        None | Some(Value::Null) => {
            return if field.required {
                Err(FieldViolation::new(&field.name, Violation::Missing, None))
            } else {
                Ok(None)
            };
        }
        Some(raw) => raw,
    };
    let fail = |violation| Err(FieldViolation::new(&field.name, violation, Some(raw.clone())));

    match &field.field_type {
        FieldType::Number => {
            let (number, normalized) = match raw {
                Value::Number(n) => match n.as_f64() {
                    Some(f) => (f, raw.clone()),
                    None => return fail(wrong_type(&field.field_type)),
                },
                Value::String(s) if s.trim().is_empty() => {
                    return if field.required {
                        fail(Violation::Empty)
                    } else {
                        Ok(None)
                    };
                }
                Value::String(s) => match s.trim().parse::<f64>() {
                    Ok(f) if f.is_finite() => match Number::from_f64(f) {
                        Some(n) => (f, Value::Number(n)),
                        None => return fail(wrong_type(&field.field_type)),
                    },
                    _ => return fail(wrong_type(&field.field_type)),
                },
                _ => return fail(wrong_type(&field.field_type)),
            };
            if let Some(min) = field.minimum {
                if number < min {
                    return fail(Violation::BelowMinimum { min });
                }
            }
            if let Some(max) = field.maximum {
                if number > max {
                    return fail(Violation::AboveMaximum { max });
                }
            }
            Ok(Some(normalized))
        }
        FieldType::String | FieldType::Enum(_) => {
            let text = match raw {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return fail(wrong_type(&field.field_type)),
            };
            if text.is_empty() {
                return if field.required {
                    fail(Violation::Empty)
                } else {
                    Ok(None)
                };
            }

            let actual = text.chars().count();
            if let Some(min) = field.min_length {
                if actual < min {
                    return fail(Violation::TooShort { min, actual });
                }
            }
            if let Some(max) = field.max_length {
                if actual > max {
                    return fail(Violation::TooLong { max, actual });
                }
            }

            if let FieldType::Enum(allowed) = &field.field_type {
                return match allowed.iter().find(|a| a.eq_ignore_ascii_case(&text)) {
                    Some(canonical) => Ok(Some(Value::String(canonical.clone()))),
                    None => fail(Violation::NotAllowed {
                        allowed: allowed.clone(),
                    }),
                };
            }
            Ok(Some(Value::String(text)))
        }
    }
}

fn wrong_type(field_type: &FieldType) -> Violation {
    Violation::WrongType {
        expected: field_type.name().to_string(),
    }
}
