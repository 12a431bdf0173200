// prompt.rs -- Placeholder templates, parsed once and rendered per request.

use serde_json::Value;

use festive_spark_types::{Error, Spec};

use crate::validator::Validated;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A prompt template with `{{name}}` placeholders.
///
/// The source is split into literal and placeholder segments at parse time.
/// Rendering only concatenates, so a field value that itself contains
/// `{{...}}` comes out verbatim and is never expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template. `{{{name}}}` is accepted as a synonym for `{{name}}`.
    pub fn parse(source: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            literal.push_str(&rest[..start]);
            let after_open = &rest[start..];
            let (open, close) = if after_open.starts_with("{{{") {
                ("{{{", "}}}")
            } else {
                ("{{", "}}")
            };
            let body = &after_open[open.len()..];
            let end = body.find(close).ok_or_else(|| {
                Error::configuration(format!(
                    "Unterminated placeholder at byte {start} of prompt template"
                ))
            })?;

            let name = body[..end].trim();
            if !is_identifier(name) {
                return Err(Error::configuration(format!(
                    "Invalid placeholder name '{name}' in prompt template"
                )));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name.to_string()));
            rest = &body[end + close.len()..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Fail if any placeholder names a field the spec does not declare.
    pub fn check_against(&self, spec: &Spec) -> Result<(), Error> {
        let unknown: Vec<&str> = self
            .placeholders()
            .into_iter()
            .filter(|name| !spec.contains(name))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "Prompt template references undeclared fields: {}",
                unknown.join(", ")
            )))
        }
    }

    /// Substitute validated field values. Absent optional fields render empty.
    pub fn render(&self, fields: &Validated) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match fields.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => {}
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        out
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
