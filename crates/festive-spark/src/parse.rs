// parse.rs -- Turning a backend payload into a field mapping.
//
// Parsing only decides the shape; whether the fields are acceptable is left
// entirely to the output validator.

use std::collections::HashMap;

use serde_json::{Map, Value};

use festive_spark_types::{BackendPayload, Spec};

/// A field mapping extracted from a backend payload, not yet validated.
pub type ParsedPayload = Map<String, Value>;

/// The payload could not be read as a field mapping at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub raw_text: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raw_text: raw_text.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Strategy for reading backend output.
pub trait OutputParser: Send + Sync {
    fn parse(&self, payload: &BackendPayload, spec: &Spec) -> Result<ParsedPayload, ParseError>;
}

/// Reads a JSON object out of the payload.
///
/// Structured payloads pass through. Text may be wrapped in a Markdown code
/// fence or surrounded by prose; the first complete `{...}` object is
/// decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOutputParser;

impl OutputParser for JsonOutputParser {
    fn parse(&self, payload: &BackendPayload, _spec: &Spec) -> Result<ParsedPayload, ParseError> {
        let text = match payload {
            BackendPayload::Structured(map) => return Ok(map.clone()),
            BackendPayload::Text(text) => text,
        };

        let body = strip_code_fence(text).trim();
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => return Err(ParseError::new("output JSON is not an object", text.as_str())),
            Err(_) => {}
        }

        // Prose may surround the object and contain braces of its own: try
        // each `{` and keep the first complete object that decodes there.
        let mut first_error = None;
        for (start, _) in body.match_indices('{') {
            let mut values = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
            match values.next() {
                Some(Ok(Value::Object(map))) => return Ok(map),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                _ => {}
            }
        }

        match first_error {
            Some(e) => Err(ParseError::new(
                format!("output is not valid JSON: {e}"),
                text.as_str(),
            )),
            None => Err(ParseError::new("no JSON object found in output", text.as_str())),
        }
    }
}

/// Content of the first fenced block, or the whole text when there is none.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the info string (e.g. "json") on the fence line.
    let content = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };
    match content.find("```") {
        Some(close) => &content[..close],
        None => content,
    }
}

/// Reads `Label: value` lines, matching labels to spec fields loosely.
///
/// `Visual Cue:`, `visual_cue:` and `**visualCue:**` all land in `visualCue`.
/// Lines that carry no recognised label continue the previous field.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabeledTextParser;

impl OutputParser for LabeledTextParser {
    fn parse(&self, payload: &BackendPayload, spec: &Spec) -> Result<ParsedPayload, ParseError> {
        let text = match payload {
            BackendPayload::Structured(map) => return Ok(map.clone()),
            BackendPayload::Text(text) => text,
        };

        let labels: HashMap<String, &str> = spec
            .field_names()
            .map(|name| (normalize_label(name), name))
            .collect();

        let mut collected: Vec<(&str, String)> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let unmarked = line.trim_start_matches(['-', '*', ' ']);

            let labelled = unmarked.split_once(':').and_then(|(label, value)| {
                let label = label.trim().trim_end_matches('*');
                labels
                    .get(&normalize_label(label))
                    .map(|field| (*field, value.trim_start_matches('*').trim()))
            });

            match labelled {
                Some((field, value)) => collected.push((field, value.to_string())),
                None => {
                    if let Some((_, current)) = collected.last_mut() {
                        if !current.is_empty() {
                            current.push('\n');
                        }
                        current.push_str(line);
                    }
                }
            }
        }

        if collected.is_empty() {
            return Err(ParseError::new(
                "no labelled fields found in output",
                text.as_str(),
            ));
        }

        let mut map = Map::new();
        for (field, value) in collected {
            // A repeated label keeps its first occurrence.
            map.entry(field).or_insert(Value::String(value));
        }
        Ok(map)
    }
}

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
