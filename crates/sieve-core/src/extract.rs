//! Text extraction over loosely structured payloads.
//!
//! Ingest sources hand us plain strings, JSON objects, arrays of either, or
//! several JSON values glued together. `Payload` tags those shapes up front so
//! extraction is a plain recursive descent instead of runtime type probing.

use serde_json::Value;

/// Keys whose string value is taken as the text of a structured record.
pub const TEXT_KEYS: [&str; 3] = ["text", "page_content", "content"];

const ITEM_SEPARATOR: &str = "\n\n";
const VALUE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(Vec<(String, Payload)>),
    Sequence(Vec<Payload>),
}

impl Payload {
    /// Tags a JSON value. Inside objects, non-string scalars and nulls carry
    /// no text and are dropped.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Null => Self::Sequence(Vec::new()),
            Value::Bool(_) | Value::Number(_) => Self::Text(value.to_string()),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Structured(
                map.into_iter()
                    .filter(|(_, v)| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_)))
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn extract_text(&self) -> String {
        let mut out = Vec::new();
        self.collect(&mut out);
        out.retain(|t| !t.is_empty());
        out.join(ITEM_SEPARATOR).trim().to_string()
    }

    fn collect(&self, out: &mut Vec<String>) {
        match self {
            Self::Text(s) => out.push(s.trim().to_string()),
            Self::Sequence(items) => items.iter().for_each(|p| p.collect(out)),
            Self::Structured(fields) => {
                let preferred = fields.iter().find_map(|(k, v)| match v {
                    Self::Text(s) if TEXT_KEYS.contains(&k.as_str()) => Some(s),
                    _ => None,
                });
                match preferred {
                    Some(text) => out.push(text.trim().to_string()),
                    None => fields.iter().for_each(|(_, v)| v.collect(out)),
                }
            }
        }
    }
}

/// Extracts text from a raw string that may hold JSON.
///
/// A single JSON value is descended into. Several concatenated JSON values
/// are each extracted and joined with a `---` rule. Anything that does not
/// parse completely as JSON is returned trimmed, verbatim.
pub fn extract_text_from_str(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if let Ok(value) = serde_json::from_str::<Value>(s) {
        return Payload::from_json(value).extract_text();
    }

    let mut values = Vec::new();
    for item in serde_json::Deserializer::from_str(s).into_iter::<Value>() {
        match item {
            Ok(v) => values.push(v),
            Err(_) => return s.to_string(),
        }
    }
    let texts: Vec<String> = values
        .into_iter()
        .map(|v| Payload::from_json(v).extract_text())
        .filter(|t| !t.is_empty())
        .collect();
    if texts.is_empty() {
        return s.to_string();
    }
    texts.join(VALUE_SEPARATOR)
}
