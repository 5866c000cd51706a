//! Domain types shared by the store adapters and the retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type DocumentId = String;
pub type Metadata = BTreeMap<String, MetaValue>;

/// A primitive metadata value. Stores only accept flat, scalar metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    /// Converts a JSON scalar. Nested objects, arrays and nulls have no
    /// metadata representation and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Builds flat metadata from a JSON object, dropping every complex value.
pub fn metadata_from_json(map: &serde_json::Map<String, serde_json::Value>) -> Metadata {
    map.iter()
        .filter_map(|(k, v)| MetaValue::from_json(v).map(|mv| (k.clone(), mv)))
        .collect()
}

/// A retrievable unit.
///
/// - `id`: stable identifier; raw search hits may lack one until enrichment
/// - `sequence_index`: position within the most recent result set, reassigned
///   on every search and meaningless outside it
/// - `content`: the text payload
/// - `metadata`: flat scalar attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<usize>,
    #[serde(rename = "text")]
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self { id: None, sequence_index: None, content: content.into(), metadata: Metadata::new() }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Copy with identity stripped, leaving only what the document says.
    #[must_use]
    pub fn without_id(&self) -> Self {
        Self { id: None, sequence_index: None, ..self.clone() }
    }

    /// Equality on content and metadata, ignoring `id` and `sequence_index`.
    pub fn same_payload(&self, other: &Self) -> bool {
        self.content == other.content && self.metadata == other.metadata
    }
}

/// How the store ranks candidates for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    #[serde(alias = "Similarity")]
    Similarity,
    #[serde(alias = "MMR", alias = "Mmr")]
    Mmr,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "mmr" => Ok(Self::Mmr),
            other => Err(format!("unknown search type '{other}' (expected similarity or mmr)")),
        }
    }
}
