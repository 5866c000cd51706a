//! Resolving caller-supplied result ids against the cached result set.
//!
//! Ids refer to `sequence_index`, not to document ids, and may arrive as
//! numbers or as their string form.

use serde::{Deserialize, Serialize};
use std::fmt;

use sieve_core::{Document, Error, Result};

use crate::results::ResultSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionId {
    Index(i64),
    Number(f64),
    Text(String),
}

impl SelectionId {
    fn matches(&self, index: usize) -> bool {
        match self {
            Self::Index(i) => usize::try_from(*i).is_ok_and(|i| i == index),
            Self::Number(n) => n.fract() == 0.0 && *n >= 0.0 && (*n as usize) == index,
            Self::Text(s) => *s == index.to_string(),
        }
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// What an upstream caller hands over as its selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectionInput {
    #[default]
    Omitted,
    /// A JSON document expected to hold an array of ids.
    Json(String),
    Ids(Vec<SelectionId>),
}

impl SelectionInput {
    /// The requested ids. Blank input and JSON `null` mean no selection.
    pub fn parse(&self) -> Result<Vec<SelectionId>> {
        match self {
            Self::Omitted => Ok(Vec::new()),
            Self::Ids(ids) => Ok(ids.clone()),
            Self::Json(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Self::Json(raw) => serde_json::from_str::<Option<Vec<SelectionId>>>(raw)
                .map(Option::unwrap_or_default)
                .map_err(|e| Error::SelectionParse(format!("expected a JSON array of ids: {e}"))),
        }
    }
}

impl From<&str> for SelectionInput {
    fn from(raw: &str) -> Self {
        Self::Json(raw.to_string())
    }
}

impl From<Vec<SelectionId>> for SelectionInput {
    fn from(ids: Vec<SelectionId>) -> Self {
        Self::Ids(ids)
    }
}

/// Documents of `results` whose position is among `ids`, in result order.
pub fn resolve(results: &ResultSet, ids: &[SelectionId]) -> Vec<Document> {
    results
        .iter()
        .filter(|doc| doc.sequence_index.is_some_and(|idx| ids.iter().any(|id| id.matches(idx))))
        .cloned()
        .collect()
}
