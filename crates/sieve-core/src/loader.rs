//! Turns files on disk into ingestable documents.
//!
//! `.json` holds one record or an array of records, `.jsonl` one record per
//! line, and `.txt` is a single document. Records may be objects (text under
//! a `text`/`page_content`/`content` key, scalar fields become metadata) or
//! bare strings.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::extract::{extract_text_from_str, Payload, TEXT_KEYS};
use crate::types::{metadata_from_json, Document};

const SUPPORTED: [&str; 3] = ["json", "jsonl", "txt"];

#[derive(Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Loads a single file, or every supported file under a directory in sorted order.
    pub fn load(&self, path: &Path) -> Result<Vec<Document>> {
        if path.is_dir() {
            let files = self.list_files(path);
            if files.is_empty() {
                tracing::warn!(dir = %path.display(), "no loadable files found");
            }
            let mut docs = Vec::new();
            for (i, file) in files.iter().enumerate() {
                tracing::debug!(file = %file.display(), "loading {}/{}", i + 1, files.len());
                docs.extend(self.load_file(file)?);
            }
            tracing::info!(files = files.len(), documents = docs.len(), "loaded documents");
            Ok(docs)
        } else {
            self.load_file(path)
        }
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let raw = self.read_file_content(path)?;
        match extension(path).as_deref() {
            Some("json") => {
                let value: Value = serde_json::from_str(&raw)
                    .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
                match value {
                    Value::Array(items) => Ok(items.into_iter().filter_map(record_to_document).collect()),
                    other => Ok(record_to_document(other).into_iter().collect()),
                }
            }
            Some("jsonl") => {
                let mut docs = Vec::new();
                for (n, line) in raw.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value: Value = serde_json::from_str(line)
                        .map_err(|e| Error::InvalidConfig(format!("{}:{}: {}", path.display(), n + 1, e)))?;
                    docs.extend(record_to_document(value));
                }
                Ok(docs)
            }
            Some("txt") => {
                let content = raw.trim();
                if content.is_empty() {
                    return Ok(vec![]);
                }
                Ok(vec![Document::new(content).with_meta("source", path.to_string_lossy().into_owned())])
            }
            _ => Err(Error::InvalidConfig(format!(
                "unsupported input {} (expected one of {:?})",
                path.display(),
                SUPPORTED
            ))),
        }
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| extension(p).is_some_and(|ext| SUPPORTED.contains(&ext.as_str())))
            .collect();
        files.sort();
        files
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase)
}

/// Objects keep scalar fields as metadata; their text comes from the first
/// text key. Without one, every string or nested field becomes text instead
/// of metadata. The `id` field is never text. Empty records are skipped.
fn record_to_document(value: Value) -> Option<Document> {
    let doc = match value {
        Value::String(s) => Document::new(extract_text_from_str(&s)),
        Value::Object(mut map) => {
            let id = match map.remove("id") {
                Some(Value::String(s)) => Some(s),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            let text_key = TEXT_KEYS.iter().find(|k| map.get(**k).is_some_and(Value::is_string));
            let content = match text_key {
                Some(key) => map
                    .remove(*key)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                None => {
                    let (textual, scalars): (Map<String, Value>, Map<String, Value>) = map
                        .into_iter()
                        .partition(|(_, v)| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_)));
                    map = scalars;
                    Payload::from_json(Value::Object(textual)).extract_text()
                }
            };
            let mut doc = Document::new(content);
            doc.id = id;
            doc.metadata = metadata_from_json(&map);
            doc
        }
        other => Document::new(Payload::from_json(other).extract_text()),
    };
    if doc.content.trim().is_empty() {
        None
    } else {
        Some(doc)
    }
}
