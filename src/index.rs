//! Directory index over a pre-crawled JSON snapshot of the imagery bucket.
//!
//! The snapshot is a nested object keyed by directory segment. Leaves carry
//! their file names under `_files`; any node may carry opaque `_metadata`.
//!
//! ```json
//! {"drcs_activations": {"202405_Flood_TX": {"planet": {"_files": ["a.tif"]}}}}
//! ```
//!
//! The tree is parsed once into [`DirectoryNode`] and never mutated. Lookups
//! never fail hard: a path that does not resolve yields an empty [`Lookup`]
//! carrying a [`Diagnostic`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::IndexError;

/// Top-level key of the index document.
pub const ROOT_KEY: &str = "drcs_activations";
/// Reserved key holding a leaf's file list.
pub const FILES_KEY: &str = "_files";
/// Reserved key holding opaque crawler metadata.
pub const METADATA_KEY: &str = "_metadata";

/// Sibling names reported with a missing segment.
const MAX_SUGGESTIONS: usize = 5;

/// Locations tried, in order, when no index path is given.
pub const DEFAULT_INDEX_CANDIDATES: &[&str] = &[
    "../../s3-crawler/drcs_activations_tif_files.json",
    "../s3-crawler/drcs_activations_tif_files.json",
    "s3-crawler/drcs_activations_tif_files.json",
    "drcs_activations_tif_files.json",
];

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryNode {
    Branch {
        children: BTreeMap<String, DirectoryNode>,
        metadata: Option<Value>,
    },
    Leaf {
        files: Vec<String>,
        metadata: Option<Value>,
    },
}

impl DirectoryNode {
    /// Validating parse of one JSON object. `path` is only used in errors.
    fn from_json(path: &str, value: &Value) -> Result<Self, IndexError> {
        let object = value.as_object().ok_or_else(|| IndexError::MalformedNode {
            path: path.to_string(),
            reason: format!("expected an object, found {}", json_kind(value)),
        })?;
        let metadata = object.get(METADATA_KEY).cloned();

        if let Some(files) = object.get(FILES_KEY) {
            if object.keys().any(|k| !is_reserved(k)) {
                return Err(IndexError::MixedNode {
                    path: path.to_string(),
                });
            }
            return Ok(DirectoryNode::Leaf {
                files: parse_file_list(path, files)?,
                metadata,
            });
        }

        let mut children = BTreeMap::new();
        for (name, child) in object.iter().filter(|(k, _)| !is_reserved(k)) {
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}/{name}")
            };
            children.insert(name.clone(), DirectoryNode::from_json(&child_path, child)?);
        }
        Ok(DirectoryNode::Branch { children, metadata })
    }

    fn child(&self, name: &str) -> Option<&DirectoryNode> {
        match self {
            DirectoryNode::Branch { children, .. } => children.get(name),
            DirectoryNode::Leaf { .. } => None,
        }
    }

    /// Child directory names, sorted.
    pub fn subdirectories(&self) -> Vec<String> {
        match self {
            DirectoryNode::Branch { children, .. } => children.keys().cloned().collect(),
            DirectoryNode::Leaf { .. } => Vec::new(),
        }
    }

    pub fn files(&self) -> Option<&[String]> {
        match self {
            DirectoryNode::Leaf { files, .. } => Some(files),
            DirectoryNode::Branch { .. } => None,
        }
    }

    pub fn metadata(&self) -> Option<&Value> {
        match self {
            DirectoryNode::Branch { metadata, .. } | DirectoryNode::Leaf { metadata, .. } => {
                metadata.as_ref()
            }
        }
    }
}

fn is_reserved(key: &str) -> bool {
    key == FILES_KEY || key == METADATA_KEY
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_file_list(path: &str, value: &Value) -> Result<Vec<String>, IndexError> {
    let malformed = |reason: String| IndexError::MalformedNode {
        path: path.to_string(),
        reason,
    };
    let items = value
        .as_array()
        .ok_or_else(|| malformed(format!("'{FILES_KEY}' must be an array, found {}", json_kind(value))))?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                malformed(format!("'{FILES_KEY}' entries must be strings, found {}", json_kind(item)))
            })
        })
        .collect()
}

/// Why a lookup came back empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    #[error("invalid path: '{path}'")]
    InvalidPath { path: String },

    #[error("directory '{segment}' not found in path: {path}{}", suggestions(.available, .more))]
    PathSegmentNotFound {
        segment: String,
        path: String,
        /// Up to five sibling names at the level where the walk stopped.
        available: Vec<String>,
        /// How many further siblings were not listed.
        more: usize,
    },

    #[error("no files found in: {path}")]
    NoFilesAtPath { path: String },
}

fn suggestions(available: &[String], more: &usize) -> String {
    if available.is_empty() {
        return String::new();
    }
    let mut text = format!(" (available: {}", available.join(", "));
    if *more > 0 {
        text.push_str(&format!(" ... and {more} more"));
    }
    text.push(')');
    text
}

/// Result of an index query: entries, or nothing plus the reason why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    pub entries: Vec<String>,
    pub diagnostic: Option<Diagnostic>,
}

impl Lookup {
    fn found(entries: Vec<String>) -> Self {
        Self {
            entries,
            diagnostic: None,
        }
    }

    fn empty(diagnostic: Diagnostic) -> Self {
        warn!(%diagnostic, "[INDEX] Lookup returned no entries");
        Self {
            entries: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory index loaded from one JSON document.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    /// The whole document; its only child of interest is [`ROOT_KEY`].
    document: DirectoryNode,
}

impl DirectoryIndex {
    /// Load from `explicit` if given, otherwise from the first existing
    /// entry of [`DEFAULT_INDEX_CANDIDATES`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, IndexError> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => DEFAULT_INDEX_CANDIDATES.iter().map(PathBuf::from).collect(),
        };
        Self::discover(&candidates)
    }

    /// Load from the first candidate that exists.
    pub fn discover(candidates: &[PathBuf]) -> Result<Self, IndexError> {
        let Some(path) = candidates.iter().find(|p| p.exists()) else {
            warn!(tried = ?candidates, "[INDEX] No index file found");
            return Err(IndexError::IndexNotFound {
                tried: candidates.to_vec(),
            });
        };
        let raw = fs::read_to_string(path).map_err(|source| IndexError::Read {
            path: path.clone(),
            source,
        })?;
        let index = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "[INDEX] Loaded directory index");
        Ok(index)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, IndexError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, IndexError> {
        let top: &Map<String, Value> = match value.as_object() {
            Some(top) if top.contains_key(ROOT_KEY) => top,
            _ => return Err(IndexError::MissingRoot(ROOT_KEY.to_string())),
        };
        let mut children = BTreeMap::new();
        for (name, child) in top {
            // Crawler summaries sit next to the tree as plain values.
            if !child.is_object() || is_reserved(name) {
                debug!(key = %name, "[INDEX] Skipping non-directory top-level entry");
                continue;
            }
            children.insert(name.clone(), DirectoryNode::from_json(name, child)?);
        }
        Ok(Self {
            document: DirectoryNode::Branch {
                children,
                metadata: top.get(METADATA_KEY).cloned(),
            },
        })
    }

    fn activations(&self) -> Option<&DirectoryNode> {
        self.document.child(ROOT_KEY)
    }

    /// Files stored at `path`, after removing `base_to_strip` from its front.
    ///
    /// The list comes back exactly as stored: no sorting, no deduplication.
    pub fn list_files(&self, path: &str, base_to_strip: &str) -> Lookup {
        let relative = strip_base(path, base_to_strip);
        let segments = segments(relative);
        if segments.is_empty() {
            return Lookup::empty(Diagnostic::InvalidPath {
                path: path.to_string(),
            });
        }
        let Some(start) = self.activations() else {
            return Lookup::empty(Diagnostic::NoFilesAtPath {
                path: path.to_string(),
            });
        };
        let node = match walk(start, &segments, path) {
            Ok(node) => node,
            Err(diagnostic) => return Lookup::empty(diagnostic),
        };
        match node.files() {
            Some(files) => {
                debug!(path, count = files.len(), "[INDEX] Resolved file list");
                Lookup::found(files.to_vec())
            }
            None => Lookup::empty(Diagnostic::NoFilesAtPath {
                path: path.to_string(),
            }),
        }
    }

    /// Child directory names at `path`, walked from the document top, sorted.
    pub fn list_subdirectories(&self, path: &str) -> Lookup {
        let segments = segments(path);
        match walk(&self.document, &segments, path) {
            Ok(node) => Lookup::found(node.subdirectories()),
            Err(diagnostic) => Lookup::empty(diagnostic),
        }
    }

    /// [`list_files`](Self::list_files) with `path/` prepended to each name.
    pub fn resolve_full_paths(&self, path: &str, base_to_strip: &str) -> Lookup {
        let lookup = self.list_files(path, base_to_strip);
        Lookup {
            entries: lookup
                .entries
                .into_iter()
                .map(|name| format!("{path}/{name}"))
                .collect(),
            diagnostic: lookup.diagnostic,
        }
    }
}

/// Remove `base` from the leading segment(s) of `path`.
fn strip_base<'a>(path: &'a str, base: &str) -> &'a str {
    let trimmed = path.trim_start_matches('/');
    let base = base.trim_matches('/');
    if base.is_empty() {
        return trimmed;
    }
    match trimmed.strip_prefix(base) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest,
        _ => trimmed,
    }
}

/// Split on `/`, dropping empty segments from doubled or edge slashes.
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn walk<'n>(
    start: &'n DirectoryNode,
    segments: &[&str],
    path: &str,
) -> Result<&'n DirectoryNode, Diagnostic> {
    let mut current = start;
    for segment in segments {
        match current.child(segment) {
            Some(next) => current = next,
            None => {
                let siblings = current.subdirectories();
                let more = siblings.len().saturating_sub(MAX_SUGGESTIONS);
                return Err(Diagnostic::PathSegmentNotFound {
                    segment: segment.to_string(),
                    path: path.to_string(),
                    available: siblings.into_iter().take(MAX_SUGGESTIONS).collect(),
                    more,
                });
            }
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_base_only_removes_whole_leading_segments() {
        assert_eq!(strip_base("drcs_activations/e/p", "drcs_activations"), "/e/p");
        assert_eq!(strip_base("drcs_activations", "drcs_activations"), "");
        assert_eq!(strip_base("drcs_activations_new/e", "drcs_activations"), "drcs_activations_new/e");
        assert_eq!(strip_base("/e/p", ""), "e/p");
    }

    #[test]
    fn segments_skip_empty_parts() {
        assert_eq!(segments("a//b/"), vec!["a", "b"]);
        assert!(segments("///").is_empty());
    }
}
