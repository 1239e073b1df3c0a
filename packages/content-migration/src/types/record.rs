//! Raw source records, indexable documents and index acknowledgements.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::keys::NodeKind;

/// A category as returned by the source repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub key: i64,
    #[serde(default)]
    pub name: String,
    /// Child category references
    #[serde(default)]
    pub children: Vec<i64>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// A content item as returned by the source repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub key: i64,
    #[serde(default)]
    pub name: String,
    /// Key of the version currently published for this item
    pub current_version: i64,
    /// Every version reference, the current one included
    #[serde(default)]
    pub versions: Vec<i64>,
    /// Binaries attached to the current version
    #[serde(default)]
    pub binaries: Vec<BinaryRef>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl ContentRecord {
    pub fn new(key: i64, current_version: i64) -> Self {
        Self {
            key,
            name: String::new(),
            current_version,
            versions: vec![current_version],
            binaries: Vec::new(),
            fields: serde_json::Value::Null,
        }
    }

    /// Replace the version references.
    pub fn with_versions(mut self, versions: &[i64]) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// Attach a binary to the current version.
    pub fn with_binary(mut self, key: i64) -> Self {
        self.binaries.push(BinaryRef {
            key,
            name: format!("binary-{key}"),
        });
        self
    }

    /// Version references other than the current one, in source order.
    pub fn other_versions(&self) -> impl Iterator<Item = i64> + '_ {
        self.versions
            .iter()
            .copied()
            .filter(move |v| *v != self.current_version)
    }
}

/// A content version as returned by the source repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub key: i64,
    pub content_key: i64,
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// Reference to a binary attached to a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRef {
    pub key: i64,
    #[serde(default)]
    pub name: String,
}

/// An indexable document produced by the transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub kind: NodeKind,
    pub key: i64,
    pub body: serde_json::Value,
}

impl Document {
    pub fn new(kind: NodeKind, key: i64, body: serde_json::Value) -> Self {
        Self { kind, key, body }
    }
}

/// Whether an upsert created or replaced the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexResult {
    Created,
    Updated,
}

impl fmt::Display for IndexResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexResult::Created => f.write_str("created"),
            IndexResult::Updated => f.write_str("updated"),
        }
    }
}

/// Successful index acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAck {
    /// Target index name
    pub index: String,
    pub result: IndexResult,
}

impl IndexAck {
    pub fn new(index: impl Into<String>, result: IndexResult) -> Self {
        Self {
            index: index.into(),
            result,
        }
    }
}
