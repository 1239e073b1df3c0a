//! Node kinds and per-kind key sets.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The four disjoint kinds of node in the source tree.
///
/// Keys are unique within a kind, not across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Category,
    Content,
    Version,
    Binary,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Category,
        NodeKind::Content,
        NodeKind::Version,
        NodeKind::Binary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Category => "category",
            NodeKind::Content => "content",
            NodeKind::Version => "version",
            NodeKind::Binary => "binary",
        }
    }

    /// Default search index for documents of this kind.
    pub fn index_name(&self) -> &'static str {
        match self {
            NodeKind::Category => "categories",
            NodeKind::Content => "contents",
            NodeKind::Version => "versions",
            NodeKind::Binary => "binaries",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A work-set: one set of keys per node kind.
///
/// Revisiting a node through a second path is a no-op, which is what makes
/// enumeration safe on a tree that is really a DAG (or worse, has cycles).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsKeys {
    #[serde(default)]
    pub categories: BTreeSet<i64>,
    #[serde(default)]
    pub contents: BTreeSet<i64>,
    #[serde(default)]
    pub versions: BTreeSet<i64>,
    #[serde(default)]
    pub binaries: BTreeSet<i64>,
}

impl DocumentsKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: NodeKind) -> &BTreeSet<i64> {
        match kind {
            NodeKind::Category => &self.categories,
            NodeKind::Content => &self.contents,
            NodeKind::Version => &self.versions,
            NodeKind::Binary => &self.binaries,
        }
    }

    fn get_mut(&mut self, kind: NodeKind) -> &mut BTreeSet<i64> {
        match kind {
            NodeKind::Category => &mut self.categories,
            NodeKind::Content => &mut self.contents,
            NodeKind::Version => &mut self.versions,
            NodeKind::Binary => &mut self.binaries,
        }
    }

    /// Add a key. Returns `false` if it was already present.
    pub fn insert(&mut self, kind: NodeKind, key: i64) -> bool {
        self.get_mut(kind).insert(key)
    }

    /// Remove a key. Returns `false` if it was not present.
    pub fn remove(&mut self, kind: NodeKind, key: i64) -> bool {
        self.get_mut(kind).remove(&key)
    }

    pub fn contains(&self, kind: NodeKind, key: i64) -> bool {
        self.get(kind).contains(&key)
    }

    pub fn count(&self) -> DocumentsCount {
        DocumentsCount {
            categories: self.categories.len(),
            contents: self.contents.len(),
            versions: self.versions.len(),
            binaries: self.binaries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        NodeKind::ALL.iter().all(|kind| self.get(*kind).is_empty())
    }
}

/// Sizes of a [`DocumentsKeys`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsCount {
    pub categories: usize,
    pub contents: usize,
    pub versions: usize,
    pub binaries: usize,
}

impl DocumentsCount {
    pub fn get(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Category => self.categories,
            NodeKind::Content => self.contents,
            NodeKind::Version => self.versions,
            NodeKind::Binary => self.binaries,
        }
    }

    pub fn total(&self) -> usize {
        self.categories + self.contents + self.versions + self.binaries
    }
}

impl fmt::Display for DocumentsCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} categories, {} contents, {} versions, {} binaries",
            self.categories, self.contents, self.versions, self.binaries
        )
    }
}
