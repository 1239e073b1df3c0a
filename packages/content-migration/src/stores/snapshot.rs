//! Source repository and transformer backed by a JSON tree export.
//!
//! ```json
//! {
//!   "categories": [{ "key": 5, "name": "News", "children": [6], "contents": [10, 11] }],
//!   "contents":   [{ "key": 10, "name": "Launch", "current_version": 100,
//!                    "versions": [100, 101], "binaries": [{ "key": 1000, "name": "logo.png" }] }],
//!   "versions":   [{ "key": 101, "content_key": 10 }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{CollaboratorResult, Result};
use crate::traits::{source::SourceRepository, transformer::DocumentTransformer};
use crate::types::{BinaryRef, CategoryRecord, ContentRecord, Document, NodeKind, VersionRecord};

/// A category entry in a snapshot, with the content filed under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCategory {
    pub key: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub children: Vec<i64>,
    #[serde(default)]
    pub contents: Vec<i64>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// Serialized form of a whole content tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    #[serde(default)]
    pub categories: Vec<SnapshotCategory>,
    #[serde(default)]
    pub contents: Vec<ContentRecord>,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

impl TreeSnapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&raw)
    }
}

/// Serves a [`TreeSnapshot`] as both the source repository and the
/// document transformer.
#[derive(Debug, Default)]
pub struct SnapshotRepository {
    categories: HashMap<i64, SnapshotCategory>,
    contents: HashMap<i64, ContentRecord>,
    versions: HashMap<i64, VersionRecord>,
}

impl SnapshotRepository {
    pub fn new(snapshot: TreeSnapshot) -> Self {
        info!(
            categories = snapshot.categories.len(),
            contents = snapshot.contents.len(),
            versions = snapshot.versions.len(),
            "Loaded tree snapshot"
        );

        Self {
            categories: snapshot.categories.into_iter().map(|c| (c.key, c)).collect(),
            contents: snapshot.contents.into_iter().map(|c| (c.key, c)).collect(),
            versions: snapshot.versions.into_iter().map(|v| (v.key, v)).collect(),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(TreeSnapshot::load(path).await?))
    }
}

#[async_trait]
impl SourceRepository for SnapshotRepository {
    async fn fetch_category(&self, key: i64, _depth: u32) -> CollaboratorResult<Option<CategoryRecord>> {
        Ok(self.categories.get(&key).map(|c| CategoryRecord {
            key: c.key,
            name: c.name.clone(),
            children: c.children.clone(),
            fields: c.fields.clone(),
        }))
    }

    async fn fetch_content_by_category(
        &self,
        key: i64,
        _depth: u32,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> CollaboratorResult<Vec<ContentRecord>> {
        let Some(category) = self.categories.get(&key) else {
            return Ok(Vec::new());
        };

        Ok(category
            .contents
            .iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .filter_map(|content_key| self.contents.get(content_key).cloned())
            .collect())
    }

    async fn fetch_content(&self, key: i64) -> CollaboratorResult<Option<ContentRecord>> {
        Ok(self.contents.get(&key).cloned())
    }

    async fn fetch_version(&self, key: i64) -> CollaboratorResult<Option<VersionRecord>> {
        Ok(self.versions.get(&key).cloned())
    }
}

#[async_trait]
impl DocumentTransformer for SnapshotRepository {
    async fn build_from_content(&self, key: i64) -> CollaboratorResult<Option<Document>> {
        Ok(self.contents.get(&key).map(|content| {
            Document::new(
                NodeKind::Content,
                key,
                json!({
                    "name": content.name,
                    "current_version": content.current_version,
                    "versions": content.versions,
                    "binaries": content.binaries.iter().map(|b| b.key).collect::<Vec<_>>(),
                    "fields": content.fields,
                }),
            )
        }))
    }

    async fn build_from_version(&self, key: i64) -> CollaboratorResult<Option<Document>> {
        // A version without its owning content cannot be titled
        let Some(version) = self.versions.get(&key) else {
            return Ok(None);
        };
        let Some(content) = self.contents.get(&version.content_key) else {
            return Ok(None);
        };

        Ok(Some(Document::new(
            NodeKind::Version,
            key,
            json!({
                "content_key": content.key,
                "name": content.name,
                "current": content.current_version == key,
                "fields": version.fields,
            }),
        )))
    }

    async fn build_category(&self, key: i64) -> CollaboratorResult<Option<Document>> {
        Ok(self.categories.get(&key).map(|category| {
            Document::new(
                NodeKind::Category,
                key,
                json!({
                    "name": category.name,
                    "children": category.children,
                    "fields": category.fields,
                }),
            )
        }))
    }

    async fn build_binary(
        &self,
        binary: &BinaryRef,
        content_key: i64,
        version_key: i64,
    ) -> CollaboratorResult<Option<Document>> {
        if !self.contents.contains_key(&content_key) {
            return Ok(None);
        }

        Ok(Some(Document::new(
            NodeKind::Binary,
            binary.key,
            json!({
                "name": binary.name,
                "content_key": content_key,
                "version_key": version_key,
            }),
        )))
    }
}
