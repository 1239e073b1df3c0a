//! Migration job parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::keys::NodeKind;

/// Parameters for a job rooted at a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryParams {
    pub key: i64,
    /// Recurse into child categories (flags propagate unchanged)
    pub with_children: bool,
    /// Include the content items listed under each category
    pub with_content: bool,
    /// Include non-current versions of each content item
    pub with_versions: bool,
}

/// Parameters for a job rooted at a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentParams {
    pub key: i64,
    pub with_versions: bool,
}

/// Parameters for a job that migrates a single version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionParams {
    pub key: i64,
}

/// What a job migrates. Immutable once the job starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationParams {
    Category(CategoryParams),
    Content(ContentParams),
    Version(VersionParams),
}

impl MigrationParams {
    pub fn category(key: i64, with_children: bool, with_content: bool, with_versions: bool) -> Self {
        MigrationParams::Category(CategoryParams {
            key,
            with_children,
            with_content,
            with_versions,
        })
    }

    pub fn content(key: i64, with_versions: bool) -> Self {
        MigrationParams::Content(ContentParams { key, with_versions })
    }

    pub fn version(key: i64) -> Self {
        MigrationParams::Version(VersionParams { key })
    }

    pub fn key(&self) -> i64 {
        match self {
            MigrationParams::Category(p) => p.key,
            MigrationParams::Content(p) => p.key,
            MigrationParams::Version(p) => p.key,
        }
    }

    pub fn root_kind(&self) -> NodeKind {
        match self {
            MigrationParams::Category(_) => NodeKind::Category,
            MigrationParams::Content(_) => NodeKind::Content,
            MigrationParams::Version(_) => NodeKind::Version,
        }
    }

    /// Registry key: root kind plus root key.
    pub fn job_key(&self) -> JobKey {
        JobKey {
            kind: self.root_kind(),
            key: self.key(),
        }
    }
}

/// Stable identity of a job request, used for idempotent submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub kind: NodeKind,
    pub key: i64,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_combines_kind_and_key() {
        let category = MigrationParams::category(5, true, true, false);
        let content = MigrationParams::content(5, false);

        assert_eq!(category.job_key().to_string(), "category:5");
        assert_ne!(category.job_key(), content.job_key());
    }

    #[test]
    fn params_serialize_with_type_tag() {
        let params = MigrationParams::content(20, true);
        let json = serde_json::to_value(params).unwrap();

        assert_eq!(json["type"], "content");
        assert_eq!(json["key"], 20);
        assert_eq!(json["with_versions"], true);

        let back: MigrationParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
