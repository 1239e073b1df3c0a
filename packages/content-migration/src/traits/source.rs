//! Read-only access to the legacy content repository.

use async_trait::async_trait;

use crate::error::CollaboratorResult;
use crate::types::{CategoryRecord, ContentRecord, VersionRecord};

/// Client for the legacy content-management backend.
///
/// `Ok(None)` / an empty list means "not found". `Err` is reserved for
/// transport problems, so callers can tell an absent node from an outage.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Fetch a category and its child references down to `depth` levels.
    async fn fetch_category(&self, key: i64, depth: u32) -> CollaboratorResult<Option<CategoryRecord>>;

    /// List the content items filed under a category.
    ///
    /// `offset`/`limit` page through large categories; `None` means the
    /// backend's default.
    async fn fetch_content_by_category(
        &self,
        key: i64,
        depth: u32,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> CollaboratorResult<Vec<ContentRecord>>;

    /// Fetch a single content item.
    async fn fetch_content(&self, key: i64) -> CollaboratorResult<Option<ContentRecord>>;

    /// Fetch a single version.
    async fn fetch_version(&self, key: i64) -> CollaboratorResult<Option<VersionRecord>>;
}
