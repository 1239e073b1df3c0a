//! Conversion of raw records into indexable documents.

use async_trait::async_trait;

use crate::error::CollaboratorResult;
use crate::types::{BinaryRef, Document};

/// Builds search documents from source nodes.
///
/// `Ok(None)` means a complete document could not be assembled (missing
/// required fields). Expected absence is never an `Err`.
#[async_trait]
pub trait DocumentTransformer: Send + Sync {
    async fn build_from_content(&self, key: i64) -> CollaboratorResult<Option<Document>>;

    async fn build_from_version(&self, key: i64) -> CollaboratorResult<Option<Document>>;

    async fn build_category(&self, key: i64) -> CollaboratorResult<Option<Document>>;

    /// Build a binary document in the context of its owning content and version.
    async fn build_binary(
        &self,
        binary: &BinaryRef,
        content_key: i64,
        version_key: i64,
    ) -> CollaboratorResult<Option<Document>>;
}
