//! Search index writes and durable job-status storage.

use async_trait::async_trait;

use crate::error::CollaboratorResult;
use crate::types::{Document, IndexAck, JobId, MigrationStatusData, NodeKind};

/// Target search engine. Doubles as the durable job store.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Upsert a document. `Ok(None)` means the store refused it.
    async fn index(&self, kind: NodeKind, document: &Document) -> CollaboratorResult<Option<IndexAck>>;

    /// Write a job's full status record, replacing any previous copy.
    async fn persist_job_status(&self, data: &MigrationStatusData) -> CollaboratorResult<()>;

    /// Read a previously persisted job status record.
    async fn load_job_status(&self, job_id: JobId) -> CollaboratorResult<Option<MigrationStatusData>>;
}
