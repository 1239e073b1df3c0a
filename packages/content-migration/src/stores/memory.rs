//! In-memory index store for testing and development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::CollaboratorResult;
use crate::traits::index::IndexStore;
use crate::types::{Document, IndexAck, IndexResult, JobId, MigrationStatusData, NodeKind};

/// In-memory documents and job records.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
#[derive(Default)]
pub struct MemoryIndexStore {
    documents: RwLock<HashMap<(String, i64), Document>>,
    jobs: RwLock<HashMap<JobId, MigrationStatusData>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an indexed document.
    pub fn document(&self, index: &str, key: i64) -> Option<Document> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(index.to_string(), key))
            .cloned()
    }

    /// Number of documents in one index.
    pub fn document_count(&self, index: &str) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|(name, _)| name == index)
            .count()
    }

    /// Get a persisted job record without going through the async trait.
    pub fn job(&self, job_id: JobId) -> Option<MigrationStatusData> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn index(&self, kind: NodeKind, document: &Document) -> CollaboratorResult<Option<IndexAck>> {
        let index = kind.index_name();
        let previous = self
            .documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((index.to_string(), document.key), document.clone());

        let result = if previous.is_some() {
            IndexResult::Updated
        } else {
            IndexResult::Created
        };
        Ok(Some(IndexAck::new(index, result)))
    }

    async fn persist_job_status(&self, data: &MigrationStatusData) -> CollaboratorResult<()> {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(data.job_id, data.clone());
        Ok(())
    }

    async fn load_job_status(&self, job_id: JobId) -> CollaboratorResult<Option<MigrationStatusData>> {
        Ok(self.job(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentsKeys, MigrationParams};

    #[tokio::test]
    async fn second_upsert_reports_updated() {
        let store = MemoryIndexStore::new();
        let doc = Document::new(NodeKind::Content, 10, serde_json::json!({"title": "a"}));

        let first = store.index(NodeKind::Content, &doc).await.unwrap().unwrap();
        let second = store.index(NodeKind::Content, &doc).await.unwrap().unwrap();

        assert_eq!(first, IndexAck::new("contents", IndexResult::Created));
        assert_eq!(second.result, IndexResult::Updated);
        assert_eq!(store.document_count("contents"), 1);
    }

    #[tokio::test]
    async fn job_records_round_trip() {
        let store = MemoryIndexStore::new();
        let data = MigrationStatusData::new(JobId::new(), MigrationParams::version(1), DocumentsKeys::new());

        store.persist_job_status(&data).await.unwrap();

        assert_eq!(store.load_job_status(data.job_id).await.unwrap(), Some(data));
        assert_eq!(store.load_job_status(JobId::new()).await.unwrap(), None);
    }
}
