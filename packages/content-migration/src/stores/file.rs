//! File-backed index store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<index>/<key>.json     one file per indexed document
//! <root>/_jobs/<job_id>.json    one file per job status record
//! ```
//!
//! Every write goes to a temporary sibling first and is then renamed into
//! place, so a reader never sees a half-written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::traits::index::IndexStore;
use crate::types::{Document, IndexAck, IndexResult, JobId, MigrationStatusData, NodeKind};

const JOBS_DIR: &str = "_jobs";

/// Documents and job records as JSON files on disk.
#[derive(Debug, Clone)]
pub struct FileIndexStore {
    root: PathBuf,
}

impl FileIndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, kind: NodeKind, key: i64) -> PathBuf {
        self.root.join(kind.index_name()).join(format!("{key}.json"))
    }

    pub fn job_path(&self, job_id: JobId) -> PathBuf {
        self.root.join(JOBS_DIR).join(format!("{job_id}.json"))
    }

    /// Read back an indexed document.
    pub async fn read_document(&self, kind: NodeKind, key: i64) -> CollaboratorResult<Option<Document>> {
        read_json(&self.document_path(kind, key)).await
    }

    /// Ids of every persisted job record.
    pub async fn job_ids(&self) -> CollaboratorResult<Vec<JobId>> {
        let mut entries = match fs::read_dir(self.root.join(JOBS_DIR)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(job_id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<JobId>().ok())
            {
                ids.push(job_id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl IndexStore for FileIndexStore {
    async fn index(&self, kind: NodeKind, document: &Document) -> CollaboratorResult<Option<IndexAck>> {
        let path = self.document_path(kind, document.key);
        let existed = fs::try_exists(&path).await.map_err(io_error)?;

        write_json(&path, document).await?;
        debug!(path = %path.display(), "Indexed document");

        let result = if existed {
            IndexResult::Updated
        } else {
            IndexResult::Created
        };
        Ok(Some(IndexAck::new(kind.index_name(), result)))
    }

    async fn persist_job_status(&self, data: &MigrationStatusData) -> CollaboratorResult<()> {
        write_json(&self.job_path(data.job_id), data).await
    }

    async fn load_job_status(&self, job_id: JobId) -> CollaboratorResult<Option<MigrationStatusData>> {
        read_json(&self.job_path(job_id)).await
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> CollaboratorResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| CollaboratorError::Rejected(format!("could not encode {}: {e}", path.display())))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await.map_err(io_error)?;
    fs::rename(&tmp, path).await.map_err(io_error)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CollaboratorResult<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| CollaboratorError::Rejected(format!("corrupt record {}: {e}", path.display())))
}

fn io_error(e: std::io::Error) -> CollaboratorError {
    CollaboratorError::Unavailable(e.to_string())
}
