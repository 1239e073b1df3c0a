//! Content Migration Orchestrator
//!
//! Moves a tree of legacy content (categories, content items, versions and
//! their binaries) into a search index as resumable, abortable background
//! jobs.
//!
//! # Flow
//!
//! 1. [`JobRegistry::create_or_get`] builds a [`MigrationJob`] for a root node
//! 2. the job's [`MigrationStatus`] sizes the work-set up front ([`Enumerator`])
//! 3. [`MigrationJob::run`] walks the tree in the background, parent before
//!    children, doing transform → index → record per node
//! 4. on completion the status record is persisted to the index store, from
//!    where [`JobRegistry::create_or_get_by_job_id`] can resume it
//!
//! # Usage
//!
//! ```rust,ignore
//! use content_migration::{JobRegistry, MigrationClients, MigrationConfig, MigrationParams};
//!
//! let clients = MigrationClients::new(source, transformer, index_store);
//! let registry = JobRegistry::new(Arc::new(clients), MigrationConfig::from_env()?);
//!
//! let job = registry
//!     .create_or_get(MigrationParams::category(5, true, true, false), false)
//!     .await?;
//! job.run();
//!
//! let summary = registry.status(job.job_id()).await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator contracts (source, transformer, index store)
//! - [`types`] - Keys, parameters, records and status data
//! - [`enumerate`] - Pre-flight work-set sizing
//! - [`status`] - Per-job bookkeeping and persistence
//! - [`job`] - Job state machine
//! - [`registry`] - Process-wide job table
//! - [`stores`] - Index store and source implementations
//! - [`testing`] - Mock collaborators for tests

pub mod config;
pub mod enumerate;
pub mod error;
pub mod job;
pub mod registry;
mod remote;
pub mod status;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
mod walk;

pub use config::{MigrationConfig, RetryPolicy};
pub use enumerate::Enumerator;
pub use error::{CollaboratorError, CollaboratorResult, MigrationError, NodeFailure, Result};
pub use job::{JobState, JobSummary, MigrationJob};
pub use registry::JobRegistry;
pub use status::{MigrationStatus, ResultRecord};
pub use stores::{FileIndexStore, MemoryIndexStore, SnapshotRepository, TreeSnapshot};
pub use traits::{
    index::IndexStore,
    provider::{ClientProvider, MigrationClients},
    source::SourceRepository,
    transformer::DocumentTransformer,
};
pub use types::{
    BinaryRef, CategoryParams, CategoryRecord, ContentParams, ContentRecord, Document, DocumentsCount,
    DocumentsKeys, IndexAck, IndexResult, JobId, JobKey, LogEntry, MigrationParams, MigrationStatusData,
    NodeKind, StatusSummary, VersionParams, VersionRecord,
};
