//! Domain types for migration jobs.

pub mod keys;
pub mod params;
pub mod record;
pub mod status;

pub use keys::{DocumentsCount, DocumentsKeys, NodeKind};
pub use params::{CategoryParams, ContentParams, JobKey, MigrationParams, VersionParams};
pub use record::{BinaryRef, CategoryRecord, ContentRecord, Document, IndexAck, IndexResult, VersionRecord};
pub use status::{JobId, LogEntry, MigrationStatusData, StatusSummary};
