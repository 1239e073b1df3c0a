//! Persisted job status record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keys::{DocumentsCount, DocumentsKeys};
use super::params::MigrationParams;

/// Unique identifier for a migration job. Also the resumption key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One timestamped line of a job's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub is_error: bool,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = if self.is_error { "ERROR" } else { "INFO" };
        write!(
            f,
            "{} {:5} {}",
            self.at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level,
            self.message
        )
    }
}

/// Full durable record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatusData {
    pub job_id: JobId,
    pub params: MigrationParams,
    pub total_count: DocumentsCount,
    pub migrated: DocumentsKeys,
    pub remaining: DocumentsKeys,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl MigrationStatusData {
    /// Fresh record with `remaining` seeded to the full work-set.
    pub fn new(job_id: JobId, params: MigrationParams, work_set: DocumentsKeys) -> Self {
        Self {
            job_id,
            params,
            total_count: work_set.count(),
            migrated: DocumentsKeys::default(),
            remaining: work_set,
            log: Vec::new(),
            start_time: None,
            stop_time: None,
        }
    }

    pub fn migrated_count(&self) -> DocumentsCount {
        self.migrated.count()
    }

    pub fn remaining_count(&self) -> DocumentsCount {
        self.remaining.count()
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            job_id: self.job_id,
            params: self.params,
            total_count: self.total_count,
            migrated_count: self.migrated_count(),
            remaining_count: self.remaining_count(),
            log: self.log.clone(),
            start_time: self.start_time,
            stop_time: self.stop_time,
        }
    }
}

/// Lightweight projection of a job status for polling. Omits the key sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub job_id: JobId,
    pub params: MigrationParams,
    pub total_count: DocumentsCount,
    pub migrated_count: DocumentsCount,
    pub remaining_count: DocumentsCount,
    pub log: Vec<LogEntry>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}
