//! Migration status: the durable record of one job.
//!
//! A [`MigrationStatus`] owns the job's [`MigrationStatusData`] behind a
//! short-lived lock, so it can be polled while the walk mutates it. No lock
//! is ever held across a remote call.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, error, info};

use crate::config::{MigrationConfig, RetryPolicy};
use crate::enumerate::Enumerator;
use crate::error::{MigrationError, NodeFailure, Result};
use crate::traits::{index::IndexStore, source::SourceRepository};
use crate::types::{
    IndexAck, JobId, LogEntry, MigrationParams, MigrationStatusData, NodeKind, StatusSummary,
};

/// What [`MigrationStatus::set_result`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultRecord {
    /// First result for this key
    Migrated,
    /// The key already had a result; flagged in the log
    Duplicate,
    /// Failure; the key stays remaining
    Failed,
}

pub struct MigrationStatus {
    data: Mutex<MigrationStatusData>,
    store: Arc<dyn IndexStore>,
    retry: RetryPolicy,
}

impl MigrationStatus {
    /// Enumerate the work-set for `params` and start a fresh record.
    pub async fn build(
        params: MigrationParams,
        source: &dyn SourceRepository,
        store: Arc<dyn IndexStore>,
        config: &MigrationConfig,
    ) -> Result<Self> {
        let work_set = Enumerator::new(source, config).enumerate(&params).await?;
        let data = MigrationStatusData::new(JobId::new(), params, work_set);

        info!(
            job_id = %data.job_id,
            root = %params.job_key(),
            total = data.total_count.total(),
            "Built migration status"
        );

        Ok(Self::from_data(data, store, config))
    }

    /// Reload a persisted record verbatim. No re-enumeration.
    pub async fn resume(job_id: JobId, store: Arc<dyn IndexStore>, config: &MigrationConfig) -> Result<Self> {
        let data = store
            .load_job_status(job_id)
            .await?
            .ok_or(MigrationError::JobNotFound(job_id))?;

        info!(
            job_id = %job_id,
            remaining = data.remaining_count().total(),
            "Resumed migration status"
        );

        Ok(Self::from_data(data, store, config))
    }

    pub fn from_data(data: MigrationStatusData, store: Arc<dyn IndexStore>, config: &MigrationConfig) -> Self {
        Self {
            data: Mutex::new(data),
            store,
            retry: config.persist_retry.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MigrationStatusData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn job_id(&self) -> JobId {
        self.lock().job_id
    }

    pub fn params(&self) -> MigrationParams {
        self.lock().params
    }

    /// Append a timestamped line to the audit log and mirror it to tracing.
    pub fn log(&self, message: impl Into<String>, is_error: bool) {
        let message = message.into();
        let mut data = self.lock();
        if is_error {
            error!(job_id = %data.job_id, "{}", message);
        } else {
            info!(job_id = %data.job_id, "{}", message);
        }
        data.log.push(LogEntry {
            at: Utc::now(),
            is_error,
            message,
        });
    }

    /// Whether `key` still needs a result.
    pub fn is_remaining(&self, kind: NodeKind, key: i64) -> bool {
        self.lock().remaining.contains(kind, key)
    }

    /// Record the outcome for one node.
    ///
    /// A success moves the key from `remaining` to `migrated`. A second
    /// success for the same key is flagged but still accepted. A failure
    /// leaves the key remaining so a resumed job retries it.
    pub fn set_result(&self, key: i64, kind: NodeKind, outcome: std::result::Result<IndexAck, NodeFailure>) -> ResultRecord {
        match outcome {
            Ok(ack) => {
                self.log(format!("{kind} {key} indexed into '{}' ({})", ack.index, ack.result), false);

                let duplicate = {
                    let mut data = self.lock();
                    data.remaining.remove(kind, key);
                    !data.migrated.insert(kind, key)
                };

                if duplicate {
                    self.log(format!("Duplicate result for {kind} {key}"), true);
                    ResultRecord::Duplicate
                } else {
                    ResultRecord::Migrated
                }
            }
            Err(failure) => {
                self.log(format!("Failed to migrate {kind} {key}: {failure}"), true);
                ResultRecord::Failed
            }
        }
    }

    /// Stamp the start time unless already set, and clear the stop time a
    /// resumed record carries from its previous run.
    pub fn start(&self) {
        let mut data = self.lock();
        if data.start_time.is_none() {
            data.start_time = Some(Utc::now());
        }
        data.stop_time = None;
    }

    /// Stamp the stop time.
    pub fn stop(&self) {
        self.lock().stop_time = Some(Utc::now());
    }

    /// Stamp the stop time and persist the full record.
    ///
    /// Failed writes are logged and retried per the retry policy. With the
    /// default policy this never gives up; the in-memory record is kept
    /// either way.
    pub async fn finish(&self) -> Result<()> {
        self.stop();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let snapshot = self.snapshot();

            match self.store.persist_job_status(&snapshot).await {
                Ok(()) => {
                    self.log(format!("Job status persisted (attempt {attempt})"), false);
                    return Ok(());
                }
                Err(e) if !self.retry.allows_retry(attempt) => {
                    self.log(
                        format!("Failed to persist job status (attempt {attempt}): {e}; giving up"),
                        true,
                    );
                    return Err(MigrationError::PersistenceExhausted { attempts: attempt });
                }
                Err(e) => {
                    let delay = self.retry.delay_after(attempt);
                    self.log(
                        format!(
                            "Failed to persist job status (attempt {attempt}): {e}; retrying in {}ms",
                            delay.as_millis()
                        ),
                        true,
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Write the current record once. Failure is logged, not retried.
    pub async fn checkpoint(&self) -> bool {
        let snapshot = self.snapshot();
        match self.store.persist_job_status(&snapshot).await {
            Ok(()) => {
                debug!(job_id = %snapshot.job_id, "Checkpoint saved");
                true
            }
            Err(e) => {
                self.log(format!("Failed to save checkpoint: {e}"), true);
                false
            }
        }
    }

    /// Lightweight projection for polling.
    pub fn summary(&self) -> StatusSummary {
        self.lock().summary()
    }

    /// Full copy of the record.
    pub fn snapshot(&self) -> MigrationStatusData {
        self.lock().clone()
    }
}
