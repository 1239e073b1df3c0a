//! Job registry: the process-wide table of migration jobs.
//!
//! Jobs are reachable two ways:
//! - by [`JobKey`] (root kind + key), which makes submission idempotent
//! - by [`JobId`], which is what callers poll, abort and resume with
//!
//! Both maps are serialized behind their own lock. A separate
//! "initializing" set rejects a second request for a key that is still
//! being constructed (clients are connecting, the work-set is being
//! enumerated), so two jobs can never be built for the same key.
//!
//! # Example
//!
//! ```ignore
//! let registry = JobRegistry::new(Arc::new(clients), MigrationConfig::from_env()?);
//!
//! let job = registry.create_or_get(MigrationParams::category(5, true, true, false), false).await?;
//! job.run();
//!
//! // Later, from another request
//! let summary = registry.status(job.job_id()).await;
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::job::{JobState, JobSummary, MigrationJob};
use crate::traits::provider::ClientProvider;
use crate::types::{JobId, JobKey, MigrationParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InitKey {
    Params(JobKey),
    Resume(JobId),
}

impl fmt::Display for InitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitKey::Params(key) => write!(f, "{key}"),
            InitKey::Resume(job_id) => write!(f, "job {job_id}"),
        }
    }
}

/// Releases an initializing mark when construction ends, successfully or not.
struct InitGuard<'a> {
    initializing: &'a Mutex<HashSet<InitKey>>,
    key: InitKey,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        self.initializing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

pub struct JobRegistry {
    provider: Arc<dyn ClientProvider>,
    config: MigrationConfig,
    by_key: RwLock<HashMap<JobKey, Arc<MigrationJob>>>,
    by_id: RwLock<HashMap<JobId, Arc<MigrationJob>>>,
    initializing: Mutex<HashSet<InitKey>>,
}

impl JobRegistry {
    pub fn new(provider: Arc<dyn ClientProvider>, config: MigrationConfig) -> Self {
        Self {
            provider,
            config,
            by_key: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            initializing: Mutex::new(HashSet::new()),
        }
    }

    /// Return the job registered for `params`' key, or build one.
    ///
    /// With `force_create`, an existing job is replaced; if it is running it
    /// is aborted (and waited for) first. Fails with
    /// [`MigrationError::JobInitializing`] while another request is building
    /// a job for the same key.
    pub async fn create_or_get(&self, params: MigrationParams, force_create: bool) -> Result<Arc<MigrationJob>> {
        let key = params.job_key();

        if !force_create {
            if let Some(job) = self.by_key.read().await.get(&key) {
                return Ok(job.clone());
            }
        }

        let _guard = self.begin_init(InitKey::Params(key))?;

        if force_create {
            let existing = self.by_key.write().await.remove(&key);
            if let Some(existing) = existing {
                if existing.state() == JobState::Running {
                    info!(job_id = %existing.job_id(), %key, "Aborting running job before replacing it");
                    existing.abort().await;
                }
                self.by_id.write().await.remove(&existing.job_id());
            }
        } else if let Some(job) = self.by_key.read().await.get(&key) {
            // Built by a request that finished between our lookup and the guard
            return Ok(job.clone());
        }

        let clients = self.provider.clients().await?;
        let job = MigrationJob::build(params, clients, self.config.clone()).await?;

        self.by_key.write().await.insert(key, job.clone());
        self.by_id.write().await.insert(job.job_id(), job.clone());

        info!(job_id = %job.job_id(), %key, "Registered migration job");
        Ok(job)
    }

    /// Return the registered job with this id, or rebuild it from its
    /// persisted status record.
    ///
    /// A rebuilt job is registered under its key as well, so later
    /// [`create_or_get`](Self::create_or_get) calls find (or replace) it. Fails
    /// with [`MigrationError::JobConflict`] if another job that has not settled
    /// holds that key; a settled one is displaced from the key table.
    pub async fn create_or_get_by_job_id(&self, job_id: JobId) -> Result<Arc<MigrationJob>> {
        if let Some(job) = self.by_id.read().await.get(&job_id) {
            return Ok(job.clone());
        }

        let _guard = self.begin_init(InitKey::Resume(job_id))?;

        if let Some(job) = self.by_id.read().await.get(&job_id) {
            return Ok(job.clone());
        }

        let clients = self.provider.clients().await?;
        let job = MigrationJob::resume(job_id, clients, self.config.clone()).await?;

        let key = job.params().job_key();
        let _key_guard = self.begin_init(InitKey::Params(key))?;

        let mut by_key = self.by_key.write().await;
        if let Some(existing) = by_key.get(&key) {
            if !existing.state().is_terminal() {
                return Err(MigrationError::JobConflict {
                    key: key.to_string(),
                    job_id: existing.job_id(),
                });
            }
            debug!(job_id = %existing.job_id(), %key, "Resumed job displaces settled job");
        }
        by_key.insert(key, job.clone());
        self.by_id.write().await.insert(job_id, job.clone());

        info!(%job_id, %key, "Registered resumed migration job");
        Ok(job)
    }

    /// Abort a job. Returns `false` if no job has this id.
    pub async fn abort(&self, job_id: JobId) -> bool {
        let job = self.by_id.read().await.get(&job_id).cloned();
        match job {
            Some(job) => {
                job.abort().await;
                true
            }
            None => {
                debug!(%job_id, "Abort for unknown job");
                false
            }
        }
    }

    pub async fn status(&self, job_id: JobId) -> Option<JobSummary> {
        self.by_id.read().await.get(&job_id).map(|job| job.summary())
    }

    pub async fn get(&self, job_id: JobId) -> Option<Arc<MigrationJob>> {
        self.by_id.read().await.get(&job_id).cloned()
    }

    /// Summaries of every registered job.
    pub async fn list(&self) -> Vec<JobSummary> {
        self.by_id.read().await.values().map(|job| job.summary()).collect()
    }

    /// Drop every job that is not running. Persisted records are untouched,
    /// so removed jobs stay resumable by id.
    pub async fn cleanup(&self) -> Vec<JobId> {
        let mut by_key = self.by_key.write().await;
        let mut by_id = self.by_id.write().await;

        let removed: Vec<JobId> = by_id
            .iter()
            .filter(|(_, job)| job.state() != JobState::Running)
            .map(|(job_id, _)| *job_id)
            .collect();

        for job_id in &removed {
            by_id.remove(job_id);
        }
        by_key.retain(|_, job| !removed.contains(&job.job_id()));

        if !removed.is_empty() {
            info!(removed = removed.len(), "Cleaned up migration jobs");
        }
        removed
    }

    fn begin_init(&self, key: InitKey) -> Result<InitGuard<'_>> {
        let mut initializing = self.initializing.lock().unwrap_or_else(|e| e.into_inner());
        if !initializing.insert(key) {
            return Err(MigrationError::JobInitializing { key: key.to_string() });
        }
        Ok(InitGuard {
            initializing: &self.initializing,
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::testing::{MockClients, MockIndexStore, MockSource, MockTransformer};
    use crate::traits::provider::MigrationClients;
    use crate::types::ContentRecord;

    fn tree() -> MockSource {
        MockSource::new()
            .with_category(5, &[6])
            .with_category(6, &[])
            .with_content_in(5, ContentRecord::new(10, 100).with_binary(1000))
            .with_content_in(6, ContentRecord::new(11, 110))
    }

    fn registry(mock: &MockClients) -> JobRegistry {
        JobRegistry::new(Arc::new(mock.clients()), MigrationConfig::default())
    }

    struct FailingProvider;

    #[async_trait]
    impl ClientProvider for FailingProvider {
        async fn clients(&self) -> Result<MigrationClients> {
            Err(MigrationError::Structural("no session".into()))
        }
    }

    #[tokio::test]
    async fn create_or_get_is_idempotent() {
        let mock = MockClients::with_source(tree());
        let registry = registry(&mock);
        let params = MigrationParams::category(5, true, true, false);

        let first = registry.create_or_get(params, false).await.unwrap();
        let second = registry.create_or_get(params, false).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.job_id(), second.job_id());
        assert_eq!(registry.list().await.len(), 1);
        // Enumerated once
        assert_eq!(mock.source.category_fetches(5), 1);
    }

    #[tokio::test]
    async fn same_key_different_kind_are_distinct() {
        let source = tree().with_version(5, 10);
        let mock = MockClients::with_source(source);
        let registry = registry(&mock);

        let category = registry
            .create_or_get(MigrationParams::category(5, false, false, false), false)
            .await
            .unwrap();
        let version = registry.create_or_get(MigrationParams::version(5), false).await.unwrap();

        assert_ne!(category.job_id(), version.job_id());
    }

    #[tokio::test]
    async fn concurrent_construction_is_rejected() {
        let mock = MockClients::with_source(tree().with_delay(Duration::from_millis(200)));
        let registry = Arc::new(registry(&mock));
        let params = MigrationParams::category(5, true, true, false);

        let background = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create_or_get(params, false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = registry.create_or_get(params, false).await.unwrap_err();
        assert!(matches!(err, MigrationError::JobInitializing { .. }));

        let job = background.await.unwrap().unwrap();
        // Once built, the same request succeeds with the same job
        let again = registry.create_or_get(params, false).await.unwrap();
        assert!(Arc::ptr_eq(&job, &again));
    }

    #[tokio::test]
    async fn force_create_replaces_running_job() {
        let mock = MockClients::new(
            tree(),
            MockTransformer::new().with_delay(Duration::from_millis(50)),
            MockIndexStore::new(),
        );
        let registry = registry(&mock);
        let params = MigrationParams::category(5, true, true, false);

        let first = registry.create_or_get(params, false).await.unwrap();
        first.run();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = registry.create_or_get(params, true).await.unwrap();

        assert_eq!(first.state(), JobState::Aborted);
        assert_ne!(first.job_id(), second.job_id());
        assert_eq!(second.state(), JobState::NotStarted);
        assert!(registry.status(first.job_id()).await.is_none());
        assert!(registry.status(second.job_id()).await.is_some());
    }

    #[tokio::test]
    async fn provider_failure_is_reported_and_releases_key() {
        let registry = JobRegistry::new(Arc::new(FailingProvider), MigrationConfig::default());
        let params = MigrationParams::version(1);

        for _ in 0..2 {
            let err = registry.create_or_get(params, false).await.unwrap_err();
            assert!(matches!(err, MigrationError::Structural(_)));
        }
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn abort_and_status_unknown_job() {
        let mock = MockClients::with_source(tree());
        let registry = registry(&mock);
        let unknown = JobId::new();

        assert!(!registry.abort(unknown).await);
        assert!(registry.status(unknown).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_settled_jobs_and_keeps_them_resumable() {
        let mock = MockClients::with_source(tree());
        let registry = registry(&mock);

        let finished = registry
            .create_or_get(MigrationParams::category(5, true, true, false), false)
            .await
            .unwrap();
        finished.run();
        assert_eq!(finished.wait().await.unwrap(), JobState::Finished);

        let idle = registry
            .create_or_get(MigrationParams::content(10, false), false)
            .await
            .unwrap();

        let mut removed = registry.cleanup().await;
        removed.sort();
        let mut expected = vec![finished.job_id(), idle.job_id()];
        expected.sort();
        assert_eq!(removed, expected);
        assert!(registry.list().await.is_empty());

        // The persisted record brings the finished job back
        let resumed = registry.create_or_get_by_job_id(finished.job_id()).await.unwrap();
        assert_eq!(resumed.job_id(), finished.job_id());
        assert_eq!(resumed.summary().status.remaining_count.total(), 0);

        let again = registry.create_or_get_by_job_id(finished.job_id()).await.unwrap();
        assert!(Arc::ptr_eq(&resumed, &again));
    }

    #[tokio::test]
    async fn abort_stops_running_job_and_waits_for_walk() {
        let mock = MockClients::new(
            tree(),
            MockTransformer::new().with_delay(Duration::from_millis(50)),
            MockIndexStore::new(),
        );
        let registry = registry(&mock);
        let job = registry
            .create_or_get(MigrationParams::category(5, true, true, false), false)
            .await
            .unwrap();
        job.run();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(registry.abort(job.job_id()).await);

        assert_eq!(job.state(), JobState::Aborted);
        let built = mock.transformer.built().len();
        assert!(built < 5);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(mock.transformer.built().len(), built);

        let summary = registry.status(job.job_id()).await.unwrap();
        assert_eq!(summary.state, JobState::Aborted);
        assert!(summary.status.stop_time.is_some());
        assert_eq!(job.wait().await.unwrap(), JobState::Aborted);
    }

    #[tokio::test]
    async fn resumed_job_is_registered_under_its_key() {
        let mock = MockClients::new(
            tree(),
            MockTransformer::new().with_delay(Duration::from_millis(50)),
            MockIndexStore::new(),
        );
        let registry = registry(&mock);
        let params = MigrationParams::category(5, true, true, false);

        let original = registry.create_or_get(params, false).await.unwrap();
        original.run();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.abort(original.job_id()).await);
        assert_eq!(registry.cleanup().await, vec![original.job_id()]);

        let resumed = registry.create_or_get_by_job_id(original.job_id()).await.unwrap();
        resumed.run();
        assert_eq!(resumed.state(), JobState::Running);

        let same = registry.create_or_get(params, false).await.unwrap();
        assert!(Arc::ptr_eq(&resumed, &same));
        assert_eq!(registry.list().await.len(), 1);

        // Forcing a new job stops the resumed one instead of running beside it
        let forced = registry.create_or_get(params, true).await.unwrap();
        assert_eq!(resumed.state(), JobState::Aborted);
        assert_ne!(forced.job_id(), resumed.job_id());
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn resume_is_refused_while_another_job_holds_the_key() {
        let mock = MockClients::with_source(tree());
        let registry = registry(&mock);
        let params = MigrationParams::category(5, true, true, false);

        let finished = registry.create_or_get(params, false).await.unwrap();
        finished.run();
        assert_eq!(finished.wait().await.unwrap(), JobState::Finished);
        registry.cleanup().await;

        let fresh = registry.create_or_get(params, false).await.unwrap();
        assert_eq!(fresh.state(), JobState::NotStarted);

        let err = registry.create_or_get_by_job_id(finished.job_id()).await.unwrap_err();
        assert!(matches!(err, MigrationError::JobConflict { job_id, .. } if job_id == fresh.job_id()));
        assert!(registry.status(finished.job_id()).await.is_none());

        // Once the holder settles, the resumed job takes the key over
        fresh.run();
        assert_eq!(fresh.wait().await.unwrap(), JobState::Finished);
        let resumed = registry.create_or_get_by_job_id(finished.job_id()).await.unwrap();
        let by_key = registry.create_or_get(params, false).await.unwrap();
        assert!(Arc::ptr_eq(&resumed, &by_key));
    }

    #[tokio::test]
    async fn resume_unknown_job_is_not_found() {
        let mock = MockClients::with_source(tree());
        let registry = registry(&mock);

        let err = registry.create_or_get_by_job_id(JobId::new()).await.unwrap_err();
        assert!(matches!(err, MigrationError::JobNotFound(_)));
    }
}
