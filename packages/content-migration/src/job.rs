//! Migration job: lifecycle state machine around one walk.
//!
//! ```text
//! NotStarted ──run()──▶ Running ──walk done──▶ Finished
//!     │                    │                      │
//!     │                    ├──structural error──▶ Failed ◀── persistence exhausted
//!     └──abort()──▶ Aborted ◀──abort()──┘
//! ```
//!
//! `run()` schedules the walk on the runtime and returns immediately. The
//! walk checks for cancellation only between nodes, so `abort()` waits for
//! the node in flight to finish before it returns.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::status::MigrationStatus;
use crate::traits::provider::MigrationClients;
use crate::types::{JobId, MigrationParams, StatusSummary};
use crate::walk::{WalkOutcome, Walker};

/// Lifecycle state of a migration job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Running,
    Finished,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotStarted => "not_started",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
            JobState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a poller sees: lifecycle state plus the status projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub state: JobState,
    #[serde(flatten)]
    pub status: StatusSummary,
}

pub struct MigrationJob {
    job_id: JobId,
    params: MigrationParams,
    clients: MigrationClients,
    config: MigrationConfig,
    status: MigrationStatus,
    state: RwLock<JobState>,
    cancel: CancellationToken,
    launched: AtomicBool,
    failure: Mutex<Option<String>>,
    done: watch::Sender<bool>,
}

impl std::fmt::Debug for MigrationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationJob")
            .field("job_id", &self.job_id)
            .field("params", &self.params)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl MigrationJob {
    pub fn new(status: MigrationStatus, clients: MigrationClients, config: MigrationConfig) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            job_id: status.job_id(),
            params: status.params(),
            clients,
            config,
            status,
            state: RwLock::new(JobState::NotStarted),
            cancel: CancellationToken::new(),
            launched: AtomicBool::new(false),
            failure: Mutex::new(None),
            done,
        })
    }

    /// Enumerate a fresh work-set and wrap it in a job.
    pub async fn build(params: MigrationParams, clients: MigrationClients, config: MigrationConfig) -> Result<Arc<Self>> {
        let status = MigrationStatus::build(
            params,
            clients.source.as_ref(),
            clients.index_store.clone(),
            &config,
        )
        .await?;
        Ok(Self::new(status, clients, config))
    }

    /// Reload a persisted job record without re-enumerating.
    pub async fn resume(job_id: JobId, clients: MigrationClients, config: MigrationConfig) -> Result<Arc<Self>> {
        let status = MigrationStatus::resume(job_id, clients.index_store.clone(), &config).await?;
        Ok(Self::new(status, clients, config))
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn params(&self) -> MigrationParams {
        self.params
    }

    pub fn state(&self) -> JobState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> &MigrationStatus {
        &self.status
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            state: self.state(),
            status: self.status.summary(),
        }
    }

    /// Start the walk in the background.
    ///
    /// Only a job that has never started can run. Any other call is logged
    /// and ignored; returns whether the walk was scheduled.
    pub fn run(self: &Arc<Self>) -> bool {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if *state != JobState::NotStarted {
                let current = *state;
                drop(state);
                self.status
                    .log(format!("Run requested while job is {current}; ignoring"), false);
                return false;
            }
            *state = JobState::Running;
            self.launched.store(true, Ordering::SeqCst);
            self.status.start();
        }

        self.status.log(format!("Migration started for {}", self.params.job_key()), false);

        let job = Arc::clone(self);
        tokio::spawn(async move { job.execute().await });
        true
    }

    /// Request cancellation and wait for the walk to stop at a node boundary.
    pub async fn abort(&self) {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let previous = *state;
            if matches!(previous, JobState::NotStarted | JobState::Running) {
                *state = JobState::Aborted;
            }
            previous
        };

        match previous {
            JobState::Running => {
                self.status.log("Abort requested; stopping after current node", false);
                self.cancel.cancel();
                self.wait_done().await;
            }
            JobState::NotStarted => {
                self.status.log("Aborted before start", false);
                self.cancel.cancel();
                self.status.stop();
            }
            terminal => debug!(job_id = %self.job_id, state = %terminal, "Abort ignored for terminal job"),
        }
    }

    /// Wait until the job reaches a terminal state and its background work
    /// (including final persistence) is done.
    ///
    /// Returns the terminal state, or the error that failed the job.
    pub async fn wait(&self) -> Result<JobState> {
        if self.state() == JobState::NotStarted {
            return Ok(JobState::NotStarted);
        }
        self.wait_done().await;

        let state = self.state();
        if state == JobState::Failed {
            let reason = self
                .failure
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            return Err(MigrationError::Structural(reason));
        }
        Ok(state)
    }

    async fn wait_done(&self) {
        // A job aborted before it ever ran has no walk to wait for
        if !self.launched.load(Ordering::SeqCst) {
            return;
        }
        let mut done = self.done.subscribe();
        if done.wait_for(|finished| *finished).await.is_err() {
            warn!(job_id = %self.job_id, "Job completion channel closed");
        }
    }

    async fn execute(self: Arc<Self>) {
        let result = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(MigrationError::Structural(format!(
                "walk panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        if let Err(e) = result {
            self.fail(&e).await;
        }

        info!(job_id = %self.job_id, state = %self.state(), "Migration job settled");
        self.done.send_replace(true);
    }

    async fn drive(&self) -> Result<()> {
        let outcome = Walker::new(&self.clients, &self.status, &self.config, &self.cancel)
            .run(&self.params)
            .await?;

        if outcome == WalkOutcome::Cancelled || !self.transition(JobState::Running, JobState::Finished) {
            // Aborted; keep whatever progress was made
            self.status.log("Migration stopped after abort", false);
            self.status.stop();
            self.status.checkpoint().await;
            return Ok(());
        }

        let summary = self.status.summary();
        self.status.log(
            format!(
                "Migration finished: {} of {} nodes migrated",
                summary.migrated_count.total(),
                summary.total_count.total()
            ),
            false,
        );
        self.status.finish().await
    }

    async fn fail(&self, error: &MigrationError) {
        let moved = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if matches!(*state, JobState::Running | JobState::Finished) {
                *state = JobState::Failed;
                true
            } else {
                false
            }
        };
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.to_string());
        self.status.log(format!("Migration failed: {error}"), true);

        if !moved {
            debug!(job_id = %self.job_id, state = %self.state(), "Failure after abort; state kept");
        }

        // finish() already stamped and retried; anything else gets a snapshot
        if !matches!(error, MigrationError::PersistenceExhausted { .. }) {
            self.status.stop();
            self.status.checkpoint().await;
        }
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::testing::{MockClients, MockIndexStore, MockSource, MockTransformer};
    use crate::types::ContentRecord;

    fn small_tree() -> MockSource {
        MockSource::new()
            .with_category(1, &[])
            .with_content_in(1, ContentRecord::new(10, 100))
            .with_content_in(1, ContentRecord::new(11, 110))
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::NotStarted.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Finished.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Aborted.is_terminal());
    }

    #[test]
    fn state_serializes_snake_case() {
        let state = serde_json::to_value(JobState::NotStarted).unwrap();
        assert_eq!(state, serde_json::json!("not_started"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn runs_to_finished_and_persists() {
        let mock = MockClients::with_source(small_tree());
        let job = MigrationJob::build(
            MigrationParams::category(1, false, true, false),
            mock.clients(),
            MigrationConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(job.state(), JobState::NotStarted);
        assert!(job.run());
        assert_eq!(job.wait().await.unwrap(), JobState::Finished);

        let summary = job.summary();
        assert_eq!(summary.state, JobState::Finished);
        assert_eq!(summary.status.migrated_count.total(), 3);
        assert_eq!(summary.status.remaining_count.total(), 0);
        assert!(summary.status.stop_time.is_some());
        assert!(mock.store.inner().job(job.job_id()).is_some());
    }

    #[tokio::test]
    async fn second_run_is_ignored() {
        let mock = MockClients::with_source(small_tree());
        let job = MigrationJob::build(
            MigrationParams::category(1, false, true, false),
            mock.clients(),
            MigrationConfig::default(),
        )
        .await
        .unwrap();

        assert!(job.run());
        assert!(!job.run());
        job.wait().await.unwrap();
        assert!(!job.run());

        // Each node indexed exactly once
        assert_eq!(mock.store.indexed().len(), 3);
        let ignored = job
            .summary()
            .status
            .log
            .iter()
            .filter(|entry| entry.message.contains("ignoring"))
            .count();
        assert_eq!(ignored, 2);
    }

    #[tokio::test]
    async fn abort_before_run_prevents_walk() {
        let mock = MockClients::with_source(small_tree());
        let job = MigrationJob::build(
            MigrationParams::category(1, false, true, false),
            mock.clients(),
            MigrationConfig::default(),
        )
        .await
        .unwrap();

        job.abort().await;
        assert_eq!(job.state(), JobState::Aborted);
        assert!(!job.run());
        assert!(mock.store.indexed().is_empty());
    }

    #[tokio::test]
    async fn abort_after_finish_keeps_finished() {
        let mock = MockClients::with_source(small_tree());
        let job = MigrationJob::build(
            MigrationParams::category(1, false, true, false),
            mock.clients(),
            MigrationConfig::default(),
        )
        .await
        .unwrap();

        job.run();
        job.wait().await.unwrap();
        job.abort().await;
        assert_eq!(job.state(), JobState::Finished);
    }

    #[tokio::test]
    async fn exhausted_persistence_fails_job() {
        let mock = MockClients::new(
            small_tree(),
            MockTransformer::new(),
            MockIndexStore::new().always_failing_persists(),
        );
        let config = MigrationConfig::default().with_persist_retry(RetryPolicy::exponential(
            Duration::from_millis(1),
            Duration::from_millis(2),
            2,
        ));
        let job = MigrationJob::build(MigrationParams::category(1, false, true, false), mock.clients(), config)
            .await
            .unwrap();

        job.run();
        let err = job.wait().await.unwrap_err();
        assert!(err.to_string().contains("persistence failed after 2 attempts"));
        assert_eq!(job.state(), JobState::Failed);
        // All nodes were still migrated in memory
        assert_eq!(job.summary().status.migrated_count.total(), 3);
        assert_eq!(mock.store.persist_attempts(), 2);
    }
}
