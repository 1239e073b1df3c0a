//! Migration walk.
//!
//! Visits the tree in parent-before-children order and runs
//! transform → index → record for every node that is still remaining.
//! The structure (which categories to open, which content to list) always
//! comes from live fetches; only the process-or-skip decision comes from the
//! status record, which is what makes a resumed job skip finished nodes.

use std::collections::HashSet;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::error::{CollaboratorError, CollaboratorResult, MigrationError, NodeFailure, Result};
use crate::remote::{call, list_category_content};
use crate::status::MigrationStatus;
use crate::traits::provider::MigrationClients;
use crate::types::{BinaryRef, CategoryParams, ContentRecord, Document, MigrationParams, NodeKind};

/// How a walk ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkOutcome {
    Completed,
    Cancelled,
}

enum Step {
    Category(i64),
    Content {
        key: i64,
        record: Option<ContentRecord>,
        with_versions: bool,
    },
    Binary {
        binary: BinaryRef,
        content_key: i64,
        version_key: i64,
    },
    Version(i64),
}

pub(crate) struct Walker<'a> {
    clients: &'a MigrationClients,
    status: &'a MigrationStatus,
    config: &'a MigrationConfig,
    cancel: &'a CancellationToken,
    visited: HashSet<(NodeKind, i64)>,
    since_checkpoint: usize,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(
        clients: &'a MigrationClients,
        status: &'a MigrationStatus,
        config: &'a MigrationConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            clients,
            status,
            config,
            cancel,
            visited: HashSet::new(),
            since_checkpoint: 0,
        }
    }

    /// Walk from the root described by `params`.
    ///
    /// Returns `Err` only for structural failures; per-node failures are
    /// recorded in the status and the walk moves on.
    pub(crate) async fn run(mut self, params: &MigrationParams) -> Result<WalkOutcome> {
        let mut pending = vec![match params {
            MigrationParams::Category(p) => Step::Category(p.key),
            MigrationParams::Content(p) => Step::Content {
                key: p.key,
                record: None,
                with_versions: p.with_versions,
            },
            MigrationParams::Version(p) => Step::Version(p.key),
        }];
        let category_params = match params {
            MigrationParams::Category(p) => Some(*p),
            _ => None,
        };

        while let Some(step) = pending.pop() {
            // Node boundary: the only place an abort is observed
            if self.cancel.is_cancelled() {
                return Ok(WalkOutcome::Cancelled);
            }

            match step {
                Step::Category(key) => {
                    if let Some(p) = category_params {
                        self.visit_category(key, &p, &mut pending).await?;
                    }
                }
                Step::Content {
                    key,
                    record,
                    with_versions,
                } => self.visit_content(key, record, with_versions, &mut pending).await?,
                Step::Binary {
                    binary,
                    content_key,
                    version_key,
                } => self.visit_binary(binary, content_key, version_key).await?,
                Step::Version(key) => self.visit_version(key).await?,
            }
        }

        Ok(WalkOutcome::Completed)
    }

    async fn visit_category(&mut self, key: i64, params: &CategoryParams, pending: &mut Vec<Step>) -> Result<()> {
        if !self.visited.insert((NodeKind::Category, key)) {
            return Ok(());
        }

        let clients = self.clients;
        let fetched = call(
            self.config.call_timeout,
            clients.source.fetch_category(key, self.config.fetch_depth),
        )
        .await;
        let category = match fetched {
            Ok(Some(category)) => category,
            Ok(None) => return self.record_failure(NodeKind::Category, key, NodeFailure::NotFound).await,
            Err(e) => return self.fetch_failed(NodeKind::Category, key, e).await,
        };

        self.migrate_if_remaining(NodeKind::Category, key, clients.transformer.build_category(key))
            .await?;

        // Stack order: content first, then child categories
        if params.with_children {
            pending.extend(category.children.iter().rev().map(|child| Step::Category(*child)));
        }
        if params.with_content {
            let listing = list_category_content(clients.source.as_ref(), key, self.config).await;
            match listing.error {
                Some(e) if e.is_structural() => return Err(e.into()),
                Some(e) => self.status.log(
                    format!(
                        "Failed to list content of category {key} after {} items: {e}",
                        listing.records.len()
                    ),
                    true,
                ),
                None => {}
            }
            pending.extend(listing.records.into_iter().rev().map(|record| Step::Content {
                key: record.key,
                record: Some(record),
                with_versions: params.with_versions,
            }));
        }

        Ok(())
    }

    async fn visit_content(
        &mut self,
        key: i64,
        record: Option<ContentRecord>,
        with_versions: bool,
        pending: &mut Vec<Step>,
    ) -> Result<()> {
        if !self.visited.insert((NodeKind::Content, key)) {
            return Ok(());
        }

        let clients = self.clients;
        let record = match record {
            Some(record) => record,
            None => match call(self.config.call_timeout, clients.source.fetch_content(key)).await {
                Ok(Some(record)) => record,
                Ok(None) => return self.record_failure(NodeKind::Content, key, NodeFailure::NotFound).await,
                Err(e) => return self.fetch_failed(NodeKind::Content, key, e).await,
            },
        };

        self.migrate_if_remaining(NodeKind::Content, key, clients.transformer.build_from_content(key))
            .await?;

        // Stack order: binaries first, then other versions
        if with_versions {
            pending.extend(record.other_versions().collect::<Vec<_>>().into_iter().rev().map(Step::Version));
        }
        pending.extend(record.binaries.iter().rev().map(|binary| Step::Binary {
            binary: binary.clone(),
            content_key: record.key,
            version_key: record.current_version,
        }));

        Ok(())
    }

    async fn visit_binary(&mut self, binary: BinaryRef, content_key: i64, version_key: i64) -> Result<()> {
        if !self.visited.insert((NodeKind::Binary, binary.key)) {
            return Ok(());
        }

        let clients = self.clients;
        self.migrate_if_remaining(
            NodeKind::Binary,
            binary.key,
            clients.transformer.build_binary(&binary, content_key, version_key),
        )
        .await
    }

    async fn visit_version(&mut self, key: i64) -> Result<()> {
        if !self.visited.insert((NodeKind::Version, key)) {
            return Ok(());
        }

        let clients = self.clients;
        self.migrate_if_remaining(NodeKind::Version, key, clients.transformer.build_from_version(key))
            .await
    }

    /// Transform and index one node, unless it already has a result.
    async fn migrate_if_remaining<F>(&mut self, kind: NodeKind, key: i64, build: F) -> Result<()>
    where
        F: Future<Output = CollaboratorResult<Option<Document>>>,
    {
        if !self.status.is_remaining(kind, key) {
            debug!(%kind, key, "Not in remaining work-set, skipping");
            return Ok(());
        }

        let outcome = match call(self.config.call_timeout, build).await {
            Ok(Some(document)) => {
                let clients = self.clients;
                match call(self.config.call_timeout, clients.index_store.index(kind, &document)).await {
                    Ok(Some(ack)) => Ok(ack),
                    Ok(None) => Err(NodeFailure::IndexRejected),
                    Err(e) if e.is_structural() => return Err(e.into()),
                    Err(e) => Err(NodeFailure::Collaborator(e)),
                }
            }
            Ok(None) => Err(NodeFailure::TransformFailed),
            Err(e) if e.is_structural() => return Err(e.into()),
            Err(e) => Err(NodeFailure::Collaborator(e)),
        };

        self.status.set_result(key, kind, outcome);
        self.after_result().await;
        Ok(())
    }

    async fn fetch_failed(&mut self, kind: NodeKind, key: i64, error: CollaboratorError) -> Result<()> {
        if error.is_structural() {
            return Err(MigrationError::Collaborator(error));
        }
        warn!(%kind, key, error = %error, "Fetch failed during migration");
        self.record_failure(kind, key, NodeFailure::Collaborator(error)).await
    }

    async fn record_failure(&mut self, kind: NodeKind, key: i64, failure: NodeFailure) -> Result<()> {
        if self.status.is_remaining(kind, key) {
            self.status.set_result(key, kind, Err(failure));
            self.after_result().await;
        } else {
            debug!(%kind, key, %failure, "Unresolvable node outside the work-set");
        }
        Ok(())
    }

    async fn after_result(&mut self) {
        let Some(every) = self.config.checkpoint_every else {
            return;
        };
        self.since_checkpoint += 1;
        if self.since_checkpoint >= every {
            self.since_checkpoint = 0;
            self.status.checkpoint().await;
        }
    }
}
