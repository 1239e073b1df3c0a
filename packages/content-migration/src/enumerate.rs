//! Work-set enumeration.
//!
//! Walks the same structure a migration would, but only collects keys, so a
//! job can be sized before it starts. Unresolvable references are skipped:
//! this is best-effort sizing, not a correctness pass.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::error::{CollaboratorError, MigrationError, Result};
use crate::remote::{call, list_category_content};
use crate::traits::source::SourceRepository;
use crate::types::{CategoryParams, ContentRecord, DocumentsKeys, MigrationParams, NodeKind};

/// Collects the keys a job will visit.
pub struct Enumerator<'a> {
    source: &'a dyn SourceRepository,
    config: &'a MigrationConfig,
}

impl<'a> Enumerator<'a> {
    pub fn new(source: &'a dyn SourceRepository, config: &'a MigrationConfig) -> Self {
        Self { source, config }
    }

    /// Compute the work-set for `params`.
    ///
    /// Only an interrupted call is an error; anything else that fails to
    /// resolve is left out of the work-set.
    pub async fn enumerate(&self, params: &MigrationParams) -> Result<DocumentsKeys> {
        let mut keys = DocumentsKeys::new();

        match params {
            MigrationParams::Category(p) => self.enumerate_categories(p, &mut keys).await?,
            MigrationParams::Content(p) => {
                if let Some(record) = self.resolve(self.source.fetch_content(p.key), NodeKind::Content, p.key).await? {
                    let mut seen = HashSet::new();
                    add_content(&record, p.with_versions, &mut keys, &mut seen);
                }
            }
            MigrationParams::Version(p) => {
                if self
                    .resolve(self.source.fetch_version(p.key), NodeKind::Version, p.key)
                    .await?
                    .is_some()
                {
                    keys.insert(NodeKind::Version, p.key);
                }
            }
        }

        info!(
            root = %params.job_key(),
            count = %keys.count(),
            "Enumerated work-set"
        );

        Ok(keys)
    }

    async fn enumerate_categories(&self, params: &CategoryParams, keys: &mut DocumentsKeys) -> Result<()> {
        let mut pending = vec![params.key];
        let mut visited_categories = HashSet::new();
        let mut seen_contents = HashSet::new();

        while let Some(key) = pending.pop() {
            // Cycles and diamonds end here
            if !visited_categories.insert(key) {
                continue;
            }

            let Some(category) = self
                .resolve(
                    self.source.fetch_category(key, self.config.fetch_depth),
                    NodeKind::Category,
                    key,
                )
                .await?
            else {
                continue;
            };

            keys.insert(NodeKind::Category, key);

            if params.with_content {
                let listing = list_category_content(self.source, key, self.config).await;
                match listing.error {
                    Some(e) if e.is_structural() => return Err(e.into()),
                    Some(e) => warn!(
                        category = key,
                        kept = listing.records.len(),
                        error = %e,
                        "Content listing incomplete"
                    ),
                    None => {}
                }
                for record in &listing.records {
                    add_content(record, params.with_versions, keys, &mut seen_contents);
                }
            }

            if params.with_children {
                pending.extend(category.children.iter().rev().copied());
            }
        }

        Ok(())
    }

    async fn resolve<T, F>(&self, fut: F, kind: NodeKind, key: i64) -> Result<Option<T>>
    where
        F: std::future::Future<Output = crate::error::CollaboratorResult<Option<T>>>,
    {
        match call(self.config.call_timeout, fut).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                debug!(%kind, key, "Not found during enumeration, skipping");
                Ok(None)
            }
            Err(CollaboratorError::Interrupted) => Err(MigrationError::Collaborator(CollaboratorError::Interrupted)),
            Err(e) => {
                warn!(%kind, key, error = %e, "Fetch failed during enumeration, skipping");
                Ok(None)
            }
        }
    }
}

fn add_content(record: &ContentRecord, with_versions: bool, keys: &mut DocumentsKeys, seen: &mut HashSet<i64>) {
    if !seen.insert(record.key) {
        return;
    }

    keys.insert(NodeKind::Content, record.key);
    for binary in &record.binaries {
        keys.insert(NodeKind::Binary, binary.key);
    }
    if with_versions {
        for version in record.other_versions() {
            keys.insert(NodeKind::Version, version);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::error::CollaboratorError;
    use crate::testing::MockSource;

    fn set(keys: &[i64]) -> BTreeSet<i64> {
        keys.iter().copied().collect()
    }

    #[tokio::test]
    async fn category_with_content_collects_binaries() {
        let source = MockSource::new()
            .with_category(5, &[])
            .with_content_in(5, ContentRecord::new(10, 1000).with_binary(100))
            .with_content_in(5, ContentRecord::new(11, 1100));
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(5, false, true, false))
            .await
            .unwrap();

        assert_eq!(keys.categories, set(&[5]));
        assert_eq!(keys.contents, set(&[10, 11]));
        assert!(keys.versions.is_empty());
        assert_eq!(keys.binaries, set(&[100]));
    }

    #[tokio::test]
    async fn content_with_versions_excludes_current() {
        let source = MockSource::new().with_content(ContentRecord::new(20, 200).with_versions(&[200, 201, 202]));
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::content(20, true))
            .await
            .unwrap();

        assert_eq!(keys.contents, set(&[20]));
        assert_eq!(keys.versions, set(&[201, 202]));
    }

    #[tokio::test]
    async fn content_without_versions_still_collects_binaries() {
        let source = MockSource::new().with_content(
            ContentRecord::new(20, 200)
                .with_versions(&[200, 201])
                .with_binary(7)
                .with_binary(8),
        );
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::content(20, false))
            .await
            .unwrap();

        assert!(keys.versions.is_empty());
        assert_eq!(keys.binaries, set(&[7, 8]));
    }

    #[tokio::test]
    async fn missing_roots_enumerate_to_empty() {
        let source = MockSource::new();
        let config = MigrationConfig::default();
        let enumerator = Enumerator::new(&source, &config);

        for params in [
            MigrationParams::category(1, true, true, true),
            MigrationParams::content(2, true),
            MigrationParams::version(3),
        ] {
            assert!(enumerator.enumerate(&params).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn version_root_is_added_when_present() {
        let source = MockSource::new().with_version(300, 30);
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::version(300))
            .await
            .unwrap();

        assert_eq!(keys.versions, set(&[300]));
        assert_eq!(keys.count().total(), 1);
    }

    #[tokio::test]
    async fn shared_content_and_cycles_are_counted_once() {
        // 1 -> 2 -> 3 -> 1, content 10 filed under both 2 and 3
        let source = MockSource::new()
            .with_category(1, &[2])
            .with_category(2, &[3])
            .with_category(3, &[1])
            .with_content_in(2, ContentRecord::new(10, 100))
            .with_content_in(3, ContentRecord::new(10, 100));
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(1, true, true, false))
            .await
            .unwrap();

        assert_eq!(keys.categories, set(&[1, 2, 3]));
        assert_eq!(keys.contents, set(&[10]));
        assert_eq!(source.category_fetches(1), 1);
    }

    #[tokio::test]
    async fn unresolvable_child_is_skipped() {
        let source = MockSource::new()
            .with_category(1, &[2, 99])
            .with_category(2, &[]);
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(1, true, false, false))
            .await
            .unwrap();

        assert_eq!(keys.categories, set(&[1, 2]));
    }

    #[tokio::test]
    async fn children_ignored_without_flag() {
        let source = MockSource::new().with_category(1, &[2]).with_category(2, &[]);
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(1, false, false, false))
            .await
            .unwrap();

        assert_eq!(keys.categories, set(&[1]));
    }

    #[tokio::test]
    async fn content_listing_is_paged() {
        let mut source = MockSource::new().with_category(5, &[]);
        for key in 0..25 {
            source = source.with_content_in(5, ContentRecord::new(key, key * 10));
        }
        let config = MigrationConfig::default().with_content_page_size(10);

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(5, false, true, false))
            .await
            .unwrap();

        assert_eq!(keys.contents.len(), 25);
        assert_eq!(source.listing_calls(5), 3);
    }

    #[tokio::test]
    async fn failed_listing_page_keeps_earlier_pages() {
        let mut source = MockSource::new().with_category(5, &[]);
        for key in 0..25 {
            source = source.with_content_in(5, ContentRecord::new(key, key * 10));
        }
        let source = source.failing_listing_from(5, 10, CollaboratorError::Timeout);
        let config = MigrationConfig::default().with_content_page_size(10);

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(5, false, true, false))
            .await
            .unwrap();

        assert_eq!(keys.contents, (0..10).collect::<BTreeSet<i64>>());
        assert_eq!(source.listing_calls(5), 2);

        let source = MockSource::new()
            .with_category(5, &[])
            .with_content_in(5, ContentRecord::new(1, 10))
            .failing_listing_from(5, 0, CollaboratorError::Interrupted);
        let err = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(5, false, true, false))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Collaborator(CollaboratorError::Interrupted)));
    }

    #[tokio::test]
    async fn transient_errors_are_skipped_but_interruptions_propagate() {
        let source = MockSource::new()
            .with_category(1, &[2])
            .with_category(2, &[])
            .failing_category(2, CollaboratorError::Unavailable("503".into()));
        let config = MigrationConfig::default();

        let keys = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(1, true, false, false))
            .await
            .unwrap();
        assert_eq!(keys.categories, set(&[1]));

        let source = MockSource::new()
            .with_category(1, &[])
            .failing_category(1, CollaboratorError::Interrupted);
        let err = Enumerator::new(&source, &config)
            .enumerate(&MigrationParams::category(1, true, false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Collaborator(CollaboratorError::Interrupted)));
    }
}
