//! Testing utilities including mock implementations.
//!
//! These are useful for testing code that drives migration jobs without a
//! real content backend or search engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::stores::MemoryIndexStore;
use crate::traits::{
    index::IndexStore, provider::MigrationClients, source::SourceRepository,
    transformer::DocumentTransformer,
};
use crate::types::{
    BinaryRef, CategoryRecord, ContentRecord, Document, IndexAck, JobId, MigrationStatusData,
    NodeKind, VersionRecord,
};

/// Record of a call made to a mock collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    FetchCategory { key: i64 },
    ListContent { category: i64, offset: Option<usize> },
    FetchContent { key: i64 },
    FetchVersion { key: i64 },
    Build { kind: NodeKind, key: i64 },
    Index { kind: NodeKind, key: i64 },
    Persist { job_id: JobId },
    Load { job_id: JobId },
}

#[derive(Default)]
struct MockTree {
    categories: HashMap<i64, CategoryRecord>,
    /// Content keys filed under each category, in listing order
    listings: HashMap<i64, Vec<i64>>,
    contents: HashMap<i64, ContentRecord>,
    versions: HashMap<i64, VersionRecord>,
    failures: HashMap<(NodeKind, i64), CollaboratorError>,
    /// Listing pages at or past this offset fail
    listing_failures: HashMap<i64, (usize, CollaboratorError)>,
}

/// A mock content repository backed by an in-memory tree.
///
/// The tree can be edited after construction to simulate a backend that
/// changes underneath a running job.
#[derive(Default)]
pub struct MockSource {
    tree: RwLock<MockTree>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a category with the given child references.
    pub fn with_category(self, key: i64, children: &[i64]) -> Self {
        self.tree.write().unwrap().categories.insert(
            key,
            CategoryRecord {
                key,
                name: format!("category-{key}"),
                children: children.to_vec(),
                fields: serde_json::Value::Null,
            },
        );
        self
    }

    /// Add a content item and file it under `category`.
    pub fn with_content_in(self, category: i64, record: ContentRecord) -> Self {
        self.insert_content_in(category, record);
        self
    }

    /// Add a content item that is not filed under any category.
    pub fn with_content(self, record: ContentRecord) -> Self {
        self.tree.write().unwrap().contents.insert(record.key, record);
        self
    }

    /// Add a version belonging to `content_key`.
    pub fn with_version(self, key: i64, content_key: i64) -> Self {
        self.tree.write().unwrap().versions.insert(
            key,
            VersionRecord {
                key,
                content_key,
                fields: serde_json::Value::Null,
            },
        );
        self
    }

    /// Make fetches of one category fail.
    pub fn failing_category(self, key: i64, error: CollaboratorError) -> Self {
        self.tree
            .write()
            .unwrap()
            .failures
            .insert((NodeKind::Category, key), error);
        self
    }

    /// Make fetches of one content item fail.
    pub fn failing_content(self, key: i64, error: CollaboratorError) -> Self {
        self.tree
            .write()
            .unwrap()
            .failures
            .insert((NodeKind::Content, key), error);
        self
    }

    /// Make content listing pages of a category fail from `offset` on.
    pub fn failing_listing_from(self, category: i64, offset: usize, error: CollaboratorError) -> Self {
        self.fail_listing_from(category, offset, error);
        self
    }

    /// Sleep this long in every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// File a content item under a category (after construction).
    pub fn insert_content_in(&self, category: i64, record: ContentRecord) {
        let mut tree = self.tree.write().unwrap();
        let listing = tree.listings.entry(category).or_default();
        if !listing.contains(&record.key) {
            listing.push(record.key);
        }
        tree.contents.insert(record.key, record);
    }

    /// Make content listing pages of a category fail from `offset` on (after construction).
    pub fn fail_listing_from(&self, category: i64, offset: usize, error: CollaboratorError) {
        self.tree
            .write()
            .unwrap()
            .listing_failures
            .insert(category, (offset, error));
    }

    /// Delete a content item from the backend.
    pub fn remove_content(&self, key: i64) {
        self.tree.write().unwrap().contents.remove(&key);
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of times a category was fetched.
    pub fn category_fetches(&self, key: i64) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::FetchCategory { key: k } if *k == key))
            .count()
    }

    /// Number of content listing pages requested for a category.
    pub fn listing_calls(&self, category: i64) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::ListContent { category: k, .. } if *k == category))
            .count()
    }

    async fn enter(&self, call: MockCall) {
        self.calls.write().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn failure(&self, kind: NodeKind, key: i64) -> Option<CollaboratorError> {
        self.tree.read().unwrap().failures.get(&(kind, key)).cloned()
    }
}

#[async_trait]
impl SourceRepository for MockSource {
    async fn fetch_category(&self, key: i64, _depth: u32) -> CollaboratorResult<Option<CategoryRecord>> {
        self.enter(MockCall::FetchCategory { key }).await;
        if let Some(error) = self.failure(NodeKind::Category, key) {
            return Err(error);
        }
        Ok(self.tree.read().unwrap().categories.get(&key).cloned())
    }

    async fn fetch_content_by_category(
        &self,
        key: i64,
        _depth: u32,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> CollaboratorResult<Vec<ContentRecord>> {
        self.enter(MockCall::ListContent { category: key, offset }).await;
        let tree = self.tree.read().unwrap();
        if let Some((from, error)) = tree.listing_failures.get(&key) {
            if offset.unwrap_or(0) >= *from {
                return Err(error.clone());
            }
        }
        let Some(listing) = tree.listings.get(&key) else {
            return Ok(Vec::new());
        };

        Ok(listing
            .iter()
            .filter_map(|content| tree.contents.get(content))
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn fetch_content(&self, key: i64) -> CollaboratorResult<Option<ContentRecord>> {
        self.enter(MockCall::FetchContent { key }).await;
        if let Some(error) = self.failure(NodeKind::Content, key) {
            return Err(error);
        }
        Ok(self.tree.read().unwrap().contents.get(&key).cloned())
    }

    async fn fetch_version(&self, key: i64) -> CollaboratorResult<Option<VersionRecord>> {
        self.enter(MockCall::FetchVersion { key }).await;
        if let Some(error) = self.failure(NodeKind::Version, key) {
            return Err(error);
        }
        Ok(self.tree.read().unwrap().versions.get(&key).cloned())
    }
}

/// A mock transformer that builds a small JSON document for any key.
#[derive(Default)]
pub struct MockTransformer {
    incomplete: HashSet<(NodeKind, i64)>,
    failures: HashMap<(NodeKind, i64), CollaboratorError>,
    panics: HashSet<(NodeKind, i64)>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `None` (incomplete document) for this node.
    pub fn incomplete(mut self, kind: NodeKind, key: i64) -> Self {
        self.incomplete.insert((kind, key));
        self
    }

    /// Return an error for this node.
    pub fn failing(mut self, kind: NodeKind, key: i64, error: CollaboratorError) -> Self {
        self.failures.insert((kind, key), error);
        self
    }

    /// Panic while building this node.
    pub fn panicking(mut self, kind: NodeKind, key: i64) -> Self {
        self.panics.insert((kind, key));
        self
    }

    /// Sleep this long in every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Nodes built so far, in call order.
    pub fn built(&self) -> Vec<(NodeKind, i64)> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::Build { kind, key } => Some((*kind, *key)),
                _ => None,
            })
            .collect()
    }

    async fn build(&self, kind: NodeKind, key: i64, body: serde_json::Value) -> CollaboratorResult<Option<Document>> {
        self.calls.write().unwrap().push(MockCall::Build { kind, key });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics.contains(&(kind, key)) {
            panic!("mock transformer panicked on {kind} {key}");
        }
        if let Some(error) = self.failures.get(&(kind, key)) {
            return Err(error.clone());
        }
        if self.incomplete.contains(&(kind, key)) {
            return Ok(None);
        }
        Ok(Some(Document::new(kind, key, body)))
    }
}

#[async_trait]
impl DocumentTransformer for MockTransformer {
    async fn build_from_content(&self, key: i64) -> CollaboratorResult<Option<Document>> {
        self.build(NodeKind::Content, key, json!({ "content": key })).await
    }

    async fn build_from_version(&self, key: i64) -> CollaboratorResult<Option<Document>> {
        self.build(NodeKind::Version, key, json!({ "version": key })).await
    }

    async fn build_category(&self, key: i64) -> CollaboratorResult<Option<Document>> {
        self.build(NodeKind::Category, key, json!({ "category": key })).await
    }

    async fn build_binary(
        &self,
        binary: &BinaryRef,
        content_key: i64,
        version_key: i64,
    ) -> CollaboratorResult<Option<Document>> {
        self.build(
            NodeKind::Binary,
            binary.key,
            json!({ "binary": binary.key, "name": binary.name, "content": content_key, "version": version_key }),
        )
        .await
    }
}

/// A mock index store layered over [`MemoryIndexStore`] with failure injection.
#[derive(Default)]
pub struct MockIndexStore {
    inner: MemoryIndexStore,
    rejected: HashSet<(NodeKind, i64)>,
    persist_failures: AtomicU32,
    persist_always_fails: bool,
    persist_attempts: AtomicU32,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to index this node.
    pub fn rejecting(mut self, kind: NodeKind, key: i64) -> Self {
        self.rejected.insert((kind, key));
        self
    }

    /// Fail the next `count` job-status writes.
    pub fn failing_persists(self, count: u32) -> Self {
        self.persist_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every job-status write.
    pub fn always_failing_persists(mut self) -> Self {
        self.persist_always_fails = true;
        self
    }

    /// The backing memory store.
    pub fn inner(&self) -> &MemoryIndexStore {
        &self.inner
    }

    /// Number of job-status writes attempted.
    pub fn persist_attempts(&self) -> u32 {
        self.persist_attempts.load(Ordering::SeqCst)
    }

    /// Nodes indexed so far, in call order.
    pub fn indexed(&self) -> Vec<(NodeKind, i64)> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::Index { kind, key } => Some((*kind, *key)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl IndexStore for MockIndexStore {
    async fn index(&self, kind: NodeKind, document: &Document) -> CollaboratorResult<Option<IndexAck>> {
        self.calls.write().unwrap().push(MockCall::Index {
            kind,
            key: document.key,
        });
        if self.rejected.contains(&(kind, document.key)) {
            return Ok(None);
        }
        self.inner.index(kind, document).await
    }

    async fn persist_job_status(&self, data: &MigrationStatusData) -> CollaboratorResult<()> {
        self.calls.write().unwrap().push(MockCall::Persist { job_id: data.job_id });
        self.persist_attempts.fetch_add(1, Ordering::SeqCst);

        if self.persist_always_fails {
            return Err(CollaboratorError::Unavailable("index store down".into()));
        }
        let failed = self
            .persist_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CollaboratorError::Unavailable("index store down".into()));
        }

        self.inner.persist_job_status(data).await
    }

    async fn load_job_status(&self, job_id: JobId) -> CollaboratorResult<Option<MigrationStatusData>> {
        self.calls.write().unwrap().push(MockCall::Load { job_id });
        self.inner.load_job_status(job_id).await
    }
}

/// Shared handles to a set of mocks plus the [`MigrationClients`] built from them.
#[derive(Clone)]
pub struct MockClients {
    pub source: Arc<MockSource>,
    pub transformer: Arc<MockTransformer>,
    pub store: Arc<MockIndexStore>,
}

impl MockClients {
    pub fn new(source: MockSource, transformer: MockTransformer, store: MockIndexStore) -> Self {
        Self {
            source: Arc::new(source),
            transformer: Arc::new(transformer),
            store: Arc::new(store),
        }
    }

    /// Mocks with default behavior over the given tree.
    pub fn with_source(source: MockSource) -> Self {
        Self::new(source, MockTransformer::new(), MockIndexStore::new())
    }

    pub fn clients(&self) -> MigrationClients {
        MigrationClients::new(
            self.source.clone(),
            self.transformer.clone(),
            self.store.clone(),
        )
    }
}
