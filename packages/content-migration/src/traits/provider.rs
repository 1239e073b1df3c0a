//! How the job registry obtains its collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{index::IndexStore, source::SourceRepository, transformer::DocumentTransformer};

/// The three clients a migration job talks to.
#[derive(Clone)]
pub struct MigrationClients {
    pub source: Arc<dyn SourceRepository>,
    pub transformer: Arc<dyn DocumentTransformer>,
    pub index_store: Arc<dyn IndexStore>,
}

impl MigrationClients {
    pub fn new(
        source: Arc<dyn SourceRepository>,
        transformer: Arc<dyn DocumentTransformer>,
        index_store: Arc<dyn IndexStore>,
    ) -> Self {
        Self {
            source,
            transformer,
            index_store,
        }
    }
}

/// Supplies clients when a job is constructed.
///
/// Connecting may be slow (session setup, discovery), which is why the
/// registry marks a key as initializing while this runs.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn clients(&self) -> Result<MigrationClients>;
}

#[async_trait]
impl ClientProvider for MigrationClients {
    async fn clients(&self) -> Result<MigrationClients> {
        Ok(self.clone())
    }
}
