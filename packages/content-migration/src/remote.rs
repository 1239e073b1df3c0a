//! Helpers shared by every caller of the collaborator traits.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::MigrationConfig;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::traits::source::SourceRepository;
use crate::types::ContentRecord;

/// Await a remote call, turning an elapsed timeout into [`CollaboratorError::Timeout`].
pub(crate) async fn call<T, F>(timeout: Option<Duration>, fut: F) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CollaboratorError::Timeout)?,
        None => fut.await,
    }
}

/// Content items of a category, plus the error that cut the listing short.
#[derive(Debug, Default)]
pub(crate) struct ContentListing {
    /// Everything read before the listing stopped
    pub records: Vec<ContentRecord>,
    pub error: Option<CollaboratorError>,
}

/// List every content item of a category, one page at a time.
///
/// Stops at the first short page, or at a page that brings nothing new
/// (a backend that ignores `offset` would otherwise loop forever). A page
/// that fails ends the listing; the pages already read are kept.
pub(crate) async fn list_category_content(
    source: &dyn SourceRepository,
    key: i64,
    config: &MigrationConfig,
) -> ContentListing {
    let limit = config.content_page_size.max(1);
    let mut offset = 0;
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    loop {
        let page = match call(
            config.call_timeout,
            source.fetch_content_by_category(key, config.fetch_depth, Some(offset), Some(limit)),
        )
        .await
        {
            Ok(page) => page,
            Err(error) => {
                if !records.is_empty() {
                    warn!(
                        category = key,
                        offset,
                        kept = records.len(),
                        error = %error,
                        "content listing cut short"
                    );
                }
                return ContentListing {
                    records,
                    error: Some(error),
                };
            }
        };

        let fetched = page.len();
        let mut fresh = 0;
        for record in page {
            if seen.insert(record.key) {
                fresh += 1;
                records.push(record);
            }
        }

        if fetched < limit {
            break;
        }
        if fresh == 0 {
            warn!(category = key, offset, "content listing repeated a page, stopping");
            break;
        }
        offset += fetched;
    }

    ContentListing { records, error: None }
}
