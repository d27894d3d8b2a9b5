//! Result sharing checks.
//!
//! A job's results may be shown to users other than its owner only when
//! every collection it touched is EULA-free and guest readable.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::job::Job;

/// Catalog entry for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub id: String,
    /// `Some(false)` means the collection is explicitly free of EULAs.
    /// `None` (unknown) is treated like a EULA being present.
    pub has_eula: Option<bool>,
}

/// External collection metadata and permission lookup.
#[async_trait]
pub trait CollectionCatalog: Send + Sync {
    /// Entries for the requested ids. Unknown ids are omitted.
    async fn collections(&self, ids: &[String]) -> Result<Vec<CollectionInfo>, CoreError>;

    /// Whether an unauthenticated guest may read the collection.
    async fn guest_can_read(&self, collection_id: &str) -> Result<bool, CoreError>;
}

/// Whether `username` may see the results of `job`.
pub async fn can_share_results_with(
    job: &Job,
    username: &str,
    is_admin: bool,
    catalog: &dyn CollectionCatalog,
) -> Result<bool, CoreError> {
    if is_admin || job.username == username {
        return Ok(true);
    }
    if job.collection_ids.is_empty() {
        return Ok(false);
    }

    let collections = catalog.collections(&job.collection_ids).await?;
    let eula_restricted = job.collection_ids.iter().any(|id| {
        collections
            .iter()
            .find(|c| &c.id == id)
            .is_none_or(|c| c.has_eula != Some(false))
    });
    if eula_restricted {
        return Ok(false);
    }

    for id in &job.collection_ids {
        if !catalog.guest_can_read(id).await? {
            return Ok(false);
        }
    }
    Ok(true)
}
