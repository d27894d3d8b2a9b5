//! Collection catalog backed by server configuration.

use std::collections::HashSet;

use async_trait::async_trait;
use stepflow_core::error::CoreError;
use stepflow_core::sharing::{CollectionCatalog, CollectionInfo};

/// Treats the configured collections as EULA-free and guest readable.
///
/// Any other collection is unknown to the catalog, so jobs touching it are
/// only visible to their owner and admins.
#[derive(Debug, Clone, Default)]
pub struct StaticCollectionCatalog {
    open: HashSet<String>,
}

impl StaticCollectionCatalog {
    pub fn new(open_collection_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            open: open_collection_ids.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CollectionCatalog for StaticCollectionCatalog {
    async fn collections(&self, ids: &[String]) -> Result<Vec<CollectionInfo>, CoreError> {
        Ok(ids
            .iter()
            .filter(|id| self.open.contains(*id))
            .map(|id| CollectionInfo {
                id: id.clone(),
                has_eula: Some(false),
            })
            .collect())
    }

    async fn guest_can_read(&self, collection_id: &str) -> Result<bool, CoreError> {
        Ok(self.open.contains(collection_id))
    }
}
