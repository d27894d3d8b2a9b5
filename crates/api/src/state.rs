use std::sync::Arc;

use stepflow_core::sharing::CollectionCatalog;
use stepflow_db::WorkStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Jobs, steps and work items (PostgreSQL or in-memory).
    pub store: Arc<dyn WorkStore>,
    /// Collection lookups for result sharing.
    pub catalog: Arc<dyn CollectionCatalog>,
    pub config: Arc<ServerConfig>,
}
