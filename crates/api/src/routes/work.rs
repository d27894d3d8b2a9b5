//! Route definitions for the work protocol.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::work;
use crate::state::AppState;

/// Routes mounted at `/service`.
///
/// ```text
/// GET    /work?serviceID=&podName=   -> get_work
/// PUT    /work/{id}                  -> update_work
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/work", get(work::get_work))
        .route("/work/{id}", put(work::update_work))
}
