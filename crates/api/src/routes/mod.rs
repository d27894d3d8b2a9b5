pub mod health;
pub mod jobs;
pub mod work;

use axum::Router;

use crate::state::AppState;

/// Build the application route tree.
///
/// ```text
/// /health                                   service and store health
///
/// /service/work                             claim next item (GET)
/// /service/work/{id}                        report outcome (PUT)
///
/// /jobs                                     list, admit
/// /jobs/{jobID}                             get
/// /jobs/{jobID}/workflow-steps              list steps
/// /jobs/{jobID}/work-items                  list items
/// /jobs/{jobID}/pause|resume|cancel         control (POST)
/// /jobs/{jobID}/skip-preview                control (POST)
/// ```
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/service", work::router())
        .nest("/jobs", jobs::router())
}
