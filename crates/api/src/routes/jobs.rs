//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                          -> list_jobs
/// POST   /                          -> create_job
/// GET    /{job_id}?viewer=          -> get_job
/// GET    /{job_id}/workflow-steps   -> list_workflow_steps
/// GET    /{job_id}/work-items       -> list_work_items
/// POST   /{job_id}/pause            -> pause_job
/// POST   /{job_id}/resume           -> resume_job
/// POST   /{job_id}/cancel           -> cancel_job
/// POST   /{job_id}/skip-preview     -> skip_preview
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/{job_id}", get(jobs::get_job))
        .route("/{job_id}/workflow-steps", get(jobs::list_workflow_steps))
        .route("/{job_id}/work-items", get(jobs::list_work_items))
        .route("/{job_id}/pause", post(jobs::pause_job))
        .route("/{job_id}/resume", post(jobs::resume_job))
        .route("/{job_id}/cancel", post(jobs::cancel_job))
        .route("/{job_id}/skip-preview", post(jobs::skip_preview))
}
