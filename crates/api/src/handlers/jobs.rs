//! Handlers for the `/jobs` resource: admission, inspection and control.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use stepflow_core::error::CoreError;
use stepflow_core::job::{Job, JobAction};
use stepflow_core::pipeline::JobRequest;
use stepflow_core::sharing::can_share_results_with;
use stepflow_core::types::JobId;
use stepflow_db::models::job::JobListQuery;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_job(state: &AppState, job_id: JobId) -> AppResult<Job> {
    state
        .store
        .find_job(job_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Job", job_id).into())
}

async fn apply(state: &AppState, job_id: JobId, action: JobAction) -> AppResult<impl IntoResponse> {
    let job = state.store.apply_job_action(job_id, action).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// POST /jobs
///
/// Admit a job with its workflow steps. Returns 201 with the `accepted` job.
pub async fn create_job(
    State(state): State<AppState>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = body?;
    let job = state
        .store
        .create_job(request, state.config.max_page_size)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /jobs?username=&status=&limit=&offset=
pub async fn list_jobs(
    State(state): State<AppState>,
    params: Result<Query<JobListQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(params) = params?;
    let jobs = state.store.list_jobs(&params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// Query parameters for `GET /jobs/{jobID}`.
#[derive(Debug, Default, Deserialize)]
pub struct JobViewQuery {
    /// User asking for the job. Omitted for operator access.
    pub viewer: Option<String>,
}

/// GET /jobs/{jobID}?viewer=
///
/// A viewer who is neither the owner nor an admin only sees jobs whose
/// results may be shared, and gets 404 otherwise.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    params: Result<Query<JobViewQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(params) = params?;
    let job = find_job(&state, job_id).await?;

    if let Some(viewer) = params.viewer.as_deref() {
        let is_admin = state.config.admin_usernames.iter().any(|u| u == viewer);
        if !can_share_results_with(&job, viewer, is_admin, state.catalog.as_ref()).await? {
            tracing::debug!(job_id = %job_id, viewer, "Job results not shared with viewer");
            return Err(CoreError::not_found("Job", job_id).into());
        }
    }
    Ok(Json(DataResponse { data: job }))
}

/// GET /jobs/{jobID}/workflow-steps
pub async fn list_workflow_steps(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let steps = state.store.workflow_steps(job_id).await?;
    Ok(Json(DataResponse { data: steps }))
}

/// GET /jobs/{jobID}/work-items
pub async fn list_work_items(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let items = state.store.work_items(job_id).await?;
    Ok(Json(DataResponse { data: items }))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// POST /jobs/{jobID}/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    apply(&state, job_id, JobAction::Pause).await
}

/// POST /jobs/{jobID}/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    apply(&state, job_id, JobAction::Resume).await
}

/// POST /jobs/{jobID}/cancel
///
/// Cancels every remaining work item of the job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    apply(&state, job_id, JobAction::Cancel).await
}

/// POST /jobs/{jobID}/skip-preview
pub async fn skip_preview(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    apply(&state, job_id, JobAction::SkipPreview).await
}
