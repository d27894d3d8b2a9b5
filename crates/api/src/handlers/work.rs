//! Handlers for the worker-facing work protocol.
//!
//! Workers poll `GET /service/work` for the next item of their service and
//! report outcomes with `PUT /service/work/{id}`. Payloads are bare JSON
//! (no `data` envelope).

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use stepflow_core::types::DbId;
use stepflow_core::work_item::{WorkItemUpdate, WorkResponse};

use crate::error::AppResult;
use crate::state::AppState;

/// Query parameters for `GET /service/work`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkQuery {
    #[serde(rename = "serviceID")]
    pub service_id: String,
    pub pod_name: Option<String>,
}

/// GET /service/work?serviceID=&podName=
///
/// 200 with the claimed item, 404 when there is no work.
pub async fn get_work(
    State(state): State<AppState>,
    query: Result<Query<WorkQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) = query?;
    let claimed = state
        .store
        .claim_next(&query.service_id, query.pod_name.as_deref())
        .await?;

    match claimed {
        Some(work_item) => Ok(Json(WorkResponse {
            work_item,
            max_cmr_granules: state.config.max_page_size,
        })
        .into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// PUT /service/work/{id}
///
/// Record a worker's outcome. 409 when the item or its job is already
/// terminal, 400 when the body is malformed or the status is not final.
pub async fn update_work(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Result<Json<WorkItemUpdate>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(update) = body?;
    let item = match state
        .store
        .complete_work_item(id, &update, state.config.max_page_size)
        .await
    {
        Ok(item) => item,
        Err(e) => {
            tracing::warn!(work_item_id = id, error = %e, "Work item update rejected");
            return Err(e.into());
        }
    };
    Ok(Json(item))
}
