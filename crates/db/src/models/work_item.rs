use sqlx::types::Json;
use sqlx::FromRow;
use stepflow_core::error::CoreError;
use stepflow_core::status::{StatusId, WorkItemStatus};
use stepflow_core::types::{DbId, JobId, Timestamp};
use stepflow_core::work_item::WorkItem;

/// A row from the `work_items` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkItemRow {
    pub id: DbId,
    pub job_id: JobId,
    pub step_index: i32,
    pub service_id: String,
    pub status_id: StatusId,
    pub operation: serde_json::Value,
    pub inputs: Json<Vec<String>>,
    pub results: Json<Vec<String>>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub scroll_id: Option<String>,
    pub hits: Option<i64>,
    pub total_items_size: Option<f64>,
    pub output_item_sizes: Json<Vec<f64>>,
    pub pod_name: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = CoreError;

    fn try_from(row: WorkItemRow) -> Result<Self, Self::Error> {
        let status = WorkItemStatus::from_id(row.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "Unknown work item status id {} for work item {}",
                row.status_id, row.id
            ))
        })?;
        Ok(WorkItem {
            id: row.id,
            job_id: row.job_id,
            step_index: row.step_index,
            service_id: row.service_id,
            status,
            operation: row.operation,
            inputs: row.inputs.0,
            results: row.results.0,
            error_message: row.error_message,
            duration: row.duration_ms,
            scroll_id: row.scroll_id,
            hits: row.hits,
            total_items_size: row.total_items_size,
            output_item_sizes: row.output_item_sizes.0,
            pod_name: row.pod_name,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}
