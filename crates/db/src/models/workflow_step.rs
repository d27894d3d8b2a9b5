use sqlx::FromRow;
use stepflow_core::types::{DbId, JobId, Timestamp};
use stepflow_core::workflow_step::WorkflowStep;

/// A row from the `workflow_steps` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStepRow {
    pub id: DbId,
    pub job_id: JobId,
    pub step_index: i32,
    pub service_id: String,
    pub work_item_count: i32,
    pub has_aggregated_output: bool,
    pub is_paged: bool,
    pub operation: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<WorkflowStepRow> for WorkflowStep {
    fn from(row: WorkflowStepRow) -> Self {
        WorkflowStep {
            job_id: row.job_id,
            step_index: row.step_index,
            service_id: row.service_id,
            work_item_count: row.work_item_count,
            has_aggregated_output: row.has_aggregated_output,
            is_paged: row.is_paged,
            operation: row.operation,
        }
    }
}
