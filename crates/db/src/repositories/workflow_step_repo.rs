//! Repository for the `workflow_steps` table.

use sqlx::Postgres;
use stepflow_core::types::JobId;
use stepflow_core::workflow_step::WorkflowStep;

use crate::models::workflow_step::WorkflowStepRow;

const COLUMNS: &str = "\
    id, job_id, step_index, service_id, work_item_count, has_aggregated_output, \
    is_paged, operation, created_at, updated_at";

pub struct WorkflowStepRepo;

impl WorkflowStepRepo {
    pub async fn insert<'c, E>(exe: E, step: &WorkflowStep) -> Result<WorkflowStepRow, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "INSERT INTO workflow_steps \
                 (job_id, step_index, service_id, work_item_count, has_aggregated_output, \
                  is_paged, operation) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowStepRow>(&query)
            .bind(step.job_id)
            .bind(step.step_index)
            .bind(&step.service_id)
            .bind(step.work_item_count)
            .bind(step.has_aggregated_output)
            .bind(step.is_paged)
            .bind(&step.operation)
            .fetch_one(exe)
            .await
    }

    /// Steps of a job ordered by `step_index`.
    pub async fn list_for_job<'c, E>(exe: E, job_id: JobId) -> Result<Vec<WorkflowStep>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_steps WHERE job_id = $1 ORDER BY step_index"
        );
        let rows = sqlx::query_as::<_, WorkflowStepRow>(&query)
            .bind(job_id)
            .fetch_all(exe)
            .await?;
        Ok(rows.into_iter().map(WorkflowStep::from).collect())
    }

    pub async fn update_work_item_count<'c, E>(
        exe: E,
        job_id: JobId,
        step_index: i32,
        work_item_count: i32,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE workflow_steps SET work_item_count = $3, updated_at = NOW() \
             WHERE job_id = $1 AND step_index = $2",
        )
        .bind(job_id)
        .bind(step_index)
        .bind(work_item_count)
        .execute(exe)
        .await?;
        Ok(())
    }
}
