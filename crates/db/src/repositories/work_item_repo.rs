//! Repository for the `work_items` table.

use sqlx::types::Json;
use sqlx::Postgres;
use stepflow_core::status::{JobStatus, WorkItemStatus};
use stepflow_core::types::{DbId, JobId};
use stepflow_core::work_item::{NewWorkItem, WorkItem};

use crate::models::work_item::WorkItemRow;

const COLUMNS: &str = "\
    id, job_id, step_index, service_id, status_id, operation, inputs, results, \
    error_message, duration_ms, scroll_id, hits, total_items_size, output_item_sizes, \
    pod_name, created_at, updated_at";

pub struct WorkItemRepo;

impl WorkItemRepo {
    /// Insert a `ready` item.
    pub async fn insert<'c, E>(exe: E, item: &NewWorkItem) -> Result<WorkItemRow, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "INSERT INTO work_items \
                 (job_id, step_index, service_id, status_id, operation, inputs, scroll_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(item.job_id)
            .bind(item.step_index)
            .bind(&item.service_id)
            .bind(WorkItemStatus::Ready.id())
            .bind(&item.operation)
            .bind(Json(&item.inputs))
            .bind(&item.scroll_id)
            .fetch_one(exe)
            .await
    }

    pub async fn find_by_id<'c, E>(exe: E, id: DbId) -> Result<Option<WorkItemRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM work_items WHERE id = $1");
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(id)
            .fetch_optional(exe)
            .await
    }

    /// Load an item under a row lock. Callers lock the owning job first.
    pub async fn lock_by_id<'c, E>(exe: E, id: DbId) -> Result<Option<WorkItemRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM work_items WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(id)
            .fetch_optional(exe)
            .await
    }

    pub async fn list_for_job<'c, E>(exe: E, job_id: JobId) -> Result<Vec<WorkItemRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM work_items WHERE job_id = $1 ORDER BY id");
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(job_id)
            .fetch_all(exe)
            .await
    }

    /// Items of one step, oldest first.
    pub async fn list_for_step<'c, E>(
        exe: E,
        job_id: JobId,
        step_index: i32,
    ) -> Result<Vec<WorkItemRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM work_items \
             WHERE job_id = $1 AND step_index = $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(job_id)
            .bind(step_index)
            .fetch_all(exe)
            .await
    }

    /// Atomically claim the oldest ready item for `service_id`.
    ///
    /// Only items of active jobs qualify. Both the item and its job row are
    /// locked with `SKIP LOCKED`, so concurrent claimers never receive the
    /// same item and a job that is mid-completion is skipped rather than
    /// waited on.
    pub async fn claim_next<'c, E>(
        exe: E,
        service_id: &str,
        pod_name: Option<&str>,
    ) -> Result<Option<WorkItemRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "UPDATE work_items \
             SET status_id = $1, pod_name = $2, updated_at = NOW() \
             WHERE id = ( \
                 SELECT wi.id FROM work_items wi \
                 JOIN jobs j ON j.job_id = wi.job_id \
                 WHERE wi.service_id = $3 AND wi.status_id = $4 \
                   AND j.status_id IN ($5, $6, $7) \
                 ORDER BY wi.id \
                 LIMIT 1 \
                 FOR UPDATE OF wi, j SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(WorkItemStatus::Running.id())
            .bind(pod_name)
            .bind(service_id)
            .bind(WorkItemStatus::Ready.id())
            .bind(JobStatus::Accepted.id())
            .bind(JobStatus::Running.id())
            .bind(JobStatus::Previewing.id())
            .fetch_optional(exe)
            .await
    }

    /// Persist the outcome of a completion report.
    pub async fn save_completion<'c, E>(exe: E, item: &WorkItem) -> Result<WorkItemRow, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "UPDATE work_items \
             SET status_id = $2, results = $3, error_message = $4, duration_ms = $5, \
                 scroll_id = $6, hits = $7, total_items_size = $8, output_item_sizes = $9, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkItemRow>(&query)
            .bind(item.id)
            .bind(item.status.id())
            .bind(Json(&item.results))
            .bind(&item.error_message)
            .bind(item.duration)
            .bind(&item.scroll_id)
            .bind(item.hits)
            .bind(item.total_items_size)
            .bind(Json(&item.output_item_sizes))
            .fetch_one(exe)
            .await
    }

    /// Cancel every `ready` or `running` item of a job. Returns the count.
    pub async fn cancel_remaining<'c, E>(exe: E, job_id: JobId) -> Result<u64, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE work_items SET status_id = $2, updated_at = NOW() \
             WHERE job_id = $1 AND status_id IN ($3, $4)",
        )
        .bind(job_id)
        .bind(WorkItemStatus::Canceled.id())
        .bind(WorkItemStatus::Ready.id())
        .bind(WorkItemStatus::Running.id())
        .execute(exe)
        .await?;
        Ok(result.rows_affected())
    }
}
