//! Repository for the `jobs` table.

use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use stepflow_core::job::Job;
use stepflow_core::status::{JobStatus, WorkItemStatus};
use stepflow_core::types::{JobId, Timestamp};

use crate::models::job::{JobListQuery, JobRow};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_id, request_id, username, status_id, message, progress, \
    batches_completed, num_input_granules, request, is_async, preview, \
    collection_ids, created_at, updated_at";

pub struct JobRepo;

impl JobRepo {
    /// Insert a newly admitted job.
    pub async fn insert<'c, E>(exe: E, job: &Job) -> Result<JobRow, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "INSERT INTO jobs \
                 (job_id, request_id, username, status_id, message, progress, \
                  batches_completed, num_input_granules, request, is_async, preview, \
                  collection_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job.job_id)
            .bind(job.request_id)
            .bind(&job.username)
            .bind(job.status.id())
            .bind(&job.message)
            .bind(job.progress)
            .bind(job.batches_completed)
            .bind(job.num_input_granules)
            .bind(&job.request)
            .bind(job.is_async)
            .bind(job.preview)
            .bind(Json(&job.collection_ids))
            .fetch_one(exe)
            .await
    }

    /// Write the mutable job fields back and bump `updated_at`.
    pub async fn update<'c, E>(exe: E, job: &Job) -> Result<JobRow, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, message = $3, progress = $4, batches_completed = $5, \
                 num_input_granules = $6, updated_at = NOW() \
             WHERE job_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job.job_id)
            .bind(job.status.id())
            .bind(&job.message)
            .bind(job.progress)
            .bind(job.batches_completed)
            .bind(job.num_input_granules)
            .fetch_one(exe)
            .await
    }

    pub async fn find_by_job_id<'c, E>(exe: E, job_id: JobId) -> Result<Option<JobRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(exe)
            .await
    }

    /// Load a job and hold its row lock until the transaction ends.
    ///
    /// Every write path locks the job row before any of its work items.
    pub async fn lock_by_job_id<'c, E>(exe: E, job_id: JobId) -> Result<Option<JobRow>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_id = $1 FOR UPDATE");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(exe)
            .await
    }

    /// List jobs with optional username and status filters, newest first.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<Vec<JobRow>, sqlx::Error> {
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.username.is_some() {
            conditions.push(format!("username = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.status.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, JobRow>(&query);
        if let Some(username) = &params.username {
            q = q.bind(username);
        }
        if let Some(status) = params.status {
            q = q.bind(status.id());
        }
        q = q
            .bind(params.effective_limit())
            .bind(params.effective_offset());

        q.fetch_all(pool).await
    }

    /// Whether a single job still matches [`JobRepo::find_stale`].
    ///
    /// Callers hold the job row lock so the answer stays valid until commit.
    pub async fn is_stale<'c, E>(exe: E, job_id: JobId, cutoff: Timestamp) -> Result<bool, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS ( \
                 SELECT 1 FROM jobs j \
                 WHERE j.job_id = $1 AND j.status_id = $2 AND j.updated_at < $3 \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM work_items wi \
                       WHERE wi.job_id = j.job_id AND wi.status_id = $4 AND wi.updated_at >= $3 \
                   ) \
             )",
        )
        .bind(job_id)
        .bind(JobStatus::Running.id())
        .bind(cutoff)
        .bind(WorkItemStatus::Running.id())
        .fetch_one(exe)
        .await
    }

    /// Running jobs with no job or work item activity since `cutoff`.
    pub async fn find_stale(pool: &PgPool, cutoff: Timestamp) -> Result<Vec<JobId>, sqlx::Error> {
        sqlx::query_scalar::<_, JobId>(
            "SELECT j.job_id FROM jobs j \
             WHERE j.status_id = $1 AND j.updated_at < $2 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM work_items wi \
                   WHERE wi.job_id = j.job_id AND wi.status_id = $3 AND wi.updated_at >= $2 \
               ) \
             ORDER BY j.id",
        )
        .bind(JobStatus::Running.id())
        .bind(cutoff)
        .bind(WorkItemStatus::Running.id())
        .fetch_all(pool)
        .await
    }
}
