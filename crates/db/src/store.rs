//! The persistence seam used by the scheduler service.

use async_trait::async_trait;
use stepflow_core::error::CoreError;
use stepflow_core::job::{Job, JobAction};
use stepflow_core::pipeline::JobRequest;
use stepflow_core::types::{DbId, JobId, Timestamp};
use stepflow_core::work_item::{WorkItem, WorkItemUpdate};
use stepflow_core::workflow_step::WorkflowStep;

use crate::models::job::JobListQuery;

/// Errors surfaced by a [`WorkStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Jobs, workflow steps and work items, with the scheduling operations
/// that must run atomically against them.
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Validate and insert a job, its steps and its first work items.
    async fn create_job(&self, request: JobRequest, page_size: i32) -> Result<Job, StoreError>;

    async fn find_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError>;

    /// Steps of a job ordered by index. Unknown jobs yield `NotFound`.
    async fn workflow_steps(&self, job_id: JobId) -> Result<Vec<WorkflowStep>, StoreError>;

    /// Items of a job ordered by id. Unknown jobs yield `NotFound`.
    async fn work_items(&self, job_id: JobId) -> Result<Vec<WorkItem>, StoreError>;

    /// Claim the oldest ready item of an active job for `service_id`.
    ///
    /// The item moves to `running` and an `accepted` job is started. `None`
    /// means there is no work.
    async fn claim_next(
        &self,
        service_id: &str,
        pod_name: Option<&str>,
    ) -> Result<Option<WorkItem>, StoreError>;

    /// Apply a worker's completion report and advance the pipeline.
    async fn complete_work_item(
        &self,
        id: DbId,
        update: &WorkItemUpdate,
        page_size: i32,
    ) -> Result<WorkItem, StoreError>;

    /// Pause, resume, cancel, skip the preview of, or fail a job.
    async fn apply_job_action(&self, job_id: JobId, action: JobAction) -> Result<Job, StoreError>;

    /// Running jobs with no activity since `cutoff`.
    async fn stale_job_ids(&self, cutoff: Timestamp) -> Result<Vec<JobId>, StoreError>;

    /// Fail a job found by [`WorkStore::stale_job_ids`] and cancel its items.
    ///
    /// Staleness is checked again under the job lock. `None` means the job
    /// is gone or saw activity since `cutoff` and was left untouched.
    async fn fail_stale_job(
        &self,
        job_id: JobId,
        cutoff: Timestamp,
        message: &str,
    ) -> Result<Option<Job>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
