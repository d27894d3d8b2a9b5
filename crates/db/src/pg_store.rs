//! PostgreSQL-backed [`WorkStore`].
//!
//! Lock order on every write path: job row, then work item rows. Claims take
//! both with `SKIP LOCKED` so they never wait behind a completion.

use async_trait::async_trait;
use sqlx::PgConnection;
use stepflow_core::error::CoreError;
use stepflow_core::job::{Job, JobAction};
use stepflow_core::pipeline::{plan_admission, plan_completion, CompletionContext, JobRequest};
use stepflow_core::status::JobStatus;
use stepflow_core::types::{DbId, JobId, Timestamp};
use stepflow_core::work_item::{WorkItem, WorkItemUpdate};
use stepflow_core::workflow_step::WorkflowStep;

use crate::models::job::{JobListQuery, JobRow};
use crate::models::work_item::WorkItemRow;
use crate::repositories::{JobLinkRepo, JobRepo, WorkItemRepo, WorkflowStepRepo};
use crate::store::{StoreError, WorkStore};
use crate::DbPool;

#[derive(Clone)]
pub struct PgWorkStore {
    pool: DbPool,
}

impl PgWorkStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

async fn hydrate(conn: &mut PgConnection, row: JobRow) -> Result<Job, StoreError> {
    let links = JobLinkRepo::list_for_job(&mut *conn, row.job_id).await?;
    Ok(row.into_job(links)?)
}

fn into_items(rows: Vec<WorkItemRow>) -> Result<Vec<WorkItem>, CoreError> {
    rows.into_iter().map(WorkItem::try_from).collect()
}

/// Save a job changed under lock, appending links added since it was loaded.
async fn save_job(
    conn: &mut PgConnection,
    job: &mut Job,
    persisted_links: usize,
) -> Result<(), StoreError> {
    job.prepare_for_save()?;
    let row = JobRepo::update(&mut *conn, job).await?;
    if job.links.len() > persisted_links {
        JobLinkRepo::insert_many(&mut *conn, job.job_id, &job.links[persisted_links..]).await?;
    }
    job.updated_at = Some(row.updated_at);
    job.mark_persisted();
    Ok(())
}

#[async_trait]
impl WorkStore for PgWorkStore {
    async fn create_job(&self, request: JobRequest, page_size: i32) -> Result<Job, StoreError> {
        let admission = plan_admission(request, page_size)?;
        let mut job = admission.job;
        job.prepare_for_save()?;

        let mut tx = self.pool.begin().await?;
        let row = JobRepo::insert(&mut *tx, &job).await?;
        JobLinkRepo::insert_many(&mut tx, job.job_id, &job.links).await?;
        for step in &admission.steps {
            WorkflowStepRepo::insert(&mut *tx, step).await?;
        }
        for item in &admission.items {
            WorkItemRepo::insert(&mut *tx, item).await?;
        }
        tx.commit().await?;

        tracing::info!(
            job_id = %job.job_id,
            username = %job.username,
            steps = admission.steps.len(),
            items = admission.items.len(),
            "Job admitted",
        );
        job.created_at = Some(row.created_at);
        job.updated_at = Some(row.updated_at);
        job.mark_persisted();
        Ok(job)
    }

    async fn find_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        match JobRepo::find_by_job_id(&mut *conn, job_id).await? {
            Some(row) => Ok(Some(hydrate(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let rows = JobRepo::list(&self.pool, query).await?;
        let mut conn = self.pool.acquire().await?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(hydrate(&mut conn, row).await?);
        }
        Ok(jobs)
    }

    async fn workflow_steps(&self, job_id: JobId) -> Result<Vec<WorkflowStep>, StoreError> {
        if JobRepo::find_by_job_id(&self.pool, job_id).await?.is_none() {
            return Err(CoreError::not_found("Job", job_id).into());
        }
        Ok(WorkflowStepRepo::list_for_job(&self.pool, job_id).await?)
    }

    async fn work_items(&self, job_id: JobId) -> Result<Vec<WorkItem>, StoreError> {
        if JobRepo::find_by_job_id(&self.pool, job_id).await?.is_none() {
            return Err(CoreError::not_found("Job", job_id).into());
        }
        let rows = WorkItemRepo::list_for_job(&self.pool, job_id).await?;
        Ok(into_items(rows)?)
    }

    async fn claim_next(
        &self,
        service_id: &str,
        pod_name: Option<&str>,
    ) -> Result<Option<WorkItem>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = WorkItemRepo::claim_next(&mut *tx, service_id, pod_name).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        let item = WorkItem::try_from(row)?;

        // The claim query already holds the job row lock.
        let job_row = JobRepo::find_by_job_id(&mut *tx, item.job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job", item.job_id))?;
        let mut job = job_row.into_job(Vec::new())?;
        if job.status == JobStatus::Accepted {
            if job.preview {
                job.start_with_preview()?;
            } else {
                job.start()?;
            }
            save_job(&mut tx, &mut job, 0).await?;
            tracing::info!(job_id = %job.job_id, status = %job.status, "Job started");
        }
        tx.commit().await?;

        tracing::debug!(
            work_item_id = item.id,
            job_id = %item.job_id,
            service_id,
            pod_name = pod_name.unwrap_or("unknown"),
            "Work item claimed",
        );
        Ok(Some(item))
    }

    async fn complete_work_item(
        &self,
        id: DbId,
        update: &WorkItemUpdate,
        page_size: i32,
    ) -> Result<WorkItem, StoreError> {
        let mut tx = self.pool.begin().await?;

        let job_id = WorkItemRepo::find_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| CoreError::not_found("WorkItem", id))?
            .job_id;
        let job_row = JobRepo::lock_by_job_id(&mut *tx, job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job", job_id))?;
        let item_row = WorkItemRepo::lock_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| CoreError::not_found("WorkItem", id))?;

        let mut job = hydrate(&mut tx, job_row).await?;
        let persisted_links = job.links.len();
        let item = WorkItem::try_from(item_row)?;
        let steps = WorkflowStepRepo::list_for_job(&mut *tx, job_id).await?;
        let step = steps
            .iter()
            .find(|s| s.step_index == item.step_index)
            .ok_or_else(|| {
                CoreError::Internal(format!(
                    "Workflow step {} missing for job {job_id}",
                    item.step_index
                ))
            })?;
        let next_step = steps.iter().find(|s| s.step_index == item.step_index + 1);
        let step_items =
            into_items(WorkItemRepo::list_for_step(&mut *tx, job_id, item.step_index).await?)?;

        let plan = plan_completion(
            &mut job,
            CompletionContext {
                item: &item,
                step,
                next_step,
                step_items: &step_items,
                page_size,
            },
            update,
        )?;

        let saved = WorkItem::try_from(WorkItemRepo::save_completion(&mut *tx, &plan.item).await?)?;
        for (step_index, count) in &plan.step_counts {
            WorkflowStepRepo::update_work_item_count(&mut *tx, job_id, *step_index, *count)
                .await?;
        }
        for new_item in &plan.new_items {
            WorkItemRepo::insert(&mut *tx, new_item).await?;
        }
        let canceled = if plan.cancel_remaining {
            WorkItemRepo::cancel_remaining(&mut *tx, job_id).await?
        } else {
            0
        };
        save_job(&mut tx, &mut job, persisted_links).await?;
        tx.commit().await?;

        tracing::info!(
            work_item_id = id,
            job_id = %job_id,
            status = %saved.status,
            job_status = %job.status,
            progress = job.progress,
            new_items = plan.new_items.len(),
            canceled,
            "Work item completed",
        );
        Ok(saved)
    }

    async fn apply_job_action(&self, job_id: JobId, action: JobAction) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = JobRepo::lock_by_job_id(&mut *tx, job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job", job_id))?;
        let mut job = hydrate(&mut tx, row).await?;
        let persisted_links = job.links.len();

        let cascade = action.apply(&mut job)?;
        if cascade {
            let canceled = WorkItemRepo::cancel_remaining(&mut *tx, job_id).await?;
            tracing::info!(job_id = %job_id, canceled, "Canceled remaining work items");
        }
        save_job(&mut tx, &mut job, persisted_links).await?;
        tx.commit().await?;

        tracing::info!(job_id = %job_id, ?action, status = %job.status, "Job action applied");
        Ok(job)
    }

    async fn stale_job_ids(&self, cutoff: Timestamp) -> Result<Vec<JobId>, StoreError> {
        Ok(JobRepo::find_stale(&self.pool, cutoff).await?)
    }

    async fn fail_stale_job(
        &self,
        job_id: JobId,
        cutoff: Timestamp,
        message: &str,
    ) -> Result<Option<Job>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = JobRepo::lock_by_job_id(&mut *tx, job_id).await? else {
            return Ok(None);
        };
        if !JobRepo::is_stale(&mut *tx, job_id, cutoff).await? {
            tracing::debug!(job_id = %job_id, "Job saw activity since the stale query, skipping");
            return Ok(None);
        }
        let mut job = hydrate(&mut tx, row).await?;
        let persisted_links = job.links.len();

        job.fail(Some(message))?;
        let canceled = WorkItemRepo::cancel_remaining(&mut *tx, job_id).await?;
        save_job(&mut tx, &mut job, persisted_links).await?;
        tx.commit().await?;

        tracing::info!(job_id = %job_id, canceled, "Failed stale job");
        Ok(Some(job))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
