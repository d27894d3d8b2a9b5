//! In-process [`WorkStore`] guarded by a single async mutex.
//!
//! Every operation holds the lock for its whole duration, which gives the
//! same atomicity the PostgreSQL store gets from row locks.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use stepflow_core::error::CoreError;
use stepflow_core::job::{Job, JobAction};
use stepflow_core::pipeline::{plan_admission, plan_completion, CompletionContext, JobRequest};
use stepflow_core::status::{JobStatus, WorkItemStatus};
use stepflow_core::types::{DbId, JobId, Timestamp};
use stepflow_core::work_item::{NewWorkItem, WorkItem, WorkItemUpdate};
use stepflow_core::workflow_step::WorkflowStep;
use tokio::sync::Mutex;

use crate::models::job::JobListQuery;
use crate::store::{StoreError, WorkStore};

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    /// Insertion order of jobs, used as a tie-breaker when listing.
    job_order: Vec<JobId>,
    steps: HashMap<JobId, Vec<WorkflowStep>>,
    items: BTreeMap<DbId, WorkItem>,
    next_item_id: DbId,
}

impl State {
    fn insert_item(&mut self, new: &NewWorkItem, now: Timestamp) -> DbId {
        self.next_item_id += 1;
        let id = self.next_item_id;
        self.items.insert(
            id,
            WorkItem {
                id,
                job_id: new.job_id,
                step_index: new.step_index,
                service_id: new.service_id.clone(),
                status: WorkItemStatus::Ready,
                operation: new.operation.clone(),
                inputs: new.inputs.clone(),
                results: Vec::new(),
                error_message: None,
                duration: None,
                scroll_id: new.scroll_id.clone(),
                hits: None,
                total_items_size: None,
                output_item_sizes: Vec::new(),
                pod_name: None,
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
        id
    }

    fn job(&self, job_id: JobId) -> Result<&Job, CoreError> {
        self.jobs
            .get(&job_id)
            .ok_or_else(|| CoreError::not_found("Job", job_id))
    }

    /// Running with no job or running-item activity since `cutoff`.
    fn is_stale(&self, job: &Job, cutoff: Timestamp) -> bool {
        job.status == JobStatus::Running
            && job.updated_at.is_some_and(|at| at < cutoff)
            && !self.items.values().any(|item| {
                item.job_id == job.job_id
                    && item.status == WorkItemStatus::Running
                    && item.updated_at.is_some_and(|at| at >= cutoff)
            })
    }

    fn cancel_remaining(&mut self, job_id: JobId, now: Timestamp) -> usize {
        let mut canceled = 0;
        for item in self.items.values_mut() {
            if item.job_id == job_id && !item.status.is_terminal() {
                item.status = WorkItemStatus::Canceled;
                item.updated_at = Some(now);
                canceled += 1;
            }
        }
        canceled
    }

    /// Persist a job changed under the lock.
    fn save_job(&mut self, mut job: Job, now: Timestamp) -> Result<Job, CoreError> {
        job.prepare_for_save()?;
        job.updated_at = Some(now);
        job.mark_persisted();
        self.jobs.insert(job.job_id, job.clone());
        Ok(job)
    }
}

#[derive(Default)]
pub struct MemoryWorkStore {
    state: Mutex<State>,
}

impl MemoryWorkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkStore for MemoryWorkStore {
    async fn create_job(&self, request: JobRequest, page_size: i32) -> Result<Job, StoreError> {
        let admission = plan_admission(request, page_size)?;
        let mut job = admission.job;
        job.prepare_for_save()?;

        let now = chrono::Utc::now();
        job.created_at = Some(now);
        job.updated_at = Some(now);
        job.mark_persisted();

        let mut state = self.state.lock().await;
        for item in &admission.items {
            state.insert_item(item, now);
        }
        state.steps.insert(job.job_id, admission.steps);
        state.job_order.push(job.job_id);
        state.jobs.insert(job.job_id, job.clone());

        tracing::info!(job_id = %job.job_id, username = %job.username, "Job admitted");
        Ok(job)
    }

    async fn find_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&job_id).cloned())
    }

    async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let jobs = state
            .job_order
            .iter()
            .rev()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| {
                query
                    .username
                    .as_ref()
                    .is_none_or(|username| &job.username == username)
            })
            .filter(|job| query.status.is_none_or(|status| job.status == status))
            .skip(query.effective_offset() as usize)
            .take(query.effective_limit() as usize)
            .cloned()
            .collect();
        Ok(jobs)
    }

    async fn workflow_steps(&self, job_id: JobId) -> Result<Vec<WorkflowStep>, StoreError> {
        let state = self.state.lock().await;
        state.job(job_id)?;
        Ok(state.steps.get(&job_id).cloned().unwrap_or_default())
    }

    async fn work_items(&self, job_id: JobId) -> Result<Vec<WorkItem>, StoreError> {
        let state = self.state.lock().await;
        state.job(job_id)?;
        Ok(state
            .items
            .values()
            .filter(|item| item.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn claim_next(
        &self,
        service_id: &str,
        pod_name: Option<&str>,
    ) -> Result<Option<WorkItem>, StoreError> {
        let mut state = self.state.lock().await;
        let candidate = state
            .items
            .values()
            .find(|item| {
                item.service_id == service_id
                    && item.status == WorkItemStatus::Ready
                    && state
                        .jobs
                        .get(&item.job_id)
                        .is_some_and(|job| job.status.is_active())
            })
            .map(|item| item.id);
        let Some(id) = candidate else {
            return Ok(None);
        };

        let now = chrono::Utc::now();
        let job_id = {
            let item = state
                .items
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("WorkItem", id))?;
            item.status = WorkItemStatus::Running;
            item.pod_name = pod_name.map(str::to_string);
            item.updated_at = Some(now);
            item.job_id
        };

        let mut job = state.job(job_id)?.clone();
        if job.status == JobStatus::Accepted {
            if job.preview {
                job.start_with_preview()?;
            } else {
                job.start()?;
            }
            let job = state.save_job(job, now)?;
            tracing::info!(job_id = %job.job_id, status = %job.status, "Job started");
        }

        let item = state
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("WorkItem", id))?;
        tracing::debug!(work_item_id = id, job_id = %job_id, service_id, "Work item claimed");
        Ok(Some(item))
    }

    async fn complete_work_item(
        &self,
        id: DbId,
        update: &WorkItemUpdate,
        page_size: i32,
    ) -> Result<WorkItem, StoreError> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("WorkItem", id))?;
        let mut job = state.job(item.job_id)?.clone();
        let steps = state.steps.get(&item.job_id).cloned().unwrap_or_default();
        let step = steps
            .iter()
            .find(|s| s.step_index == item.step_index)
            .ok_or_else(|| {
                CoreError::Internal(format!(
                    "Workflow step {} missing for job {}",
                    item.step_index, item.job_id
                ))
            })?;
        let next_step = steps.iter().find(|s| s.step_index == item.step_index + 1);
        let step_items: Vec<WorkItem> = state
            .items
            .values()
            .filter(|other| other.job_id == item.job_id && other.step_index == item.step_index)
            .cloned()
            .collect();

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

        // Validate the job before touching anything so a rejected save
        // leaves the store unchanged.
        job.prepare_for_save()?;

        let now = chrono::Utc::now();
        let mut saved = plan.item;
        saved.updated_at = Some(now);
        state.items.insert(saved.id, saved.clone());

        if let Some(job_steps) = state.steps.get_mut(&item.job_id) {
            for (step_index, count) in &plan.step_counts {
                if let Some(s) = job_steps.iter_mut().find(|s| s.step_index == *step_index) {
                    s.work_item_count = *count;
                }
            }
        }
        for new_item in &plan.new_items {
            state.insert_item(new_item, now);
        }
        let canceled = if plan.cancel_remaining {
            state.cancel_remaining(item.job_id, now)
        } else {
            0
        };
        let job = state.save_job(job, now)?;

        tracing::info!(
            work_item_id = id,
            job_id = %job.job_id,
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
        let mut state = self.state.lock().await;
        let mut job = state.job(job_id)?.clone();
        let cascade = action.apply(&mut job)?;
        job.prepare_for_save()?;

        let now = chrono::Utc::now();
        if cascade {
            let canceled = state.cancel_remaining(job_id, now);
            tracing::info!(job_id = %job_id, canceled, "Canceled remaining work items");
        }
        let job = state.save_job(job, now)?;
        tracing::info!(job_id = %job_id, ?action, status = %job.status, "Job action applied");
        Ok(job)
    }

    async fn stale_job_ids(&self, cutoff: Timestamp) -> Result<Vec<JobId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .job_order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| state.is_stale(job, cutoff))
            .map(|job| job.job_id)
            .collect())
    }

    async fn fail_stale_job(
        &self,
        job_id: JobId,
        cutoff: Timestamp,
        message: &str,
    ) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get(&job_id) else {
            return Ok(None);
        };
        if !state.is_stale(job, cutoff) {
            tracing::debug!(job_id = %job_id, "Job saw activity since the stale query, skipping");
            return Ok(None);
        }
        let mut job = job.clone();
        job.fail(Some(message))?;
        job.prepare_for_save()?;

        let now = chrono::Utc::now();
        let canceled = state.cancel_remaining(job_id, now);
        let job = state.save_job(job, now)?;
        tracing::info!(job_id = %job_id, canceled, "Failed stale job");
        Ok(Some(job))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
