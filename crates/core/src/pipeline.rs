//! Pipeline planning: job admission and work-item completion.
//!
//! Both stores (PostgreSQL and in-memory) load the rows involved, call into
//! this module, and persist the returned plan inside one transaction. All
//! decisions about statuses, aggregation barriers, paging and progress live
//! here so the stores only differ in how they lock and write.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::{Job, JobLink};
use crate::status::{JobStatus, WorkItemStatus};
use crate::types::DbId;
use crate::work_item::{NewWorkItem, WorkItem, WorkItemUpdate};
use crate::workflow_step::{StepRequest, WorkflowStep};

/// Default page size for paged enumeration steps.
pub const DEFAULT_PAGE_SIZE: i32 = 2000;

fn default_true() -> bool {
    true
}

/* --------------------------------------------------------------------------
Admission
-------------------------------------------------------------------------- */

/// Body of `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub username: String,
    /// The originating request URL.
    pub request: String,
    /// Total units expected. Defaults to the number of `inputs`.
    #[serde(default)]
    pub num_input_granules: Option<i32>,
    #[serde(default)]
    pub collection_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_async: bool,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub staging_location: Option<String>,
    pub steps: Vec<StepRequest>,
    /// Input locations for a non-paged first step, one item each.
    #[serde(default)]
    pub inputs: Vec<String>,
}

/// Rows to insert for a newly admitted job.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub job: Job,
    pub steps: Vec<WorkflowStep>,
    pub items: Vec<NewWorkItem>,
}

fn pages(total: i32, page_size: i32) -> i32 {
    if page_size <= 0 {
        return 1;
    }
    ((total.max(0) + page_size - 1) / page_size).max(1)
}

/// Convert a collection length to a stored count.
fn checked_count(len: usize, what: &str) -> Result<i32, String> {
    i32::try_from(len).map_err(|_| {
        format!(
            "Job has too many {what} ({len}), at most {} are allowed",
            i32::MAX
        )
    })
}

/// Validate a job request and build its job, steps and first-step items.
///
/// Every problem found is reported in a single validation error.
pub fn plan_admission(request: JobRequest, page_size: i32) -> Result<Admission, CoreError> {
    let input_count = checked_count(request.inputs.len(), "inputs");
    let step_count = checked_count(request.steps.len(), "workflow steps");
    let inputs_len = input_count.clone().unwrap_or(0);
    let num_input_granules = request.num_input_granules.unwrap_or(inputs_len);

    let mut job = Job::new(request.username, request.request, num_input_granules);
    job.collection_ids = request.collection_ids;
    job.is_async = request.is_async;
    job.preview = request.preview;
    if let Some(location) = request.staging_location.as_deref() {
        job.add_staging_bucket_link(location);
    }

    let mut errors = job.validate();
    errors.extend(input_count.err());
    errors.extend(step_count.err());
    if num_input_granules < 0 {
        errors.push("numInputGranules must be greater than or equal to 0".to_string());
    }
    if request.steps.is_empty() {
        errors.push("Job must have at least one workflow step".to_string());
    }
    for (index, step) in request.steps.iter().enumerate() {
        if step.service_id.trim().is_empty() {
            errors.push(format!("Workflow step {index} must name a service"));
        }
        if index == 0 && step.has_aggregated_output {
            errors.push("The first workflow step cannot aggregate output".to_string());
        }
        if index > 0 && step.is_paged {
            errors.push(format!(
                "Workflow step {index} cannot be paged, only the first step may be"
            ));
        }
    }
    let first_paged = request.steps.first().is_some_and(|s| s.is_paged);
    if !request.steps.is_empty() && !first_paged && request.inputs.is_empty() {
        errors.push("Job must provide at least one input for its first workflow step".to_string());
    }
    if !errors.is_empty() {
        return Err(CoreError::Validation(errors.join("; ")));
    }

    let steps: Vec<WorkflowStep> = request
        .steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            let work_item_count = if index == 0 {
                if step.is_paged {
                    pages(num_input_granules, page_size)
                } else {
                    inputs_len
                }
            } else if step.has_aggregated_output {
                step.work_item_count.unwrap_or(1)
            } else {
                step.work_item_count.unwrap_or(num_input_granules)
            };
            WorkflowStep {
                job_id: job.job_id,
                step_index: index as i32, // bounded by the workflow step count check
                service_id: step.service_id,
                work_item_count,
                has_aggregated_output: step.has_aggregated_output,
                is_paged: step.is_paged,
                operation: step.operation,
            }
        })
        .collect();

    let first = &steps[0];
    let items = if first.is_paged {
        vec![NewWorkItem {
            job_id: job.job_id,
            step_index: first.step_index,
            service_id: first.service_id.clone(),
            operation: first.operation.clone(),
            inputs: Vec::new(),
            scroll_id: Some(String::new()),
        }]
    } else {
        request
            .inputs
            .into_iter()
            .map(|input| NewWorkItem {
                job_id: job.job_id,
                step_index: first.step_index,
                service_id: first.service_id.clone(),
                operation: first.operation.clone(),
                inputs: vec![input],
                scroll_id: None,
            })
            .collect()
    };

    Ok(Admission { job, steps, items })
}

/* --------------------------------------------------------------------------
Completion
-------------------------------------------------------------------------- */

/// Rows loaded (and locked) by a store before planning a completion.
#[derive(Debug, Clone, Copy)]
pub struct CompletionContext<'a> {
    /// The reported item, as currently persisted.
    pub item: &'a WorkItem,
    pub step: &'a WorkflowStep,
    pub next_step: Option<&'a WorkflowStep>,
    /// Every item of the reported item's step, ordered by id.
    pub step_items: &'a [WorkItem],
    pub page_size: i32,
}

/// Writes a store performs after a completion was accepted.
///
/// The job passed to [`plan_completion`] is updated in place and must be
/// saved alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionPlan {
    pub item: WorkItem,
    /// Cancel every other non-terminal item of the job.
    pub cancel_remaining: bool,
    /// `(step_index, work_item_count)` revisions.
    pub step_counts: Vec<(i32, i32)>,
    pub new_items: Vec<NewWorkItem>,
}

impl CompletionPlan {
    fn new(item: WorkItem) -> Self {
        Self {
            item,
            cancel_remaining: false,
            step_counts: Vec::new(),
            new_items: Vec::new(),
        }
    }
}

/// Decide the effect of a worker reporting `update` for `ctx.item`.
///
/// Returns a conflict when the item or its job is already terminal and a
/// validation error when the reported status is not `successful` or
/// `failed`. On error `job` is unchanged.
pub fn plan_completion(
    job: &mut Job,
    ctx: CompletionContext<'_>,
    update: &WorkItemUpdate,
) -> Result<CompletionPlan, CoreError> {
    let current = ctx.item;
    if current.status.is_terminal() {
        return Err(CoreError::Conflict(format!(
            "WorkItem [{}] has already completed with status {}",
            current.id, current.status
        )));
    }
    if job.is_complete() {
        return Err(CoreError::Conflict(format!(
            "Job [{}] is already {}",
            job.job_id, job.status
        )));
    }

    let mut item = current.clone();
    item.duration = update.duration.or(item.duration);

    match update.status {
        Some(WorkItemStatus::Failed) => {
            let error = update
                .error_message
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Unknown error".to_string());
            let message = format!("WorkItem [{}] failed with error: {error}", item.id);
            job.fail(Some(message.as_str()))?;
            item.status = WorkItemStatus::Failed;
            item.error_message = Some(error);
            let mut plan = CompletionPlan::new(item);
            plan.cancel_remaining = true;
            Ok(plan)
        }
        Some(WorkItemStatus::Successful) => {
            item.status = WorkItemStatus::Successful;
            item.results = update.results.clone();
            item.total_items_size = update.total_items_size;
            item.output_item_sizes = update.output_item_sizes.clone();
            item.hits = update.hits;
            if ctx.step.is_paged {
                if let Some(cursor) = &update.scroll_id {
                    item.scroll_id = Some(cursor.clone());
                }
            }
            plan_success(job, ctx, update, item)
        }
        other => Err(CoreError::Validation(format!(
            "Work item status must be successful or failed, got {}",
            other.map_or("none", |s| s.as_str())
        ))),
    }
}

fn plan_success(
    job: &mut Job,
    ctx: CompletionContext<'_>,
    update: &WorkItemUpdate,
    item: WorkItem,
) -> Result<CompletionPlan, CoreError> {
    let step = ctx.step;
    let mut step_count = step.work_item_count;
    let produced = ctx.step_items.len() as i32;

    // Paged enumeration revises the expected totals from discovered hits.
    if step.is_paged {
        if let Some(hits) = update.hits.filter(|h| *h >= 0) {
            let hits = i32::try_from(hits).unwrap_or(i32::MAX);
            if job.num_input_granules <= 0 || hits < job.num_input_granules {
                job.num_input_granules = hits;
            }
            step_count = pages(job.num_input_granules, ctx.page_size);
        }
    }

    let next_cursor = update.scroll_id.as_deref().filter(|c| !c.is_empty());
    if step.is_paged && next_cursor.is_none() {
        // Enumeration is exhausted, the step is complete at this many pages.
        step_count = produced;
    }

    if step.step_index == 0 {
        let total = if step.is_paged {
            step_count
        } else {
            job.num_input_granules
        };
        job.complete_batch(total);
    }

    if ctx.next_step.is_none() {
        for result in &item.results {
            job.add_link(JobLink::data(result.clone()));
        }
    }

    let mut plan = CompletionPlan::new(item);
    if step_count != step.work_item_count {
        plan.step_counts.push((step.step_index, step_count));
    }

    if let Some(cursor) = next_cursor {
        if step.is_paged && produced < step_count {
            plan.new_items.push(NewWorkItem {
                job_id: job.job_id,
                step_index: step.step_index,
                service_id: step.service_id.clone(),
                operation: step.operation.clone(),
                inputs: Vec::new(),
                scroll_id: Some(cursor.to_string()),
            });
            return Ok(plan);
        }
    }

    // Aggregation barrier: the step must have produced all of its items and
    // every one of them must have succeeded.
    let siblings_done = ctx
        .step_items
        .iter()
        .filter(|other| other.id != plan.item.id)
        .all(|other| other.status == WorkItemStatus::Successful);
    if produced < step_count || !siblings_done {
        return Ok(plan);
    }

    match ctx.next_step {
        Some(next) => {
            let results = step_results(ctx.step_items, &plan.item);
            let new_items: Vec<NewWorkItem> = if next.has_aggregated_output {
                vec![next_step_item(job, next, results)]
            } else {
                results
                    .into_iter()
                    .map(|result| next_step_item(job, next, vec![result]))
                    .collect()
            };
            plan.step_counts
                .push((next.step_index, new_items.len() as i32));
            if new_items.is_empty() {
                let message = format!(
                    "The job has completed successfully. Step {} ({}) produced no output for {}",
                    step.step_index, step.service_id, next.service_id
                );
                finish(job, Some(message.as_str()))?;
            }
            plan.new_items = new_items;
        }
        None => finish(job, None)?,
    }
    Ok(plan)
}

/// Results of every item in the step, ordered by item id.
fn step_results(step_items: &[WorkItem], completed: &WorkItem) -> Vec<String> {
    let mut ordered: Vec<(DbId, &[String])> = step_items
        .iter()
        .map(|other| {
            let results = if other.id == completed.id {
                &completed.results
            } else {
                &other.results
            };
            (other.id, results.as_slice())
        })
        .collect();
    ordered.sort_by_key(|(id, _)| *id);
    ordered
        .into_iter()
        .flat_map(|(_, results)| results.iter().cloned())
        .collect()
}

fn next_step_item(job: &Job, next: &WorkflowStep, inputs: Vec<String>) -> NewWorkItem {
    NewWorkItem {
        job_id: job.job_id,
        step_index: next.step_index,
        service_id: next.service_id.clone(),
        operation: next.operation.clone(),
        inputs,
        scroll_id: None,
    }
}

/// Move the job to `successful`, leaving preview or pause first.
fn finish(job: &mut Job, message: Option<&str>) -> Result<(), CoreError> {
    match job.status {
        JobStatus::Previewing => job.skip_preview()?,
        JobStatus::Paused => job.resume()?,
        JobStatus::Accepted => job.start()?,
        _ => {}
    }
    job.succeed(message)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn step_request(service: &str) -> StepRequest {
        StepRequest {
            service_id: service.to_string(),
            operation: json!({ "format": "netcdf" }),
            has_aggregated_output: false,
            is_paged: false,
            work_item_count: None,
        }
    }

    fn job_request(steps: Vec<StepRequest>, inputs: &[&str]) -> JobRequest {
        JobRequest {
            username: "joe".to_string(),
            request: "https://example.com/jobs?x=1".to_string(),
            num_input_granules: None,
            collection_ids: vec!["C1".to_string()],
            is_async: true,
            preview: false,
            staging_location: None,
            steps,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Materialize an admission into persisted-looking rows.
    fn persisted(admission: &Admission) -> (Job, Vec<WorkItem>) {
        let mut job = admission.job.clone();
        job.start().unwrap();
        job.mark_persisted();
        let items = admission
            .items
            .iter()
            .enumerate()
            .map(|(i, new)| item_from(new, i as DbId + 1))
            .collect();
        (job, items)
    }

    fn item_from(new: &NewWorkItem, id: DbId) -> WorkItem {
        WorkItem {
            id,
            job_id: new.job_id,
            step_index: new.step_index,
            service_id: new.service_id.clone(),
            status: WorkItemStatus::Running,
            operation: new.operation.clone(),
            inputs: new.inputs.clone(),
            results: Vec::new(),
            error_message: None,
            duration: None,
            scroll_id: new.scroll_id.clone(),
            hits: None,
            total_items_size: None,
            output_item_sizes: Vec::new(),
            pod_name: Some("pod-a".to_string()),
            created_at: None,
            updated_at: None,
        }
    }

    fn ctx<'a>(
        item: &'a WorkItem,
        steps: &'a [WorkflowStep],
        step_items: &'a [WorkItem],
    ) -> CompletionContext<'a> {
        let index = item.step_index as usize;
        CompletionContext {
            item,
            step: &steps[index],
            next_step: steps.get(index + 1),
            step_items,
            page_size: 10,
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    #[test]
    fn admission_creates_one_item_per_input() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a"), step_request("svc-b")], &["g1", "g2"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        assert_eq!(admission.job.status, JobStatus::Accepted);
        assert_eq!(admission.job.num_input_granules, 2);
        assert_eq!(admission.steps.len(), 2);
        assert_eq!(admission.steps[0].work_item_count, 2);
        assert_eq!(admission.steps[1].work_item_count, 2);
        assert_eq!(admission.items.len(), 2);
        assert_eq!(admission.items[1].inputs, vec!["g2".to_string()]);
    }

    #[test]
    fn admission_of_paged_step_creates_single_cursor_item() {
        let mut first = step_request("query");
        first.is_paged = true;
        let mut request = job_request(vec![first, step_request("svc-b")], &[]);
        request.num_input_granules = Some(25);
        let admission = plan_admission(request, 10).unwrap();
        assert_eq!(admission.steps[0].work_item_count, 3);
        assert_eq!(admission.items.len(), 1);
        assert_eq!(admission.items[0].scroll_id.as_deref(), Some(""));
    }

    #[test]
    fn admission_reports_every_problem() {
        let mut first = step_request("");
        first.has_aggregated_output = true;
        let mut request = job_request(vec![first], &[]);
        request.request = "not-a-url".to_string();
        let err = plan_admission(request, DEFAULT_PAGE_SIZE).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) => {
            assert!(msg.contains("Job request must be a URL"));
            assert!(msg.contains("must name a service"));
            assert!(msg.contains("cannot aggregate"));
            assert!(msg.contains("at least one input"));
        });
    }

    #[test]
    fn counts_beyond_i32_are_rejected() {
        assert_eq!(checked_count(3, "inputs"), Ok(3));
        assert_eq!(checked_count(i32::MAX as usize, "inputs"), Ok(i32::MAX));
        let err = checked_count(i32::MAX as usize + 1, "inputs").unwrap_err();
        assert!(err.starts_with("Job has too many inputs (2147483648)"), "{err}");
    }

    #[test]
    fn admission_rejects_empty_pipeline() {
        let err = plan_admission(job_request(vec![], &["g1"]), DEFAULT_PAGE_SIZE).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("at least one workflow step"));
    }

    #[test]
    fn admission_adds_staging_link() {
        let mut request = job_request(vec![step_request("svc-a")], &["g1"]);
        request.staging_location = Some("s3://staging/job/".to_string());
        let admission = plan_admission(request, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(admission.job.links.len(), 1);
        assert_eq!(admission.job.links[0].rel, "s3-access");
    }

    // -----------------------------------------------------------------------
    // Fan-out and aggregation
    // -----------------------------------------------------------------------

    #[test]
    fn fan_out_waits_for_barrier_then_creates_item_per_result() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a"), step_request("svc-b")], &["g1", "g2"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, mut items) = persisted(&admission);
        let steps = admission.steps.clone();

        let first = items[0].clone();
        let plan = plan_completion(
            &mut job,
            ctx(&first, &steps, &items),
            &WorkItemUpdate::succeeded(vec!["out-1".to_string()]),
        )
        .unwrap();
        assert!(plan.new_items.is_empty());
        assert_eq!(job.progress, 50);
        items[0] = plan.item;

        let second = items[1].clone();
        let plan = plan_completion(
            &mut job,
            ctx(&second, &steps, &items),
            &WorkItemUpdate::succeeded(vec!["out-2".to_string()]),
        )
        .unwrap();
        assert_eq!(plan.new_items.len(), 2);
        assert_eq!(plan.new_items[0].inputs, vec!["out-1".to_string()]);
        assert_eq!(plan.new_items[1].inputs, vec!["out-2".to_string()]);
        assert_eq!(plan.step_counts, vec![(1, 2)]);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 99);
    }

    #[test]
    fn aggregating_step_gets_exactly_one_item() {
        let mut agg = step_request("concat");
        agg.has_aggregated_output = true;
        let admission = plan_admission(
            job_request(vec![step_request("svc-a"), agg], &["g1", "g2", "g3"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, mut items) = persisted(&admission);
        let steps = admission.steps.clone();

        let mut last_plan = None;
        for i in 0..3 {
            let current = items[i].clone();
            let plan = plan_completion(
                &mut job,
                ctx(&current, &steps, &items),
                &WorkItemUpdate::succeeded(vec![format!("out-{i}")]),
            )
            .unwrap();
            items[i] = plan.item.clone();
            last_plan = Some(plan);
        }
        let plan = last_plan.unwrap();
        assert_eq!(plan.new_items.len(), 1);
        assert_eq!(plan.new_items[0].inputs, vec!["out-0", "out-1", "out-2"]);
        assert_eq!(plan.step_counts, vec![(1, 1)]);
    }

    #[test]
    fn last_step_barrier_succeeds_job_with_links() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a")], &["g1"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, items) = persisted(&admission);
        let plan = plan_completion(
            &mut job,
            ctx(&items[0], &admission.steps, &items),
            &WorkItemUpdate::succeeded(vec!["s3://out/a.nc".to_string()]),
        )
        .unwrap();
        assert!(plan.new_items.is_empty());
        assert_eq!(job.status, JobStatus::Successful);
        assert_eq!(job.progress, 100);
        assert_eq!(job.links, vec![JobLink::data("s3://out/a.nc")]);
    }

    #[test]
    fn previewing_job_skips_preview_before_success() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a")], &["g1"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let mut job = admission.job.clone();
        job.start_with_preview().unwrap();
        let items = vec![item_from(&admission.items[0], 1)];
        plan_completion(
            &mut job,
            ctx(&items[0], &admission.steps, &items),
            &WorkItemUpdate::succeeded(vec![]),
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Successful);
    }

    #[test]
    fn no_fan_out_results_completes_job() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a"), step_request("svc-b")], &["g1"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, items) = persisted(&admission);
        let plan = plan_completion(
            &mut job,
            ctx(&items[0], &admission.steps, &items),
            &WorkItemUpdate::succeeded(vec![]),
        )
        .unwrap();
        assert!(plan.new_items.is_empty());
        assert_eq!(job.status, JobStatus::Successful);
        assert!(job.message.contains("produced no output"));
    }

    // -----------------------------------------------------------------------
    // Paging
    // -----------------------------------------------------------------------

    #[test]
    fn paged_step_synthesizes_next_page_and_revises_hits() {
        let mut first = step_request("query");
        first.is_paged = true;
        let mut request = job_request(vec![first, step_request("svc-b")], &[]);
        request.num_input_granules = Some(100);
        let admission = plan_admission(request, 10).unwrap();
        let (mut job, items) = persisted(&admission);

        let mut update = WorkItemUpdate::succeeded(vec!["g1".into(), "g2".into()]);
        update.scroll_id = Some("cursor-2".to_string());
        update.hits = Some(15);
        let plan = plan_completion(&mut job, ctx(&items[0], &admission.steps, &items), &update)
            .unwrap();

        assert_eq!(job.num_input_granules, 15);
        assert_eq!(plan.step_counts, vec![(0, 2)]);
        assert_eq!(plan.new_items.len(), 1);
        assert_eq!(plan.new_items[0].step_index, 0);
        assert_eq!(plan.new_items[0].scroll_id.as_deref(), Some("cursor-2"));
    }

    #[test]
    fn hits_never_revise_granules_upwards() {
        let mut first = step_request("query");
        first.is_paged = true;
        let mut request = job_request(vec![first, step_request("svc-b")], &[]);
        request.num_input_granules = Some(5);
        let admission = plan_admission(request, 10).unwrap();
        let (mut job, items) = persisted(&admission);

        let mut update = WorkItemUpdate::succeeded(vec!["g1".into()]);
        update.hits = Some(500);
        let plan = plan_completion(&mut job, ctx(&items[0], &admission.steps, &items), &update)
            .unwrap();
        assert_eq!(job.num_input_granules, 5);
        // No cursor: enumeration is complete and the barrier fans out.
        assert_eq!(plan.new_items.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Failure and conflicts
    // -----------------------------------------------------------------------

    #[test]
    fn failure_fails_job_and_requests_cascade() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a")], &["g1", "g2", "g3"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, items) = persisted(&admission);
        let plan = plan_completion(
            &mut job,
            ctx(&items[1], &admission.steps, &items),
            &WorkItemUpdate::failed("disk full"),
        )
        .unwrap();
        assert!(plan.cancel_remaining);
        assert_eq!(plan.item.status, WorkItemStatus::Failed);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.message, "WorkItem [2] failed with error: disk full");
    }

    #[test]
    fn terminal_item_is_a_conflict() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a")], &["g1"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, mut items) = persisted(&admission);
        items[0].status = WorkItemStatus::Failed;
        let before = job.clone();
        let err = plan_completion(
            &mut job,
            ctx(&items[0], &admission.steps, &items),
            &WorkItemUpdate::succeeded(vec![]),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
        assert_eq!(job, before);
    }

    #[test]
    fn terminal_job_is_a_conflict() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a")], &["g1"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, items) = persisted(&admission);
        job.cancel(None).unwrap();
        let err = plan_completion(
            &mut job,
            ctx(&items[0], &admission.steps, &items),
            &WorkItemUpdate::succeeded(vec![]),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
    }

    #[test]
    fn non_final_status_is_a_validation_error() {
        let admission = plan_admission(
            job_request(vec![step_request("svc-a")], &["g1"]),
            DEFAULT_PAGE_SIZE,
        )
        .unwrap();
        let (mut job, items) = persisted(&admission);
        let update = WorkItemUpdate {
            status: Some(WorkItemStatus::Running),
            ..WorkItemUpdate::default()
        };
        let err = plan_completion(&mut job, ctx(&items[0], &admission.steps, &items), &update)
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }
}
