//! The pull loop: poll the scheduler, run the item, report the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stepflow_core::status::WorkItemStatus;
use stepflow_core::work_item::WorkItem;
use tokio_util::sync::CancellationToken;

use crate::backoff::RetryPolicy;
use crate::client::{PullOutcome, SchedulerClient};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::runner::{RunnerError, ServiceRunner};
use crate::workdir::WorkingDirectory;

/// Polls between debug log lines.
const POLL_LOG_PERIOD: u64 = 10;

/// Pause after a poll fails with an unexpected status.
const UNEXPECTED_ERROR_PAUSE: Duration = Duration::from_secs(3);

/// Pause between priming attempts.
const PRIME_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Whether the loop should keep going after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Continue,
    Terminate,
}

pub struct PullWorker<R> {
    client: SchedulerClient,
    runner: Arc<R>,
    workdir: WorkingDirectory,
    poll_interval: Duration,
    error_pause: Duration,
    prime_max_retries: u32,
    skip_priming: bool,
    poll_count: u64,
}

impl<R: ServiceRunner + 'static> PullWorker<R> {
    pub fn new(config: &WorkerConfig, runner: R) -> Self {
        let client = SchedulerClient::new(
            &config.backend_url(),
            config.service_id.clone(),
            config.pod_name.clone(),
            config.max_put_work_retries,
        );
        Self {
            client,
            runner: Arc::new(runner),
            workdir: WorkingDirectory::new(&config.working_dir),
            poll_interval: config.poll_interval(),
            error_pause: UNEXPECTED_ERROR_PAUSE,
            prime_max_retries: config.prime_max_retries,
            skip_priming: config.skip_priming,
            poll_count: 0,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.client = self.client.with_retry_policy(policy);
        self
    }

    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Polls issued so far.
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    // -----------------------------------------------------------------------
    // Priming
    // -----------------------------------------------------------------------

    /// Call [`ServiceRunner::prime`] until it succeeds or the retry budget
    /// is spent.
    pub async fn prime(&self) -> Result<(), WorkerError> {
        if self.skip_priming {
            tracing::debug!("Priming skipped");
            return Ok(());
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.runner.prime().await {
                Ok(()) => {
                    tracing::info!(attempts, "Service primed");
                    return Ok(());
                }
                Err(source) if attempts >= self.prime_max_retries => {
                    tracing::error!(attempts, error = %source, "Failed to prime service");
                    return Err(WorkerError::Priming { attempts, source });
                }
                Err(e) => {
                    tracing::debug!(attempts, error = %e, "Priming attempt failed");
                    tokio::time::sleep(PRIME_RETRY_INTERVAL).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Run iterations until a termination request or `cancel` fires.
    ///
    /// Cancellation is only observed between iterations.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!(work_url = %self.client.work_url(), "Pull worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.pull_and_do_work().await == IterationOutcome::Terminate {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!(polls = self.poll_count, "Pull worker stopped");
    }

    /// One iteration: clean up, check for termination, poll, run, report.
    pub async fn pull_and_do_work(&mut self) -> IterationOutcome {
        let _working = self.workdir.begin_iteration().await;

        if self.workdir.take_termination_request().await {
            tracing::warn!("Received termination request, no longer processing work");
            return IterationOutcome::Terminate;
        }

        self.poll_count += 1;
        if self.poll_count % POLL_LOG_PERIOD == 0 {
            tracing::debug!(polls = self.poll_count, "Polling for work");
        }

        match self.client.pull_work(&self.workdir).await {
            Ok(PullOutcome::Work(work)) => {
                let work_item_id = work.work_item.id;
                let job_id = work.work_item.job_id;
                tracing::debug!(work_item_id, job_id = %job_id, "Performing work");

                let item = self.do_work(work.work_item, work.max_cmr_granules).await;
                self.report(&item).await;
            }
            Ok(PullOutcome::NoWork) => {}
            Err(e) => {
                tracing::error!(status = ?e.status(), error = %e, "Unexpected error while pulling work");
                tokio::time::sleep(self.error_pause).await;
            }
        }
        IterationOutcome::Continue
    }

    /// Execute `item` and fold the outcome into it, ready to report.
    ///
    /// The runner executes on its own task, so a panicking runner fails the
    /// item instead of the worker.
    pub async fn do_work(&self, mut item: WorkItem, page_size: i32) -> WorkItem {
        let start = Instant::now();
        let paged = item.is_paged();
        let runner = Arc::clone(&self.runner);
        let task_item = item.clone();
        let task = tokio::spawn(async move {
            if paged {
                runner.run_query(&task_item, page_size).await
            } else {
                runner.run(&task_item).await
            }
        });
        let result = task.await.unwrap_or_else(|e| Err(join_failure(e)));
        item.duration = Some(start.elapsed().as_millis() as i64);

        match result {
            Ok(output) => {
                item.status = WorkItemStatus::Successful;
                item.results = output.results;
                item.total_items_size = output.total_items_size;
                item.output_item_sizes = output.output_item_sizes;
                if paged {
                    item.scroll_id = output.scroll_id;
                    item.hits = output.hits;
                }
            }
            Err(e) => {
                tracing::error!(work_item_id = item.id, error = %e, "Service failed");
                item.status = WorkItemStatus::Failed;
                item.error_message = Some(e.to_string());
            }
        }
        item
    }

    async fn report(&self, item: &WorkItem) {
        match self.client.update_work(item).await {
            Ok(()) => {
                tracing::debug!(work_item_id = item.id, status = %item.status, "Reported work item");
            }
            Err(WorkerError::UnexpectedStatus { status: 409, body }) => {
                tracing::warn!(work_item_id = item.id, body = %body, "Scheduler rejected update with 409");
            }
            Err(e) => {
                tracing::error!(
                    work_item_id = item.id,
                    status = ?e.status(),
                    error = %e,
                    "Error updating work item",
                );
            }
        }
    }
}

fn join_failure(err: tokio::task::JoinError) -> RunnerError {
    if !err.is_panic() {
        return RunnerError::Service(format!("Service runner task failed: {err}"));
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RunnerError::Service(format!("Service runner panicked: {detail}"))
}
