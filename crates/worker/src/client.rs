//! HTTP client for the scheduler's work protocol.

use reqwest::StatusCode;
use stepflow_core::work_item::{WorkItem, WorkResponse};

use crate::backoff::RetryPolicy;
use crate::error::WorkerError;
use crate::workdir::WorkingDirectory;

/// Result of one poll for work.
#[derive(Debug)]
pub enum PullOutcome {
    Work(WorkResponse),
    NoWork,
}

/// Client for `GET /service/work` and `PUT /service/work/{id}`.
pub struct SchedulerClient {
    http: reqwest::Client,
    work_url: String,
    service_id: String,
    pod_name: String,
    policy: RetryPolicy,
    max_put_retries: u32,
}

impl SchedulerClient {
    /// * `base_url` - scheduler root, e.g. `http://localhost:3000`.
    pub fn new(
        base_url: &str,
        service_id: impl Into<String>,
        pod_name: impl Into<String>,
        max_put_retries: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            work_url: format!("{}/service/work", base_url.trim_end_matches('/')),
            service_id: service_id.into(),
            pod_name: pod_name.into(),
            policy: RetryPolicy::default(),
            max_put_retries,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn work_url(&self) -> &str {
        &self.work_url
    }

    /// Ask the scheduler for the next work item.
    ///
    /// Transport errors and 5xx responses are retried without limit unless
    /// the pod has been asked to terminate. Any other non-success status is
    /// returned as [`WorkerError::UnexpectedStatus`].
    pub async fn pull_work(&self, workdir: &WorkingDirectory) -> Result<PullOutcome, WorkerError> {
        let mut retry = 0u32;
        loop {
            let result = self
                .http
                .get(&self.work_url)
                .query(&[
                    ("serviceID", self.service_id.as_str()),
                    ("podName", self.pod_name.as_str()),
                ])
                .send()
                .await;

            let error = match result {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(PullOutcome::NoWork);
                    }
                    if status.is_success() {
                        return Ok(PullOutcome::Work(response.json().await?));
                    }
                    let error = unexpected_status(response).await;
                    if !status.is_server_error() {
                        return Err(error);
                    }
                    error
                }
                Err(e) => WorkerError::Transport(e),
            };

            if workdir.termination_requested() {
                tracing::warn!("Pod termination requested, will not retry");
                return Err(error);
            }

            retry = retry.saturating_add(1);
            let delay = self.policy.delay(retry);
            tracing::warn!(
                error = %error,
                retry,
                delay_ms = delay.as_millis() as u64,
                "Polling for work failed, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Report a finished work item, retrying transport errors and 5xx
    /// responses up to the configured limit.
    pub async fn update_work(&self, item: &WorkItem) -> Result<(), WorkerError> {
        let url = format!("{}/{}", self.work_url, item.id);
        let mut retry = 0u32;
        loop {
            let error = match self.http.put(&url).json(item).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    let server_error = response.status().is_server_error();
                    let error = unexpected_status(response).await;
                    if !server_error {
                        return Err(error);
                    }
                    error
                }
                Err(e) => WorkerError::Transport(e),
            };

            if retry >= self.max_put_retries {
                return Err(error);
            }
            retry += 1;
            let delay = self.policy.delay(retry);
            tracing::warn!(
                work_item_id = item.id,
                error = %error,
                retry,
                delay_ms = delay.as_millis() as u64,
                "Updating work item failed, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }
}

async fn unexpected_status(response: reqwest::Response) -> WorkerError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    WorkerError::UnexpectedStatus { status, body }
}
