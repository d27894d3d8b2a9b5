//! Periodic failure of stalled jobs.
//!
//! A job that stays `running` with no job or work item activity for longer
//! than the stale threshold is failed, which also cancels its remaining
//! work items.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stepflow_db::WorkStore;
use tokio_util::sync::CancellationToken;

/// Fail every stale running job once. Returns how many were failed.
pub async fn reap_once(store: &dyn WorkStore, stale_after: chrono::Duration) -> usize {
    let cutoff = Utc::now() - stale_after;
    let stale = match store.stale_job_ids(cutoff).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "Job reaper: stale job query failed");
            return 0;
        }
    };

    let message = format!(
        "The job timed out after {} minutes without progress",
        stale_after.num_minutes()
    );
    let mut failed = 0;
    for job_id in stale {
        match store.fail_stale_job(job_id, cutoff, &message).await {
            Ok(Some(_)) => {
                failed += 1;
                tracing::warn!(job_id = %job_id, "Job reaper: failed stale job");
            }
            Ok(None) => tracing::debug!(job_id = %job_id, "Job reaper: job no longer stale"),
            Err(e) => tracing::debug!(job_id = %job_id, error = %e, "Job reaper: skipped job"),
        }
    }
    failed
}

/// Run the reaper loop until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn WorkStore>,
    interval: Duration,
    stale_after: chrono::Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        stale_minutes = stale_after.num_minutes(),
        "Job reaper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                let failed = reap_once(store.as_ref(), stale_after).await;
                if failed > 0 {
                    tracing::info!(failed, "Job reaper: failed stale jobs");
                } else {
                    tracing::debug!("Job reaper: no stale jobs");
                }
            }
        }
    }
}
