//! Job and job link rows.

use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;
use stepflow_core::error::CoreError;
use stepflow_core::job::{Job, JobLink};
use stepflow_core::status::{JobStatus, StatusId};
use stepflow_core::types::{DbId, JobId, Timestamp};

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub job_id: JobId,
    pub request_id: uuid::Uuid,
    pub username: String,
    pub status_id: StatusId,
    pub message: String,
    pub progress: i32,
    pub batches_completed: i32,
    pub num_input_granules: i32,
    pub request: String,
    pub is_async: bool,
    pub preview: bool,
    pub collection_ids: Json<Vec<String>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRow {
    /// Build the domain job, marked as persisted with its current status.
    pub fn into_job(self, links: Vec<JobLink>) -> Result<Job, CoreError> {
        let status = JobStatus::from_id(self.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "Unknown job status id {} for job {}",
                self.status_id, self.job_id
            ))
        })?;
        let mut job = Job::new(self.username, self.request, self.num_input_granules);
        job.job_id = self.job_id;
        job.request_id = self.request_id;
        job.status = status;
        job.message = self.message;
        job.progress = self.progress;
        job.batches_completed = self.batches_completed;
        job.is_async = self.is_async;
        job.preview = self.preview;
        job.links = links;
        job.collection_ids = self.collection_ids.0;
        job.created_at = Some(self.created_at);
        job.updated_at = Some(self.updated_at);
        job.mark_persisted();
        Ok(job)
    }
}

/// A row from the `job_links` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobLinkRow {
    pub id: DbId,
    pub job_id: JobId,
    pub href: String,
    pub title: Option<String>,
    pub mime_type: Option<String>,
    pub rel: String,
    pub created_at: Timestamp,
}

impl From<JobLinkRow> for JobLink {
    fn from(row: JobLinkRow) -> Self {
        JobLink {
            href: row.href,
            title: row.title,
            mime_type: row.mime_type,
            rel: row.rel,
        }
    }
}

/// Query parameters for `GET /jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub username: Option<String>,
    /// Filter by status label, e.g. `running`.
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl JobListQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_limit_defaults_and_caps() {
        assert_eq!(JobListQuery::default().effective_limit(), DEFAULT_LIMIT);
        let query = JobListQuery {
            limit: Some(5000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), MAX_LIMIT);
        assert_eq!(query.effective_offset(), 0);
    }
}
