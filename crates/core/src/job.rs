//! Job entity and lifecycle state machine.
//!
//! Transitions are declared in [`TRANSITIONS`] and checked before any field
//! is touched, so a rejected event leaves the job exactly as it was.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::JobStatus;
use crate::types::{JobId, Timestamp};

/// Maximum stored length (in characters) of `message` and `request`.
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Link relation for result data.
pub const REL_DATA: &str = "data";

/// Link relation for the staging bucket link.
pub const REL_S3_ACCESS: &str = "s3-access";

const STAGING_BUCKET_TITLE: &str =
    "Results in AWS S3. Access from AWS us-west-2 with keys from /cloud-access.sh";

static REQUEST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://.+$").expect("request URL pattern is valid")
});

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Events that drive the job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEvent {
    Start,
    StartWithPreview,
    Complete,
    Cancel,
    Fail,
    Pause,
    Resume,
    SkipPreview,
}

impl JobEvent {
    /// The status this event is trying to reach, used in conflict messages.
    pub fn target(self) -> JobStatus {
        match self {
            JobEvent::Start | JobEvent::Resume | JobEvent::SkipPreview => JobStatus::Running,
            JobEvent::StartWithPreview => JobStatus::Previewing,
            JobEvent::Complete => JobStatus::Successful,
            JobEvent::Cancel => JobStatus::Canceled,
            JobEvent::Fail => JobStatus::Failed,
            JobEvent::Pause => JobStatus::Paused,
        }
    }
}

/// Every legal `(from, event) -> to` transition. Anything else is a conflict.
pub const TRANSITIONS: &[(JobStatus, JobEvent, JobStatus)] = &[
    (JobStatus::Accepted, JobEvent::Start, JobStatus::Running),
    (JobStatus::Accepted, JobEvent::StartWithPreview, JobStatus::Previewing),
    (JobStatus::Running, JobEvent::Complete, JobStatus::Successful),
    (JobStatus::Running, JobEvent::Cancel, JobStatus::Canceled),
    (JobStatus::Running, JobEvent::Fail, JobStatus::Failed),
    (JobStatus::Running, JobEvent::Pause, JobStatus::Paused),
    (JobStatus::Previewing, JobEvent::SkipPreview, JobStatus::Running),
    (JobStatus::Previewing, JobEvent::Cancel, JobStatus::Canceled),
    (JobStatus::Previewing, JobEvent::Fail, JobStatus::Failed),
    (JobStatus::Previewing, JobEvent::Pause, JobStatus::Paused),
    (JobStatus::Paused, JobEvent::Resume, JobStatus::Running),
    (JobStatus::Paused, JobEvent::Cancel, JobStatus::Canceled),
    (JobStatus::Paused, JobEvent::Fail, JobStatus::Failed),
    (JobStatus::Failed, JobEvent::Fail, JobStatus::Failed),
];

/// Look up the status reached by applying `event` in status `from`.
pub fn next_status(from: JobStatus, event: JobEvent) -> Option<JobStatus> {
    TRANSITIONS
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}

impl JobStatus {
    /// Message shown when no specific message has been set.
    pub fn default_message(self) -> &'static str {
        match self {
            JobStatus::Accepted => "The job has been accepted and is waiting to be processed",
            JobStatus::Running => "The job is being processed",
            JobStatus::Successful => "The job has completed successfully",
            JobStatus::Failed => "The job failed with an unknown error",
            JobStatus::Canceled => "The job was canceled",
            JobStatus::Paused => "The job is paused",
            JobStatus::Previewing => "The job is generating a preview before auto-pausing",
        }
    }

    /// Terminal jobs accept no further transitions besides re-entrant `fail`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Successful | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Work for jobs in these statuses may be handed out to workers.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Accepted | JobStatus::Running | JobStatus::Previewing
        )
    }
}

fn is_default_message(message: &str) -> bool {
    JobStatus::ALL
        .iter()
        .any(|status| status.default_message() == message)
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

fn default_rel() -> String {
    REL_DATA.to_string()
}

/// A result descriptor attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLink {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default = "default_rel")]
    pub rel: String,
}

impl JobLink {
    /// A `data` link pointing at a result location.
    pub fn data(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: None,
            mime_type: None,
            rel: default_rel(),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One user-submitted processing request, tracked end-to-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub request_id: uuid::Uuid,
    pub username: String,
    pub status: JobStatus,
    pub message: String,
    pub progress: i32,
    pub batches_completed: i32,
    pub num_input_granules: i32,
    pub request: String,
    pub is_async: bool,
    pub preview: bool,
    pub links: Vec<JobLink>,
    pub collection_ids: Vec<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    /// Status as last loaded from or written to the store.
    #[serde(skip)]
    original_status: Option<JobStatus>,
}

impl Job {
    /// A fresh, unsaved job in the `accepted` state.
    pub fn new(
        username: impl Into<String>,
        request: impl Into<String>,
        num_input_granules: i32,
    ) -> Self {
        let job_id = uuid::Uuid::new_v4();
        Self {
            job_id,
            request_id: job_id,
            username: username.into(),
            status: JobStatus::Accepted,
            message: JobStatus::Accepted.default_message().to_string(),
            progress: 0,
            batches_completed: 0,
            num_input_granules,
            request: request.into(),
            is_async: true,
            preview: false,
            links: Vec::new(),
            collection_ids: Vec::new(),
            created_at: None,
            updated_at: None,
            original_status: None,
        }
    }

    /// Record the current status as the persisted one.
    ///
    /// Stores call this after loading or saving a job so that
    /// [`Job::validate_status`] can reject writes to terminal rows.
    pub fn mark_persisted(&mut self) {
        self.original_status = Some(self.status);
    }

    /// The status the job had when it was last loaded or saved.
    pub fn original_status(&self) -> Option<JobStatus> {
        self.original_status
    }

    // -- Transitions --------------------------------------------------------

    fn transition(&mut self, event: JobEvent, message: Option<&str>) -> Result<(), CoreError> {
        let to = next_status(self.status, event).ok_or_else(|| {
            CoreError::Conflict(format!(
                "Job status cannot be updated from {} to {}.",
                self.status,
                event.target()
            ))
        })?;
        self.update_status(to, message);
        Ok(())
    }

    /// `accepted -> running`.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobEvent::Start, None)
    }

    /// `accepted -> previewing`.
    pub fn start_with_preview(&mut self) -> Result<(), CoreError> {
        self.transition(JobEvent::StartWithPreview, None)
    }

    /// `previewing -> running`.
    pub fn skip_preview(&mut self) -> Result<(), CoreError> {
        self.transition(JobEvent::SkipPreview, None)
    }

    /// Without a message the job reads the paused default.
    pub fn pause(&mut self, message: Option<&str>) -> Result<(), CoreError> {
        let message = message.unwrap_or(JobStatus::Paused.default_message());
        self.transition(JobEvent::Pause, Some(message))
    }

    pub fn resume(&mut self) -> Result<(), CoreError> {
        if next_status(self.status, JobEvent::Resume).is_none() {
            return Err(CoreError::Conflict(format!(
                "Job status is {} - only paused jobs can be resumed.",
                self.status
            )));
        }
        self.transition(JobEvent::Resume, None)
    }

    /// Fail the job. Failing an already failed job is allowed and keeps it
    /// failed; without a message it also keeps the current failure message.
    pub fn fail(&mut self, message: Option<&str>) -> Result<(), CoreError> {
        let message = match message {
            Some(message) => Some(message),
            None if self.status == JobStatus::Failed => None,
            None => Some(JobStatus::Failed.default_message()),
        };
        self.transition(JobEvent::Fail, message)
    }

    /// Without a message the job reads the canceled default.
    pub fn cancel(&mut self, message: Option<&str>) -> Result<(), CoreError> {
        let message = message.unwrap_or(JobStatus::Canceled.default_message());
        self.transition(JobEvent::Cancel, Some(message))
    }

    /// Complete the job. Progress becomes exactly 100.
    ///
    /// Only pass a message when there is something to tell the user; it
    /// replaces any earlier message, warnings included.
    pub fn succeed(&mut self, message: Option<&str>) -> Result<(), CoreError> {
        self.transition(JobEvent::Complete, message)
    }

    /// Set status and message without consulting the state machine.
    ///
    /// A provided message replaces the current one. An empty or generic
    /// default message is swapped for the default of the new status, so a
    /// specific message survives status changes that carry none.
    pub fn update_status(&mut self, status: JobStatus, message: Option<&str>) {
        self.status = status;
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            self.message = message.to_string();
        }
        if self.message.is_empty() || is_default_message(&self.message) {
            self.message = status.default_message().to_string();
        }
        if status == JobStatus::Successful {
            self.progress = 100;
        }
    }

    // -- Progress -----------------------------------------------------------

    /// Count one finished batch out of `total_item_count`.
    ///
    /// Progress stays within `[0, 99]` until the job succeeds and never moves
    /// backwards. A zero total only bumps the batch counter.
    pub fn complete_batch(&mut self, total_item_count: i32) {
        self.batches_completed += 1;
        if total_item_count <= 0 {
            return;
        }
        let computed = (100 * i64::from(self.batches_completed)) / i64::from(total_item_count);
        let computed = computed.clamp(0, 99) as i32;
        self.progress = self.progress.max(computed);
    }

    // -- Queries ------------------------------------------------------------

    /// Paused or previewing.
    pub fn is_paused(&self) -> bool {
        matches!(self.status, JobStatus::Paused | JobStatus::Previewing)
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Links with the given relation, in insertion order.
    pub fn related_links<'a>(&'a self, rel: &'a str) -> impl Iterator<Item = &'a JobLink> + 'a {
        self.links.iter().filter(move |link| link.rel == rel)
    }

    // -- Links --------------------------------------------------------------

    pub fn add_link(&mut self, link: JobLink) {
        self.links.push(link);
    }

    /// Attach the staging location as an `s3-access` link. Empty locations are ignored.
    pub fn add_staging_bucket_link(&mut self, staging_location: &str) {
        if staging_location.is_empty() {
            return;
        }
        self.add_link(JobLink {
            href: staging_location.to_string(),
            title: Some(STAGING_BUCKET_TITLE.to_string()),
            mime_type: None,
            rel: REL_S3_ACCESS.to_string(),
        });
    }

    // -- Validation ---------------------------------------------------------

    /// Field-level problems, empty when the job is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0..=100).contains(&self.progress) {
            errors.push("Job progress must be between 0 and 100".to_string());
        }
        if self.batches_completed < 0 {
            errors.push("Job batchesCompleted must be greater than or equal to 0".to_string());
        }
        if !REQUEST_URL.is_match(&self.request) {
            errors.push(format!(
                "Invalid request {}. Job request must be a URL.",
                self.request
            ));
        }
        errors
    }

    /// Reject saving a job that was already terminal in the store.
    pub fn validate_status(&self) -> Result<(), CoreError> {
        match self.original_status {
            Some(original) if original.is_terminal() => Err(CoreError::Conflict(format!(
                "Job status cannot be updated from {original} to {}.",
                self.status
            ))),
            _ => Ok(()),
        }
    }

    /// Checks run by every store before persisting a job.
    ///
    /// Truncates `message` and `request` to [`MAX_TEXT_LENGTH`] characters.
    pub fn prepare_for_save(&mut self) -> Result<(), CoreError> {
        self.validate_status()?;
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(CoreError::Validation(errors.join("; ")));
        }
        truncate_chars(&mut self.message, MAX_TEXT_LENGTH);
        truncate_chars(&mut self.request, MAX_TEXT_LENGTH);
        Ok(())
    }
}

fn truncate_chars(value: &mut String, max: usize) {
    if let Some((idx, _)) = value.char_indices().nth(max) {
        value.truncate(idx);
    }
}

// ---------------------------------------------------------------------------
// Job control
// ---------------------------------------------------------------------------

/// Operator-initiated job control actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Pause,
    Resume,
    Cancel,
    SkipPreview,
    Fail(String),
}

impl JobAction {
    /// Apply the action to `job`.
    ///
    /// Returns `true` when the job's remaining work items must be canceled.
    pub fn apply(&self, job: &mut Job) -> Result<bool, CoreError> {
        match self {
            JobAction::Pause => job.pause(None).map(|_| false),
            JobAction::Resume => job.resume().map(|_| false),
            JobAction::SkipPreview => job.skip_preview().map(|_| false),
            JobAction::Cancel => job.cancel(None).map(|_| true),
            JobAction::Fail(message) => job.fail(Some(message.as_str())).map(|_| true),
        }
    }
}
