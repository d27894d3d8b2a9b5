//! Work items and the work-protocol payloads exchanged with workers.

use serde::{Deserialize, Serialize};

use crate::status::WorkItemStatus;
use crate::types::{DbId, JobId, Timestamp};

/// One claimable, independently executable unit of work within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: DbId,
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub step_index: i32,
    #[serde(rename = "serviceID")]
    pub service_id: String,
    pub status: WorkItemStatus,
    /// Opaque operation document handed to the service.
    pub operation: serde_json::Value,
    /// Input locations: one for fan-out items, all predecessor results for
    /// an aggregate item. Empty for paged enumeration items.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Execution time reported by the worker, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Paging cursor. `Some("")` marks the first page of a paged step.
    #[serde(rename = "scrollID", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items_size: Option<f64>,
    #[serde(default)]
    pub output_item_sizes: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl WorkItem {
    /// True for items of a paged enumeration step.
    pub fn is_paged(&self) -> bool {
        self.scroll_id.is_some()
    }
}

/// A work item about to be inserted. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkItem {
    pub job_id: JobId,
    pub step_index: i32,
    pub service_id: String,
    pub operation: serde_json::Value,
    pub inputs: Vec<String>,
    pub scroll_id: Option<String>,
}

/// Body of `PUT /service/work/{id}`.
///
/// Workers echo the whole item back; only the fields below are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkItemUpdate {
    pub status: Option<WorkItemStatus>,
    pub results: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(rename = "scrollID", skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hits: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items_size: Option<f64>,
    pub output_item_sizes: Vec<f64>,
}

impl WorkItemUpdate {
    pub fn succeeded(results: Vec<String>) -> Self {
        Self {
            status: Some(WorkItemStatus::Successful),
            results,
            ..Self::default()
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: Some(WorkItemStatus::Failed),
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }
}

/// Body of a successful `GET /service/work`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkResponse {
    pub work_item: WorkItem,
    /// Page size for paged enumeration items.
    pub max_cmr_granules: i32,
}
