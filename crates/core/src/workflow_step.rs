//! Workflow steps: one stage of a job's fixed service pipeline.

use serde::{Deserialize, Serialize};

use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub step_index: i32,
    #[serde(rename = "serviceID")]
    pub service_id: String,
    /// Number of items the step is expected to produce in total.
    pub work_item_count: i32,
    /// The step consumes every predecessor output as one merged item.
    pub has_aggregated_output: bool,
    /// The step enumerates its inputs page by page using a scroll cursor.
    pub is_paged: bool,
    /// Template copied into every item the step materializes.
    pub operation: serde_json::Value,
}

/// Step definition supplied at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    #[serde(rename = "serviceID")]
    pub service_id: String,
    #[serde(default)]
    pub operation: serde_json::Value,
    #[serde(default)]
    pub has_aggregated_output: bool,
    #[serde(default)]
    pub is_paged: bool,
    /// Expected item count. Defaults to 1 for aggregating steps and to the
    /// job's input count otherwise.
    #[serde(default)]
    pub work_item_count: Option<i32>,
}
