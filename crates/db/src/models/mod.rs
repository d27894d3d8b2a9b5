//! Row structs and query DTOs.
//!
//! Each row struct derives `FromRow` and converts into the matching
//! `stepflow_core` entity. Conversions fail only on unknown status ids.

pub mod job;
pub mod work_item;
pub mod workflow_step;
