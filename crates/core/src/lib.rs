//! Domain model for the stepflow work-distribution system.
//!
//! This crate has no internal dependencies so that the scheduler service,
//! the persistence layer and the pull worker can all share the same job
//! state machine, entities and wire types.

pub mod error;
pub mod job;
pub mod pipeline;
pub mod sharing;
pub mod status;
pub mod types;
pub mod work_item;
pub mod workflow_step;
