//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Methods take any Postgres executor so they run equally against the pool
//! or inside a transaction (`&mut *tx`).

pub mod job_link_repo;
pub mod job_repo;
pub mod work_item_repo;
pub mod workflow_step_repo;

pub use job_link_repo::JobLinkRepo;
pub use job_repo::JobRepo;
pub use work_item_repo::WorkItemRepo;
pub use workflow_step_repo::WorkflowStepRepo;
