pub mod jobs;
pub mod work;
