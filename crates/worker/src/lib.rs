pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod runner;
pub mod workdir;
pub mod worker;
