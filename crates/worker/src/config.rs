use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkerError;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scheduler host (default: `localhost`).
    pub backend_host: String,
    /// Scheduler port (default: `3000`).
    pub backend_port: u16,
    /// Service whose work items this worker claims.
    pub service_id: String,
    /// Reported to the scheduler with every claim.
    pub pod_name: String,
    /// Scratch directory holding the `WORKING`/`TERMINATING` sentinels.
    pub working_dir: PathBuf,
    /// Pause between iterations (default: `500`).
    pub poll_interval_ms: u64,
    /// Retries for reporting an outcome (default: `3`).
    pub max_put_work_retries: u32,
    /// Priming attempts before giving up (default: `1200`).
    pub prime_max_retries: u32,
    /// Paged enumeration services do not need priming.
    pub skip_priming: bool,
    /// Service command line, split on whitespace.
    pub invocation_args: Vec<String>,
    /// Upper bound for one service invocation (default: `3600`).
    pub runner_timeout_secs: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default              |
    /// |------------------------|----------------------|
    /// | `BACKEND_HOST`         | `localhost`          |
    /// | `BACKEND_PORT`         | `3000`               |
    /// | `SERVICE_ID`           | (required)           |
    /// | `POD_NAME`             | `$HOSTNAME`, `unknown-pod` |
    /// | `WORKING_DIR`          | `/tmp`               |
    /// | `POLL_INTERVAL_MS`     | `500`                |
    /// | `MAX_PUT_WORK_RETRIES` | `3`                  |
    /// | `PRIME_MAX_RETRIES`    | `1200`               |
    /// | `SKIP_PRIMING`         | `false`              |
    /// | `INVOCATION_ARGS`      | (required)           |
    /// | `RUNNER_TIMEOUT_SECS`  | `3600`               |
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let service_id = var("SERVICE_ID")
            .ok_or_else(|| WorkerError::Config("SERVICE_ID must be set".into()))?;

        let invocation_args: Vec<String> = var("INVOCATION_ARGS")
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        if invocation_args.is_empty() {
            return Err(WorkerError::Config("INVOCATION_ARGS must be set".into()));
        }

        let pod_name = var("POD_NAME")
            .or_else(|| var("HOSTNAME"))
            .unwrap_or_else(|| "unknown-pod".into());

        Ok(Self {
            backend_host: var("BACKEND_HOST").unwrap_or_else(|| "localhost".into()),
            backend_port: parse(&var, "BACKEND_PORT", 3000)?,
            service_id,
            pod_name,
            working_dir: var("WORKING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp")),
            poll_interval_ms: parse(&var, "POLL_INTERVAL_MS", 500)?,
            max_put_work_retries: parse(&var, "MAX_PUT_WORK_RETRIES", 3)?,
            prime_max_retries: parse(&var, "PRIME_MAX_RETRIES", 1200)?,
            skip_priming: parse(&var, "SKIP_PRIMING", false)?,
            invocation_args,
            runner_timeout_secs: parse(&var, "RUNNER_TIMEOUT_SECS", 3600)?,
        })
    }

    /// Base URL of the scheduler, e.g. `http://localhost:3000`.
    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.backend_host, self.backend_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn runner_timeout(&self) -> Duration {
        Duration::from_secs(self.runner_timeout_secs)
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, WorkerError> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WorkerError::Config(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
