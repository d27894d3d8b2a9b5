/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for background tasks to stop after the server drains.
    pub shutdown_timeout_secs: u64,
    /// Page size handed to paged enumeration items (default: `2000`).
    pub max_page_size: i32,
    /// How often the stale-job reaper runs (default: `60`).
    pub job_reaper_interval_secs: u64,
    /// Running jobs idle for this long are failed (default: `60`).
    pub job_reaper_stale_minutes: i64,
    /// PostgreSQL connection string. Unset selects the in-memory store.
    pub database_url: Option<String>,
    /// Users who may view every job.
    pub admin_usernames: Vec<String>,
    /// EULA-free, guest-readable collections whose job results may be shared.
    pub open_collection_ids: Vec<String>,
}

fn csv_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default     |
    /// |----------------------------|-------------|
    /// | `HOST`                     | `0.0.0.0`   |
    /// | `PORT`                     | `3000`      |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`        |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`        |
    /// | `MAX_PAGE_SIZE`            | `2000`      |
    /// | `JOB_REAPER_INTERVAL_SECS` | `60`        |
    /// | `JOB_REAPER_STALE_MINUTES` | `60`        |
    /// | `DATABASE_URL`             | (in-memory) |
    /// | `ADMIN_USERNAMES`          | (none)      |
    /// | `OPEN_COLLECTION_IDS`      | (none)      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_page_size: i32 = std::env::var("MAX_PAGE_SIZE")
            .unwrap_or_else(|_| "2000".into())
            .parse()
            .expect("MAX_PAGE_SIZE must be a valid i32");

        let job_reaper_interval_secs: u64 = std::env::var("JOB_REAPER_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("JOB_REAPER_INTERVAL_SECS must be a valid u64");

        let job_reaper_stale_minutes: i64 = std::env::var("JOB_REAPER_STALE_MINUTES")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("JOB_REAPER_STALE_MINUTES must be a valid i64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            host,
            port,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_page_size,
            job_reaper_interval_secs,
            job_reaper_stale_minutes,
            database_url,
            admin_usernames: csv_list("ADMIN_USERNAMES"),
            open_collection_ids: csv_list("OPEN_COLLECTION_IDS"),
        }
    }
}
