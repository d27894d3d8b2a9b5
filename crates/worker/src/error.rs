use crate::runner::RunnerError;

/// Errors raised by the pull worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Missing or malformed environment configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP request itself failed (connect, DNS, body decode).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The scheduler answered with a status the caller did not expect.
    #[error("Scheduler returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// The service never became ready.
    #[error("Failed to prime service after {attempts} attempts: {source}")]
    Priming {
        attempts: u32,
        #[source]
        source: RunnerError,
    },
}

impl WorkerError {
    /// HTTP status carried by the error, if the scheduler answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            WorkerError::UnexpectedStatus { status, .. } => Some(*status),
            WorkerError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
