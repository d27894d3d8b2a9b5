//! Service execution.
//!
//! [`ServiceRunner`] is the seam between the pull loop and the service that
//! actually processes a work item. [`CommandRunner`] runs the service as a
//! child process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use stepflow_core::work_item::WorkItem;
use tokio::process::Command;

/// What a service produced for one work item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOutput {
    pub results: Vec<String>,
    pub total_items_size: Option<f64>,
    pub output_item_sizes: Vec<f64>,
    /// Next cursor of a paged enumeration. Absent when exhausted.
    #[serde(rename = "scrollID")]
    pub scroll_id: Option<String>,
    pub hits: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to start service: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Service timed out after {0}s")]
    Timeout(u64),

    #[error("Service exited with status {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("Invalid service output: {0}")]
    Output(String),

    #[error("Service I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by runners that do not support the requested operation.
    #[error("{0}")]
    Service(String),
}

/// Executes work items for one service.
#[async_trait]
pub trait ServiceRunner: Send + Sync {
    /// Process a regular work item.
    async fn run(&self, item: &WorkItem) -> Result<RunOutput, RunnerError>;

    /// Fetch one page of a paged enumeration, starting at the item's cursor.
    async fn run_query(&self, item: &WorkItem, page_size: i32) -> Result<RunOutput, RunnerError>;

    /// Warm the service up before the first poll.
    async fn prime(&self) -> Result<(), RunnerError>;
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

const INPUT_FILE: &str = "input.json";
const OUTPUT_FILE: &str = "outputs.json";

/// Runs the service command line once per work item.
///
/// Each item gets `<workdir>/<item id>/` with an `input.json` holding the
/// item's operation and inputs. The command runs inside that directory
/// with `--input <file>` appended (plus `--scroll-id`/`--page-size` for
/// paged items) and must leave an `outputs.json` there.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl CommandRunner {
    /// Returns `None` when `invocation` is empty.
    pub fn new(invocation: &[String], working_dir: impl Into<PathBuf>, timeout: Duration) -> Option<Self> {
        let (program, args) = invocation.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: working_dir.into(),
            timeout,
        })
    }

    async fn execute(
        &self,
        dir: &Path,
        input: &serde_json::Value,
        extra_args: &[String],
    ) -> Result<std::process::Output, RunnerError> {
        tokio::fs::create_dir_all(dir).await?;
        let input_path = dir.join(INPUT_FILE);
        let body = serde_json::to_vec_pretty(input).map_err(|e| RunnerError::Output(e.to_string()))?;
        tokio::fs::write(&input_path, body).await?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--input")
            .arg(&input_path)
            .args(extra_args)
            .current_dir(dir)
            .kill_on_drop(true);

        let start = std::time::Instant::now();
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RunnerError::Spawn(e)),
            Err(_) => {
                tracing::error!(program = %self.program, "Service timed out");
                return Err(RunnerError::Timeout(self.timeout.as_secs()));
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(program = %self.program, elapsed_ms, stderr = %stderr, "Service failed");
            return Err(RunnerError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        tracing::debug!(program = %self.program, elapsed_ms, "Service finished");
        Ok(output)
    }

    async fn run_item(&self, item: &WorkItem, extra_args: &[String]) -> Result<RunOutput, RunnerError> {
        let dir = self.working_dir.join(item.id.to_string());
        let input = serde_json::json!({
            "workItemID": item.id,
            "operation": item.operation,
            "inputs": item.inputs,
        });
        self.execute(&dir, &input, extra_args).await?;

        let raw = match tokio::fs::read(dir.join(OUTPUT_FILE)).await {
            Ok(raw) => raw,
            Err(e) => return Err(RunnerError::Output(format!("{OUTPUT_FILE} not readable: {e}"))),
        };
        serde_json::from_slice(&raw).map_err(|e| RunnerError::Output(e.to_string()))
    }
}

#[async_trait]
impl ServiceRunner for CommandRunner {
    async fn run(&self, item: &WorkItem) -> Result<RunOutput, RunnerError> {
        self.run_item(item, &[]).await
    }

    async fn run_query(&self, item: &WorkItem, page_size: i32) -> Result<RunOutput, RunnerError> {
        let mut extra = vec!["--page-size".to_string(), page_size.to_string()];
        if let Some(cursor) = item.scroll_id.as_deref().filter(|c| !c.is_empty()) {
            extra.push("--scroll-id".to_string());
            extra.push(cursor.to_string());
        }
        self.run_item(item, &extra).await
    }

    /// Runs the command once against a sample operation; only the exit
    /// status matters.
    async fn prime(&self) -> Result<(), RunnerError> {
        let dir = self.working_dir.join("prime");
        let input = serde_json::json!({ "operation": { "requestId": "prime" }, "inputs": [] });
        self.execute(&dir, &input, &[]).await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;
    use stepflow_core::status::WorkItemStatus;

    use super::*;

    fn item(id: i64, scroll_id: Option<&str>) -> WorkItem {
        WorkItem {
            id,
            job_id: uuid::Uuid::new_v4(),
            step_index: 0,
            service_id: "svc-a".to_string(),
            status: WorkItemStatus::Running,
            operation: serde_json::json!({ "format": "image/png" }),
            inputs: vec!["s3://in/g1".to_string()],
            results: Vec::new(),
            error_message: None,
            duration: None,
            scroll_id: scroll_id.map(str::to_string),
            hits: None,
            total_items_size: None,
            output_item_sizes: Vec::new(),
            pod_name: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn shell(script: &str, dir: &Path) -> CommandRunner {
        let invocation = vec!["sh".to_string(), "-c".to_string(), script.to_string(), "svc".to_string()];
        CommandRunner::new(&invocation, dir, Duration::from_secs(10)).unwrap()
    }

    #[tokio::test]
    async fn reads_outputs_written_by_service() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell(
            r#"test -f input.json && echo '{"results":["s3://out/1"],"totalItemsSize":1.5,"outputItemSizes":[1.5]}' > outputs.json"#,
            dir.path(),
        );

        let output = runner.run(&item(7, None)).await.unwrap();
        assert_eq!(output.results, vec!["s3://out/1"]);
        assert_eq!(output.total_items_size, Some(1.5));
        assert_eq!(output.output_item_sizes, vec![1.5]);

        let input: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("7/input.json")).unwrap()).unwrap();
        assert_eq!(input["operation"]["format"], "image/png");
        assert_eq!(input["inputs"][0], "s3://in/g1");
    }

    #[tokio::test]
    async fn query_passes_page_size_and_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell(
            r#"echo "{\"results\":[\"$*\"],\"scrollID\":\"next\",\"hits\":3}" > outputs.json"#,
            dir.path(),
        );

        let output = runner.run_query(&item(8, Some("abc")), 50).await.unwrap();
        let args = &output.results[0];
        assert!(args.contains("--page-size 50"), "{args}");
        assert!(args.contains("--scroll-id abc"), "{args}");
        assert_eq!(output.scroll_id.as_deref(), Some("next"));
        assert_eq!(output.hits, Some(3));
    }

    #[tokio::test]
    async fn first_page_omits_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell(r#"echo "{\"results\":[\"$*\"]}" > outputs.json"#, dir.path());

        let output = runner.run_query(&item(9, Some("")), 10).await.unwrap();
        assert!(!output.results[0].contains("--scroll-id"));
        assert_eq!(output.scroll_id, None);
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell("echo 'bad granule' >&2; exit 3", dir.path());

        let err = runner.run(&item(1, None)).await.unwrap_err();
        assert_matches!(err, RunnerError::Exit { code: 3, ref stderr } if stderr == "bad granule");
    }

    #[tokio::test]
    async fn missing_outputs_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell("true", dir.path());
        assert_matches!(runner.run(&item(2, None)).await, Err(RunnerError::Output(_)));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = vec!["sh".to_string(), "-c".to_string(), "sleep 5".to_string()];
        let runner = CommandRunner::new(&invocation, dir.path(), Duration::from_millis(100)).unwrap();
        assert_matches!(runner.run(&item(3, None)).await, Err(RunnerError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = vec!["/nonexistent/stepflow-service".to_string()];
        let runner = CommandRunner::new(&invocation, dir.path(), Duration::from_secs(1)).unwrap();
        assert_matches!(runner.prime().await, Err(RunnerError::Spawn(_)));
    }

    #[test]
    fn empty_invocation_is_rejected() {
        assert!(CommandRunner::new(&[], "/tmp", Duration::from_secs(1)).is_none());
    }
}
