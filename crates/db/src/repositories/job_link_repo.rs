//! Repository for the `job_links` table.

use sqlx::{PgConnection, Postgres};
use stepflow_core::job::JobLink;
use stepflow_core::types::JobId;

use crate::models::job::JobLinkRow;

const COLUMNS: &str = "id, job_id, href, title, mime_type, rel, created_at";

pub struct JobLinkRepo;

impl JobLinkRepo {
    /// Append links to a job, preserving their order.
    pub async fn insert_many(
        conn: &mut PgConnection,
        job_id: JobId,
        links: &[JobLink],
    ) -> Result<(), sqlx::Error> {
        for link in links {
            sqlx::query(
                "INSERT INTO job_links (job_id, href, title, mime_type, rel) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(job_id)
            .bind(&link.href)
            .bind(&link.title)
            .bind(&link.mime_type)
            .bind(&link.rel)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// All links of a job in insertion order.
    pub async fn list_for_job<'c, E>(exe: E, job_id: JobId) -> Result<Vec<JobLink>, sqlx::Error>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM job_links WHERE job_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, JobLinkRow>(&query)
            .bind(job_id)
            .fetch_all(exe)
            .await?;
        Ok(rows.into_iter().map(JobLink::from).collect())
    }
}
