//! Persistence for jobs, workflow steps and work items.
//!
//! [`WorkStore`] is the seam the scheduler service talks to. [`PgWorkStore`]
//! backs it with PostgreSQL; [`MemoryWorkStore`] keeps everything in process
//! for tests and single-node development.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod pg_store;
pub mod repositories;
pub mod store;

pub use memory::MemoryWorkStore;
pub use pg_store::PgWorkStore;
pub use store::{StoreError, WorkStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply any pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
