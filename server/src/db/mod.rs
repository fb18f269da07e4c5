//! Database bootstrap: connection pool and migrations.

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

/// Create the `PostgreSQL` connection pool the catalog store runs on.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(20).connect(database_url).await?;
    info!(status = "postgres_connected", "connected to PostgreSQL");
    Ok(pool)
}

/// Run pending migrations, creating the `tarxiv_xmatch`/`tarxiv_tns` schemas
/// and their tables on first boot.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!(status = "migrations_completed", "database migrations completed");
    Ok(())
}
