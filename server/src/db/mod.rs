//! Postgres pool and schema migrations.
//!
//! Only used when `DATABASE_URL` is set; otherwise the server runs on the
//! in-memory store and never opens a connection. Migrations run once at
//! startup, before the listener binds.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect and bring the schema up to date.
///
/// # Errors
///
/// Returns the connect error, or the migration error wrapped as
/// `sqlx::Error::Migrate`.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    info!(max_connections, "db: pool ready");

    let migrator = sqlx::migrate!("src/db/migrations");
    migrator.run(&pool).await?;
    info!(migrations = migrator.iter().count(), "db: schema up to date");

    Ok(pool)
}
