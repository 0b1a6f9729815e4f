//! Database helpers for the settlement service.
//!
//! The service owns a single Postgres pool holding the `bookings` table.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the application database pool.
pub type AppDb = PgPool;

/// Connect the application pool and apply pending migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<AppDb> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to the application database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to apply migrations")?;
    Ok(pool)
}
