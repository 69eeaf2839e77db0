//! Connection pool setup.

use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Connect to PostgreSQL using `database_url` (typically from
/// DATABASE_URL) with a small, service-sized pool.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    info!("Connected to PostgreSQL");
    Ok(pool)
}
