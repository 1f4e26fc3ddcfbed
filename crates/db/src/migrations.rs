use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Apply pending migrations and report how many were newly applied.
pub async fn run_pending(pool: &DbPool) -> Result<u32, MigrateError> {
    let before = applied_count(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_count(pool).await;
    Ok(after.saturating_sub(before))
}

/// Rows in sqlx's bookkeeping table. Before the first migration the table
/// does not exist yet; that reads as zero applied.
async fn applied_count(pool: &DbPool) -> u32 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .map(|count| count.max(0) as u32)
        .unwrap_or(0)
}
