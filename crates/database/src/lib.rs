mod postgres;

pub use postgres::PostgresClient;

use anyhow::anyhow;
use sqlx::PgPool;

/// Executes the given DDL statements in order. Statements are expected to be
/// idempotent (`CREATE TABLE IF NOT EXISTS` and friends) so the service can run
/// this on every startup.
pub async fn init_tables(pool: &PgPool, statements: &[&str]) -> anyhow::Result<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| anyhow!("schema statement failed: {e}. SQL: {statement}"))?;
    }
    tracing::info!("[init_tables] executed {} schema statements", statements.len());
    Ok(())
}
