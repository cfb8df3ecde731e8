use crate::error::DbError;
use crate::pool::Database;

const MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    id TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

impl Database {
    /// Run the statement `up` once under `id`, recording it in `_migrations`.
    ///
    /// Returns `false` when `id` was applied before.
    pub async fn apply_migration(&self, id: &str, up: &str) -> Result<bool, DbError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(MIGRATIONS_TABLE).execute(&mut *tx).await?;

        let applied: Option<String> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if applied.is_some() {
            tracing::debug!(target: "livros-db", migration = id, "already applied");
            return Ok(false);
        }

        sqlx::query(up)
            .execute(&mut *tx)
            .await
            .map_err(|source| DbError::Migration {
                id: id.to_string(),
                source,
            })?;
        sqlx::query("INSERT INTO _migrations (id) VALUES (?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(target: "livros-db", migration = id, "migration applied");
        Ok(true)
    }
}
