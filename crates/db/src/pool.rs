use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Sqlite};

use crate::error::DbError;

/// A pooled connection. Dropping it returns the slot to the pool.
pub type Connection = PoolConnection<Sqlite>;

/// Connection pool sizing.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared handle to the store. Cloning is cheap and shares the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    max_connections: u32,
}

impl Database {
    /// Open `url` with a pool of at least one connection and foreign keys enforced.
    pub async fn connect(url: &str, options: PoolOptions) -> Result<Self, DbError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let max_connections = options.max_connections.max(1);

        let mut connect_options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .disable_statement_logging();
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(options.acquire_timeout);
        if in_memory {
            // An in-memory database is dropped with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(connect_options).await?;

        tracing::debug!(
            target: "livros-db",
            in_memory,
            max_connections,
            acquire_timeout_ms = options.acquire_timeout.as_millis() as u64,
            "database opened"
        );

        Ok(Self {
            pool,
            max_connections,
        })
    }

    /// Private in-memory database, used by tests and the default configuration.
    pub async fn in_memory(options: PoolOptions) -> Result<Self, DbError> {
        Self::connect("sqlite::memory:", options).await
    }

    /// Wait for a free connection, up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<Connection, DbError> {
        let conn = self.pool.acquire().await?;
        tracing::trace!(
            target: "livros-db",
            available = self.available_connections(),
            "connection acquired"
        );
        Ok(conn)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    /// Connections that can be handed out without waiting.
    ///
    /// Returned connections go back to the pool asynchronously, so this may
    /// briefly lag behind a drop.
    pub fn available_connections(&self) -> usize {
        let in_use = (self.pool.size() as usize).saturating_sub(self.pool.num_idle());
        (self.max_connections as usize).saturating_sub(in_use)
    }

    /// Reject further acquisitions and wait for checked out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_connections: u32, timeout_ms: u64) -> PoolOptions {
        PoolOptions {
            max_connections,
            acquire_timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn wait_until_available(db: &Database, expected: usize) -> usize {
        for _ in 0..100 {
            if db.available_connections() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        db.available_connections()
    }

    #[tokio::test]
    async fn dropping_a_connection_releases_its_slot() {
        let db = Database::in_memory(options(2, 200)).await.unwrap();

        let conn = db.acquire().await.unwrap();
        assert_eq!(db.available_connections(), 1);

        drop(conn);
        assert_eq!(wait_until_available(&db, 2).await, 2);
    }

    #[tokio::test]
    async fn acquire_times_out_when_pool_is_exhausted() {
        let db = Database::in_memory(options(1, 20)).await.unwrap();
        let _held = db.acquire().await.unwrap();

        let err = db.acquire().await.err().unwrap();
        assert!(matches!(err, DbError::PoolTimeout));
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquire() {
        let db = Database::in_memory(options(1, 20)).await.unwrap();
        db.close().await;

        assert!(db.is_closed());
        let err = db.acquire().await.err().unwrap();
        assert!(matches!(err, DbError::PoolClosed));
    }

    #[tokio::test]
    async fn connections_share_one_in_memory_database() {
        let db = Database::in_memory(options(2, 200)).await.unwrap();

        let mut writer = db.acquire().await.unwrap();
        sqlx::query("CREATE TABLE nota (valor INTEGER NOT NULL)")
            .execute(&mut *writer)
            .await
            .unwrap();
        sqlx::query("INSERT INTO nota (valor) VALUES (7)")
            .execute(&mut *writer)
            .await
            .unwrap();

        let mut reader = db.acquire().await.unwrap();
        let value: i64 = sqlx::query_scalar("SELECT valor FROM nota")
            .fetch_one(&mut *reader)
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn separate_databases_do_not_share_tables() {
        let first = Database::in_memory(options(1, 200)).await.unwrap();
        let second = Database::in_memory(options(1, 200)).await.unwrap();

        sqlx::query("CREATE TABLE nota (valor INTEGER)")
            .execute(first.pool())
            .await
            .unwrap();

        let err = sqlx::query("SELECT valor FROM nota")
            .fetch_all(second.pool())
            .await
            .map(drop)
            .unwrap_err();
        assert!(matches!(DbError::from(err), DbError::Query(_)));
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = Database::in_memory(options(1, 200)).await.unwrap();
        for ddl in [
            "CREATE TABLE pai (id INTEGER PRIMARY KEY)",
            "CREATE TABLE filho (id INTEGER PRIMARY KEY, pai_id INTEGER REFERENCES pai (id))",
        ] {
            sqlx::query(ddl).execute(db.pool()).await.unwrap();
        }

        let err = sqlx::query("INSERT INTO filho (pai_id) VALUES (42)")
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(matches!(DbError::from(err), DbError::ForeignKey(_)));
    }

    #[tokio::test]
    async fn zero_sized_pool_still_allows_one_connection() {
        let db = Database::in_memory(options(0, 200)).await.unwrap();
        assert_eq!(db.max_connections(), 1);
        assert!(db.acquire().await.is_ok());
    }
}
