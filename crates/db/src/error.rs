use thiserror::Error;

/// Failures raised by the store.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("timed out waiting for a database connection")]
    PoolTimeout,

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("migration '{id}' failed")]
    Migration {
        id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolTimeout,
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DbError::ForeignKey(db.message().to_string())
            }
            other => DbError::Query(other),
        }
    }
}
