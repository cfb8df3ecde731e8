use livros_db::{DbError, RecordId};
use thiserror::Error;

/// Failures of the book store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Livro não encontrado.")]
    BookNotFound(RecordId),

    #[error("genre {0} does not exist")]
    UnknownGenre(RecordId),

    #[error("book {id} has an unreadable price '{value}'")]
    InvalidStoredPrice { id: RecordId, value: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Db(err.into())
    }
}

/// Failures of a listing call. Never accompanied by partial results.
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("malformed listing request: {0}")]
    MalformedRequest(String),

    #[error("cannot sort by '{0}'; expected one of Id, Titulo, Autor, AnoEdicao, Valor, Genero.Nome")]
    InvalidSortField(String),

    #[error("invalid page parameters: current={current}, rowCount={row_count}; both must be at least 1")]
    InvalidPageParameters { current: i64, row_count: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
