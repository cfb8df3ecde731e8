//! HTTP handlers of the books module.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use livros_db::{Connection, DbError, RecordId};
use livros_http::AppError;
use serde_json::json;
use validator::ValidationErrors;

use super::error::{ListingError, StoreError};
use super::models::{Book, BookForm, Genre, OperationOutcome};
use super::query::{self, ResultEnvelope};
use super::store::{BookStore, CatalogDb};

/// Shared state of the books routes
#[derive(Clone)]
pub struct BooksState {
    pub db: CatalogDb,
}

impl BooksState {
    /// Connection scoped to the calling request; dropped when the handler returns.
    async fn connection(&self) -> Result<Connection, AppError> {
        self.db.acquire().await.map_err(|e| StoreError::Db(e).into())
    }
}

/// Build the books router. Mounted under `/api/books`.
pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", post(create_book))
        .route("/health", get(health_check))
        .route("/list", get(list_books).post(list_books))
        .route("/genres", get(list_genres))
        .route(
            "/{id}",
            get(book_details).put(edit_book).delete(delete_book),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "books module is healthy"
}

/// Grid listing. Reads the query string on GET and the urlencoded body on POST.
async fn list_books(
    State(state): State<BooksState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Json<ResultEnvelope>, AppError> {
    let envelope = query::list_books(&fields, &state.db).await?;
    Ok(Json(envelope))
}

async fn list_genres(State(state): State<BooksState>) -> Result<Json<Vec<Genre>>, AppError> {
    let mut conn = state.connection().await?;
    Ok(Json(conn.genres().await?))
}

async fn book_details(
    State(state): State<BooksState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Book>, AppError> {
    let mut conn = state.connection().await?;
    conn.find_book(id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::BookNotFound(id).into())
}

async fn create_book(
    State(state): State<BooksState>,
    Form(form): Form<BookForm>,
) -> Result<(StatusCode, Json<OperationOutcome>), AppError> {
    let new_book = form.into_new_book().map_err(validation_error)?;

    let mut conn = state.connection().await?;
    let book = conn.create_book(new_book).await?;

    Ok((
        StatusCode::CREATED,
        Json(OperationOutcome::success("Livro cadastrado com sucesso", book.id)),
    ))
}

async fn edit_book(
    State(state): State<BooksState>,
    Path(id): Path<RecordId>,
    Form(form): Form<BookForm>,
) -> Result<Json<OperationOutcome>, AppError> {
    let new_book = form.into_new_book().map_err(validation_error)?;

    let mut conn = state.connection().await?;
    let book = conn.update_book(id, new_book).await?;

    Ok(Json(OperationOutcome::success("Livro editado com sucesso", book.id)))
}

async fn delete_book(
    State(state): State<BooksState>,
    Path(id): Path<RecordId>,
) -> Result<Json<OperationOutcome>, AppError> {
    let mut conn = state.connection().await?;
    let book = conn.delete_book(id).await?;

    Ok(Json(OperationOutcome::success("Livro excluído com sucesso", book.id)))
}

fn validation_error(errors: ValidationErrors) -> AppError {
    let mut details: Vec<(String, serde_json::Value)> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            let field = field.to_string();
            field_errors.iter().map(move |error| {
                (
                    field.clone(),
                    json!({
                        "field": field,
                        "error": error.code,
                        "message": error.message,
                    }),
                )
            })
        })
        .collect();
    details.sort_by(|a, b| a.0.cmp(&b.0));

    AppError::validation(
        details.into_iter().map(|(_, detail)| detail).collect(),
        "Os dados do livro são inválidos",
    )
}

impl From<ListingError> for AppError {
    fn from(err: ListingError) -> Self {
        let message = err.to_string();
        match err {
            ListingError::MalformedRequest(_) => {
                AppError::bad_request_with_code("malformed_request", message)
            }
            ListingError::InvalidSortField(_) => {
                AppError::bad_request_with_code("invalid_sort_field", message)
            }
            ListingError::InvalidPageParameters { .. } => {
                AppError::bad_request_with_code("invalid_page_parameters", message)
            }
            ListingError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BookNotFound(_) => AppError::not_found(err.to_string()),
            StoreError::UnknownGenre(id) => AppError::validation(
                vec![json!({"field": "generoId", "error": "genero_inexistente", "value": id})],
                err.to_string(),
            ),
            StoreError::Db(DbError::PoolTimeout) | StoreError::Db(DbError::PoolClosed) => {
                AppError::unavailable(err.to_string())
            }
            StoreError::InvalidStoredPrice { .. } => AppError::Internal(anyhow::Error::new(err)),
            StoreError::Db(err) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}
