pub mod error;
pub mod models;
pub mod paging;
pub mod query;
pub mod routes;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::Router;
use livros_kernel::{InitCtx, Migration, Module};

pub use error::{ListingError, StoreError};
pub use paging::PaginationRequest;
pub use query::{list_books, ResultEnvelope};
pub use store::{BookStore, CatalogDb};

/// Book catalog module: listing grid, CRUD, and genre lookup
pub struct BooksModule {
    db: CatalogDb,
}

impl BooksModule {
    pub fn new(db: CatalogDb) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &CatalogDb {
        &self.db
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if ctx.settings.database.seed_sample_data {
            let seeded = store::seed_sample_data(&self.db)
                .await
                .context("failed to seed sample catalog")?;
            tracing::info!(module = self.name(), seeded, "sample data checked");
        }

        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(routes::BooksState {
            db: self.db.clone(),
        })
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        store::MIGRATIONS.to_vec()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            available_connections = self.db.available_connections(),
            "books module started"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module over the shared database
pub fn create_module(db: &CatalogDb) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(db.clone()))
}

fn error_response(description: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn json_response(description: &str, schema: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{schema}") }
            }
        }
    })
}

fn form_body(schema: &str) -> serde_json::Value {
    serde_json::json!({
        "required": true,
        "content": {
            "application/x-www-form-urlencoded": {
                "schema": { "$ref": format!("#/components/schemas/{schema}") }
            }
        }
    })
}

fn id_parameter() -> serde_json::Value {
    serde_json::json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64" }
    })
}

fn openapi_fragment() -> serde_json::Value {
    let listing = serde_json::json!({
        "summary": "List books for the catalog grid",
        "description": concat!(
            "Filters by searchPhrase across title, author, edition year and price; ",
            "sorts by a sort[<Field>] key (Id, Titulo, Autor, AnoEdicao, Valor, Genero.Nome); ",
            "total counts the catalog before filtering."
        ),
        "tags": ["Books"],
        "requestBody": form_body("ListingForm"),
        "responses": {
            "200": json_response("One page of books", "ResultEnvelope"),
            "400": error_response("Malformed request, bad sort field or bad page parameters"),
            "503": error_response("No database connection available")
        }
    });

    serde_json::json!({
        "paths": {
            "/": {
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": form_body("BookForm"),
                    "responses": {
                        "201": json_response("Book created", "OperationOutcome"),
                        "422": error_response("Invalid form fields or unknown genre")
                    }
                }
            },
            "/list": {
                "get": listing.clone(),
                "post": listing
            },
            "/genres": {
                "get": {
                    "summary": "List genres ordered by name",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "Genres",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Genre" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Books health check",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "OK",
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Book details",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": json_response("The book with its genre", "Book"),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Edit a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": form_body("BookForm"),
                    "responses": {
                        "200": json_response("Book updated", "OperationOutcome"),
                        "404": error_response("Book not found"),
                        "422": error_response("Invalid form fields or unknown genre")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": json_response("Book deleted", "OperationOutcome"),
                        "404": error_response("Book not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Genre": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "nome": { "type": "string" }
                    },
                    "required": ["id", "nome"]
                },
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "titulo": { "type": "string" },
                        "autor": { "type": "string" },
                        "anoEdicao": { "type": "integer" },
                        "valor": { "type": "number" },
                        "genero": { "$ref": "#/components/schemas/Genre" }
                    },
                    "required": ["id", "titulo", "autor", "anoEdicao", "valor", "genero"]
                },
                "ResultEnvelope": {
                    "type": "object",
                    "properties": {
                        "rows": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/Book" }
                        },
                        "current": { "type": "integer" },
                        "rowCount": { "type": "integer" },
                        "total": { "type": "integer" }
                    },
                    "required": ["rows", "current", "rowCount", "total"]
                },
                "ListingForm": {
                    "type": "object",
                    "properties": {
                        "current": { "type": "integer", "minimum": 1 },
                        "rowCount": { "type": "integer", "minimum": 1 },
                        "searchPhrase": { "type": "string" }
                    },
                    "additionalProperties": { "type": "string", "enum": ["asc", "desc", ""] },
                    "required": ["current", "rowCount"]
                },
                "BookForm": {
                    "type": "object",
                    "properties": {
                        "Titulo": { "type": "string" },
                        "Autor": { "type": "string" },
                        "AnoEdicao": { "type": "string" },
                        "Valor": { "type": "string" },
                        "GeneroId": { "type": "string" }
                    },
                    "required": ["Titulo", "Autor", "AnoEdicao", "Valor", "GeneroId"]
                },
                "OperationOutcome": {
                    "type": "object",
                    "properties": {
                        "resultado": { "type": "boolean" },
                        "mensagem": { "type": "string" },
                        "id": { "type": "integer", "format": "int64" }
                    },
                    "required": ["resultado", "mensagem"]
                }
            }
        }
    })
}
