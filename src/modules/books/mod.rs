pub mod models;
pub mod repository;
pub mod routes;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use shelf_kernel::{InitCtx, Migration, Module};
use sqlx::SqlitePool;

use repository::{BookRepository, BookStore};
use routes::BooksState;

pub(crate) const MIGRATIONS: &[Migration] = &[Migration {
    id: "001_init",
    up: r#"
        CREATE TABLE IF NOT EXISTS books (
            isbn       TEXT    NOT NULL UNIQUE,
            amazon_url TEXT    NOT NULL,
            author     TEXT    NOT NULL,
            language   TEXT    NOT NULL,
            pages      INTEGER NOT NULL CHECK (pages > 0),
            publisher  TEXT    NOT NULL,
            title      TEXT    NOT NULL,
            year       INTEGER NOT NULL
        );
        "#,
}];

/// Books module: the book catalogue resource
pub struct BooksModule {
    repository: Arc<dyn BookStore>,
}

impl BooksModule {
    pub fn new(repository: Arc<dyn BookStore>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(BooksState {
            repository: self.repository.clone(),
        })
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };
        let book_body = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/BookResponse" }
                    }
                }
            })
        };
        let isbn_param = json!({
            "name": "isbn",
            "in": "path",
            "required": true,
            "schema": { "type": "string" }
        });
        let request_body = |schema: &str| {
            json!({
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": format!("#/components/schemas/{}", schema) }
                    }
                }
            })
        };

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "All books in insertion order",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/BooksResponse" }
                                    }
                                }
                            },
                            "500": error("Internal server error")
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "tags": ["Books"],
                        "requestBody": request_body("NewBook"),
                        "responses": {
                            "201": book_body("Created book"),
                            "400": error("Validation failed or the isbn already exists"),
                            "500": error("Internal server error")
                        }
                    }
                },
                "/{isbn}": {
                    "get": {
                        "summary": "Get a book by isbn",
                        "tags": ["Books"],
                        "parameters": [isbn_param.clone()],
                        "responses": {
                            "200": book_body("Requested book"),
                            "404": error("Book not found")
                        }
                    },
                    "put": {
                        "summary": "Replace every mutable field of a book",
                        "tags": ["Books"],
                        "parameters": [isbn_param.clone()],
                        "requestBody": request_body("BookUpdate"),
                        "responses": {
                            "200": book_body("Updated book"),
                            "400": error("Validation failed"),
                            "404": error("Book not found")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "parameters": [isbn_param],
                        "responses": {
                            "200": {
                                "description": "Book deleted",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": { "message": { "type": "string" } },
                                            "required": ["message"]
                                        }
                                    }
                                }
                            },
                            "404": error("Book not found")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": book_schema(true),
                    "NewBook": book_schema(true),
                    "BookUpdate": book_schema(false),
                    "BookResponse": {
                        "type": "object",
                        "properties": { "book": { "$ref": "#/components/schemas/Book" } },
                        "required": ["book"]
                    },
                    "BooksResponse": {
                        "type": "object",
                        "properties": {
                            "books": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/Book" }
                            }
                        },
                        "required": ["books"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        MIGRATIONS.to_vec()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// JSON schema of a book body, derived from the validation table
fn book_schema(with_isbn: bool) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for spec in schema::BOOK_SCHEMA {
        if spec.immutable && !with_isbn {
            continue;
        }
        let property = match spec.kind {
            schema::FieldKind::Text => json!({ "type": "string", "minLength": 1 }),
            schema::FieldKind::Integer => json!({ "type": "integer" }),
            schema::FieldKind::PositiveInteger => json!({ "type": "integer", "minimum": 1 }),
        };
        properties.insert(spec.name.to_string(), property);
        if spec.required {
            required.push(spec.name);
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Create a new instance of the books module backed by `pool`
pub fn create_module(pool: SqlitePool) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(Arc::new(BookRepository::new(pool))))
}
