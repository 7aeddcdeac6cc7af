pub mod models;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use circulation_authz::{AdminPrincipal, Principal};
use circulation_http::error::AppError;
use circulation_kernel::{InitCtx, Module};

use super::{
    array_of, bearer, error_response, json_content, ok_json, path_param, schema_ref, BulkSummary,
};
use crate::{
    circulation::{Book, BookDraft, CirculationError},
    state::AppState,
};
use models::{QueuePosition, WaitlistView};

/// Catalog: book records and their waitlists
pub struct BooksModule {
    state: AppState,
}

impl BooksModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let count = self.state.store.read(|lib| lib.books.len()).await;
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            books = count,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/", get(list_books).post(upsert_book))
                .route("/bulk", post(bulk_upsert_books))
                .route("/{id}", get(get_book).delete(delete_book))
                .route("/{id}/waitlist", get(book_waitlist))
                .route("/{id}/waitlist/{user_id}", get(waitlist_position))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "responses": { "200": ok_json("Catalog", array_of("Book")) }
                    },
                    "post": {
                        "summary": "Create or update a book",
                        "tags": ["Books"],
                        "security": bearer(),
                        "requestBody": { "required": true, "content": json_content(schema_ref("BookDraft")) },
                        "responses": {
                            "200": ok_json("Updated", schema_ref("Book")),
                            "201": ok_json("Created", schema_ref("Book")),
                            "422": error_response("Stock bound violated")
                        }
                    }
                },
                "/bulk": {
                    "post": {
                        "summary": "Upsert books by id",
                        "tags": ["Books"],
                        "security": bearer(),
                        "requestBody": { "required": true, "content": json_content(array_of("BookDraft")) },
                        "responses": {
                            "200": ok_json("Summary", json!({ "type": "object" })),
                            "422": error_response("A draft was rejected; nothing was written")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": [path_param("id")],
                        "responses": {
                            "200": ok_json("Book", schema_ref("Book")),
                            "404": error_response("Book not found")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "responses": {
                            "204": { "description": "Deleted" },
                            "404": error_response("Book not found")
                        }
                    }
                },
                "/{id}/waitlist": {
                    "get": {
                        "summary": "Pending requests for a book, oldest first",
                        "tags": ["Books", "Waitlist"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "responses": {
                            "200": ok_json("Waitlist", schema_ref("Waitlist")),
                            "404": error_response("Book not found")
                        }
                    }
                },
                "/{id}/waitlist/{user_id}": {
                    "get": {
                        "summary": "A user's 1-based waitlist position",
                        "tags": ["Books", "Waitlist"],
                        "security": bearer(),
                        "parameters": [path_param("id"), path_param("user_id")],
                        "responses": {
                            "200": ok_json("Position", json!({ "type": "object" })),
                            "404": error_response("User is not waiting for this book")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Borrower": {
                        "type": "object",
                        "properties": {
                            "userId": { "type": "string" },
                            "userName": { "type": "string" }
                        },
                        "required": ["userId", "userName"]
                    },
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "category": { "type": "string" },
                            "year": { "type": "integer", "nullable": true },
                            "isbn": { "type": "string" },
                            "coverUrl": { "type": "string", "nullable": true },
                            "price": { "type": "number" },
                            "totalCopies": { "type": "integer", "minimum": 0 },
                            "availableCopies": { "type": "integer", "minimum": 0 },
                            "currentBorrowers": array_of("Borrower")
                        },
                        "required": ["id", "title", "author", "totalCopies", "availableCopies", "currentBorrowers"]
                    },
                    "BookDraft": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": "Existing id to update; omitted for a new book" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "category": { "type": "string" },
                            "year": { "type": "integer" },
                            "isbn": { "type": "string" },
                            "coverUrl": { "type": "string" },
                            "price": { "type": "number" },
                            "totalCopies": { "type": "integer", "minimum": 0 },
                            "availableCopies": { "type": "integer", "minimum": 0 }
                        },
                        "required": ["title", "author", "totalCopies"]
                    },
                    "Waitlist": {
                        "type": "object",
                        "properties": {
                            "bookId": { "type": "string" },
                            "availableCopies": { "type": "integer" },
                            "totalCopies": { "type": "integer" },
                            "entries": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "position": { "type": "integer", "minimum": 1 },
                                        "requestId": { "type": "string" },
                                        "userId": { "type": "string" },
                                        "userName": { "type": "string" },
                                        "timestamp": { "type": "string", "format": "date-time" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
    }
}

async fn list_books(State(state): State<AppState>) -> Json<Vec<Book>> {
    Json(state.store.read(|lib| lib.books.clone()).await)
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    state
        .store
        .read(|lib| lib.find_book(&id).cloned())
        .await
        .map(Json)
        .ok_or_else(|| CirculationError::BookNotFound(id).into())
}

async fn upsert_book(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(draft): Json<BookDraft>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let upserted = state.transact(|lib| lib.upsert_book(draft)).await?;
    tracing::info!(
        module = "books",
        book_id = %upserted.record.id,
        created = upserted.created,
        by = %admin.user_id,
        "book saved"
    );
    let status = if upserted.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(upserted.record)))
}

async fn bulk_upsert_books(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(drafts): Json<Vec<BookDraft>>,
) -> Result<Json<BulkSummary<Book>>, AppError> {
    let summary: BulkSummary<Book> = state.transact(|lib| lib.upsert_books(drafts)).await?.into();
    tracing::info!(
        module = "books",
        inserted = summary.inserted,
        updated = summary.updated,
        by = %admin.user_id,
        "bulk book upsert"
    );
    Ok(Json(summary))
}

async fn delete_book(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let book = state.transact(|lib| lib.delete_book(&id)).await?;
    tracing::info!(module = "books", book_id = %book.id, by = %admin.user_id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn book_waitlist(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<WaitlistView>, AppError> {
    let view = state
        .store
        .read(|lib| {
            lib.find_book(&id).map(|book| WaitlistView {
                book_id: book.id.clone(),
                available_copies: book.available_copies,
                total_copies: book.total_copies,
                entries: lib.waitlist(&book.id),
            })
        })
        .await;
    view.map(Json)
        .ok_or_else(|| CirculationError::BookNotFound(id).into())
}

async fn waitlist_position(
    State(state): State<AppState>,
    _principal: Principal,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<QueuePosition>, AppError> {
    let (position, queue_length) = state
        .store
        .read(|lib| {
            (
                lib.waitlist_position(&id, &user_id),
                lib.waitlist(&id).len(),
            )
        })
        .await;

    let position = position.ok_or_else(|| {
        AppError::not_found(format!(
            "user '{}' has no pending request for book '{}'",
            user_id, id
        ))
        .with_code("not_queued")
    })?;

    Ok(Json(QueuePosition {
        book_id: id,
        user_id,
        position,
        queue_length,
    }))
}

/// Create a new instance of the books module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BooksModule::new(state))
}
