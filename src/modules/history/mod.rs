pub mod models;

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use circulation_authz::{AdminPrincipal, Principal};
use circulation_http::error::AppError;
use circulation_kernel::{InitCtx, Module};

use super::{
    array_of, bearer, error_response, json_content, ok_json, path_param, query_param, schema_ref,
};
use crate::{
    circulation::{HistoryRecord, ReturnReceipt},
    state::AppState,
};
use models::{CloseLoan, HistoryFilter, ReturnBook};

/// Loan history and book returns
pub struct HistoryModule {
    state: AppState,
}

impl HistoryModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for HistoryModule {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let open = self.state.store.read(|lib| lib.active_loans().count()).await;
        tracing::info!(module = self.name(), open_loans = open, "history module initialized");
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/", get(list_history))
                .route("/returns", post(return_book))
                .route("/{id}", patch(close_loan))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let fine_input = json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number" },
                "reason": { "type": "string" }
            },
            "required": ["amount"]
        });
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List loan records",
                        "tags": ["History"],
                        "security": bearer(),
                        "parameters": [
                            query_param("userId", json!({ "type": "string" })),
                            query_param("bookId", json!({ "type": "string" })),
                            query_param("active", json!({ "type": "boolean" }))
                        ],
                        "responses": { "200": ok_json("History", array_of("HistoryRecord")) }
                    }
                },
                "/returns": {
                    "post": {
                        "summary": "Return a borrowed book, optionally flagging a fine",
                        "tags": ["History"],
                        "security": bearer(),
                        "requestBody": {
                            "required": true,
                            "content": json_content(json!({
                                "type": "object",
                                "properties": {
                                    "bookId": { "type": "string" },
                                    "userId": { "type": "string" },
                                    "fine": fine_input.clone()
                                },
                                "required": ["bookId", "userId"]
                            }))
                        },
                        "responses": {
                            "200": ok_json("Receipt", schema_ref("ReturnReceipt")),
                            "404": error_response("Book not found"),
                            "409": error_response("No open loan for this book and user")
                        }
                    }
                },
                "/{id}": {
                    "patch": {
                        "summary": "Close one loan record",
                        "tags": ["History"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "requestBody": {
                            "required": true,
                            "content": json_content(json!({
                                "type": "object",
                                "properties": { "fine": fine_input }
                            }))
                        },
                        "responses": {
                            "200": ok_json("Receipt", schema_ref("ReturnReceipt")),
                            "404": error_response("Loan record not found"),
                            "409": error_response("Loan already closed")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "HistoryRecord": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "bookId": { "type": "string" },
                            "bookTitle": { "type": "string" },
                            "userId": { "type": "string" },
                            "userName": { "type": "string" },
                            "borrowDate": { "type": "string", "format": "date-time" },
                            "returnDate": { "type": "string", "format": "date-time", "nullable": true }
                        },
                        "required": ["id", "bookId", "userId", "borrowDate"]
                    },
                    "ReturnReceipt": {
                        "type": "object",
                        "properties": {
                            "book": schema_ref("Book"),
                            "record": schema_ref("HistoryRecord"),
                            "fine": schema_ref("Fine")
                        },
                        "required": ["book", "record"]
                    }
                }
            }
        }))
    }
}

async fn list_history(
    State(state): State<AppState>,
    _principal: Principal,
    Query(filter): Query<HistoryFilter>,
) -> Json<Vec<HistoryRecord>> {
    let records: Vec<HistoryRecord> = state
        .store
        .read(|lib| match filter.user_id.as_deref() {
            Some(user_id) => lib
                .loans_for_user(user_id)
                .filter(|h| filter.matches(h))
                .cloned()
                .collect(),
            None => lib
                .history
                .iter()
                .filter(|h| filter.matches(h))
                .cloned()
                .collect(),
        })
        .await;
    Json(records)
}

async fn return_book(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(body): Json<ReturnBook>,
) -> Result<Json<ReturnReceipt>, AppError> {
    let receipt = state
        .transact(|lib| lib.process_return(&body.book_id, &body.user_id, body.fine, Utc::now()))
        .await?;
    log_return(&receipt, &admin.user_id);
    Ok(Json(receipt))
}

async fn close_loan(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    Json(body): Json<CloseLoan>,
) -> Result<Json<ReturnReceipt>, AppError> {
    let receipt = state
        .transact(|lib| lib.return_loan(&id, body.fine, Utc::now()))
        .await?;
    log_return(&receipt, &admin.user_id);
    Ok(Json(receipt))
}

fn log_return(receipt: &ReturnReceipt, by: &str) {
    tracing::info!(
        module = "history",
        history_id = %receipt.record.id,
        book_id = %receipt.book.id,
        fine = ?receipt.fine.as_ref().map(|f| f.amount),
        by = %by,
        "loan closed"
    );
}

/// Create a new instance of the history module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(HistoryModule::new(state))
}
