pub mod models;

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
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
    circulation::{waitlist::QueueEntry, BorrowRequest, Resolution},
    state::AppState,
};
use models::{CreateRequest, QueuedRequest, RequestFilter, ResolveRequest};

/// Borrow requests and their resolution
pub struct RequestsModule {
    state: AppState,
}

impl RequestsModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for RequestsModule {
    fn name(&self) -> &'static str {
        "requests"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let pending = self
            .state
            .store
            .read(|lib| lib.requests.iter().filter(|r| r.is_pending()).count())
            .await;
        tracing::info!(module = self.name(), pending, "requests module initialized");
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/", get(list_requests).post(create_request))
                .route("/queues", get(all_queues))
                .route("/{id}", patch(resolve_request))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let status_enum = json!({ "type": "string", "enum": ["PENDING", "APPROVED", "DENIED"] });
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List borrow requests",
                        "tags": ["Requests"],
                        "security": bearer(),
                        "parameters": [
                            query_param("bookId", json!({ "type": "string" })),
                            query_param("userId", json!({ "type": "string" })),
                            query_param("status", status_enum.clone())
                        ],
                        "responses": { "200": ok_json("Requests", array_of("BorrowRequest")) }
                    },
                    "post": {
                        "summary": "Ask to borrow a book",
                        "description": "Always creates a PENDING request, whatever the stock.",
                        "tags": ["Requests"],
                        "security": bearer(),
                        "requestBody": {
                            "required": true,
                            "content": json_content(json!({
                                "type": "object",
                                "properties": {
                                    "bookId": { "type": "string" },
                                    "userId": { "type": "string" }
                                },
                                "required": ["bookId"]
                            }))
                        },
                        "responses": {
                            "201": ok_json("Queued", json!({
                                "type": "object",
                                "properties": {
                                    "request": schema_ref("BorrowRequest"),
                                    "position": { "type": "integer" }
                                }
                            })),
                            "403": error_response("Students can only request for themselves"),
                            "404": error_response("Book or user not found")
                        }
                    }
                },
                "/queues": {
                    "get": {
                        "summary": "Every non-empty waitlist keyed by book id",
                        "tags": ["Requests", "Waitlist"],
                        "security": bearer(),
                        "responses": { "200": ok_json("Queues", json!({ "type": "object" })) }
                    }
                },
                "/{id}": {
                    "patch": {
                        "summary": "Approve or deny a pending request",
                        "description": "Approval without an available copy still marks the request APPROVED and leaves stock untouched; see stockApplied.",
                        "tags": ["Requests"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "requestBody": {
                            "required": true,
                            "content": json_content(json!({
                                "type": "object",
                                "properties": { "action": { "type": "string", "enum": ["APPROVE", "DENY"] } },
                                "required": ["action"]
                            }))
                        },
                        "responses": {
                            "200": ok_json("Resolution", schema_ref("Resolution")),
                            "404": error_response("Request not found"),
                            "409": error_response("Request already resolved")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "BorrowRequest": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "bookId": { "type": "string" },
                            "bookTitle": { "type": "string" },
                            "userId": { "type": "string" },
                            "userName": { "type": "string" },
                            "status": status_enum,
                            "timestamp": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "bookId", "userId", "status", "timestamp"]
                    },
                    "Resolution": {
                        "type": "object",
                        "properties": {
                            "request": schema_ref("BorrowRequest"),
                            "loan": schema_ref("HistoryRecord"),
                            "stockApplied": { "type": "boolean" }
                        },
                        "required": ["request", "stockApplied"]
                    }
                }
            }
        }))
    }
}

async fn list_requests(
    State(state): State<AppState>,
    _principal: Principal,
    Query(filter): Query<RequestFilter>,
) -> Json<Vec<BorrowRequest>> {
    let requests = state
        .store
        .read(|lib| {
            lib.requests
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect()
        })
        .await;
    Json(requests)
}

async fn create_request(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateRequest>,
) -> Result<(StatusCode, Json<QueuedRequest>), AppError> {
    let user_id = match body.user_id {
        Some(user_id) if user_id != principal.user_id && !principal.is_admin() => {
            return Err(AppError::forbidden(
                "students can only request books for themselves",
            ));
        }
        Some(user_id) => user_id,
        None => principal.user_id.clone(),
    };

    let queued = state
        .transact(|lib| {
            let request = lib.create_request(&body.book_id, &user_id, Utc::now())?;
            let position = lib
                .waitlist(&request.book_id)
                .iter()
                .find(|entry| entry.request_id == request.id)
                .map(|entry| entry.position);
            Ok(QueuedRequest { request, position })
        })
        .await?;

    tracing::info!(
        module = "requests",
        request_id = %queued.request.id,
        position = ?queued.position,
        by = %principal.user_id,
        "borrow request queued"
    );
    Ok((StatusCode::CREATED, Json(queued)))
}

async fn resolve_request(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<Resolution>, AppError> {
    let resolution = state
        .transact(|lib| lib.resolve_request(&id, body.action, Utc::now()))
        .await?;
    tracing::info!(
        module = "requests",
        request_id = %id,
        action = ?body.action,
        stock_applied = resolution.stock_applied,
        by = %admin.user_id,
        "borrow request resolved"
    );
    Ok(Json(resolution))
}

async fn all_queues(
    State(state): State<AppState>,
    _principal: Principal,
) -> Json<BTreeMap<String, Vec<QueueEntry>>> {
    Json(
        state
            .store
            .read(|lib| crate::circulation::waitlist::queues(&lib.requests))
            .await,
    )
}

/// Create a new instance of the requests module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(RequestsModule::new(state))
}
