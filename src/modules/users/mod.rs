use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use circulation_authz::{AdminPrincipal, Principal, Role};
use circulation_http::error::AppError;
use circulation_kernel::{InitCtx, Module};

use super::{
    array_of, bearer, error_response, json_content, ok_json, path_param, schema_ref, BulkSummary,
};
use crate::{
    circulation::{CirculationError, User, UserDraft},
    state::AppState,
};

/// Library members and staff
pub struct UsersModule {
    state: AppState,
}

impl UsersModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for UsersModule {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "users module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/", get(list_users).post(upsert_user))
                .route("/bulk", post(bulk_upsert_users))
                .route("/{id}", get(get_user).delete(delete_user))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List users",
                        "tags": ["Users"],
                        "security": bearer(),
                        "responses": { "200": ok_json("Users", array_of("User")) }
                    },
                    "post": {
                        "summary": "Create or update a user",
                        "tags": ["Users"],
                        "security": bearer(),
                        "requestBody": { "required": true, "content": json_content(schema_ref("UserDraft")) },
                        "responses": {
                            "200": ok_json("Updated", schema_ref("User")),
                            "201": ok_json("Created", schema_ref("User"))
                        }
                    }
                },
                "/bulk": {
                    "post": {
                        "summary": "Upsert users by id",
                        "tags": ["Users"],
                        "security": bearer(),
                        "requestBody": { "required": true, "content": json_content(array_of("UserDraft")) },
                        "responses": { "200": ok_json("Summary", json!({ "type": "object" })) }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a user",
                        "tags": ["Users"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "responses": {
                            "200": ok_json("User", schema_ref("User")),
                            "404": error_response("User not found")
                        }
                    },
                    "delete": {
                        "summary": "Delete a user and end their sessions",
                        "tags": ["Users"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "responses": {
                            "204": { "description": "Deleted" },
                            "404": error_response("User not found")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "User": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "name": { "type": "string" },
                            "role": { "type": "string", "enum": ["ADMIN", "STUDENT"] },
                            "class": { "type": "string", "nullable": true },
                            "avatarUrl": { "type": "string", "nullable": true }
                        },
                        "required": ["id", "name", "role"]
                    },
                    "UserDraft": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "name": { "type": "string" },
                            "role": { "type": "string", "enum": ["ADMIN", "STUDENT"] },
                            "class": { "type": "string" },
                            "avatarUrl": { "type": "string" }
                        },
                        "required": ["name", "role"]
                    }
                }
            }
        }))
    }
}

async fn list_users(State(state): State<AppState>, _principal: Principal) -> Json<Vec<User>> {
    Json(state.store.read(|lib| lib.users.clone()).await)
}

async fn get_user(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    state
        .store
        .read(|lib| lib.find_user(&id).cloned())
        .await
        .map(Json)
        .ok_or_else(|| CirculationError::UserNotFound(id).into())
}

async fn upsert_user(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(draft): Json<UserDraft>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let (upserted, previous_role) = state
        .transact(|lib| {
            let previous_role = draft
                .id
                .as_deref()
                .and_then(|id| lib.find_user(id))
                .map(|user| user.role);
            Ok((lib.upsert_user(draft)?, previous_role))
        })
        .await?;
    // Sessions carry the role they were issued with.
    let revoked = match previous_role {
        Some(role) if role != upserted.record.role => {
            state.sessions.revoke_user(&upserted.record.id).await
        }
        _ => 0,
    };
    tracing::info!(
        module = "users",
        user_id = %upserted.record.id,
        created = upserted.created,
        sessions_revoked = revoked,
        by = %admin.user_id,
        "user saved"
    );
    let status = if upserted.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(upserted.record)))
}

async fn bulk_upsert_users(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(drafts): Json<Vec<UserDraft>>,
) -> Result<Json<BulkSummary<User>>, AppError> {
    let (upserted, previous) = state
        .transact(|lib| {
            let previous: Vec<(String, Role)> = lib
                .users
                .iter()
                .map(|user| (user.id.clone(), user.role))
                .collect();
            Ok((lib.upsert_users(drafts)?, previous))
        })
        .await?;
    let mut revoked = 0;
    for saved in &upserted {
        let user = &saved.record;
        if previous
            .iter()
            .any(|(id, role)| *id == user.id && *role != user.role)
        {
            revoked += state.sessions.revoke_user(&user.id).await;
        }
    }
    let summary: BulkSummary<User> = upserted.into();
    tracing::info!(
        module = "users",
        inserted = summary.inserted,
        updated = summary.updated,
        sessions_revoked = revoked,
        by = %admin.user_id,
        "bulk user upsert"
    );
    Ok(Json(summary))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if id == admin.user_id {
        return Err(AppError::conflict(vec![], "an admin cannot delete their own account")
            .with_code("self_delete"));
    }
    let user = state.transact(|lib| lib.delete_user(&id)).await?;
    let revoked = state.sessions.revoke_user(&user.id).await;
    tracing::info!(
        module = "users",
        user_id = %user.id,
        sessions_revoked = revoked,
        by = %admin.user_id,
        "user deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Create a new instance of the users module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(UsersModule::new(state))
}
