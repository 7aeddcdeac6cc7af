use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use circulation_authz::{extract::header_token, IssuedSession, Principal, Role};
use circulation_http::error::AppError;
use circulation_kernel::{InitCtx, Module};

use super::{bearer, error_response, json_content, ok_json, schema_ref};
use crate::{circulation::UserDraft, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Login, logout and session introspection
pub struct AuthModule {
    state: AppState,
}

impl AuthModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Create the configured admin account when the store has none.
    async fn seed_admin(&self) -> anyhow::Result<bool> {
        let auth = &self.state.settings.auth;
        let seeded = self
            .state
            .transact(|lib| {
                if lib.find_user(&auth.admin_user_id).is_some() {
                    return Ok(false);
                }
                lib.upsert_user(UserDraft {
                    id: Some(auth.admin_user_id.clone()),
                    name: auth.admin_name.clone(),
                    role: Role::Admin,
                    class_name: None,
                    avatar_url: None,
                })
                .map(|upserted| upserted.created)
            })
            .await?;
        Ok(seeded)
    }
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let seeded = self.seed_admin().await?;
        if seeded {
            tracing::info!(
                module = self.name(),
                admin_user_id = %self.state.settings.auth.admin_user_id,
                "default admin account created"
            );
        }
        tracing::info!(module = self.name(), "auth module initialized");
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/login", post(login))
                .route("/logout", post(logout))
                .route("/me", get(me))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/login": {
                    "post": {
                        "summary": "Open a session",
                        "description": "Students sign in by id. ADMIN accounts must also send the shared admin password.",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": json_content(json!({
                                "type": "object",
                                "properties": {
                                    "userId": { "type": "string" },
                                    "password": { "type": "string" }
                                },
                                "required": ["userId"]
                            }))
                        },
                        "responses": {
                            "200": ok_json("Session", schema_ref("Session")),
                            "401": error_response("Unknown user or wrong password")
                        }
                    }
                },
                "/logout": {
                    "post": {
                        "summary": "Revoke the current bearer token",
                        "tags": ["Auth"],
                        "security": bearer(),
                        "responses": { "204": { "description": "Session closed" } }
                    }
                },
                "/me": {
                    "get": {
                        "summary": "The caller's identity",
                        "tags": ["Auth"],
                        "security": bearer(),
                        "responses": {
                            "200": ok_json("Principal", schema_ref("Principal")),
                            "401": error_response("Not signed in")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Principal": {
                        "type": "object",
                        "properties": {
                            "userId": { "type": "string" },
                            "userName": { "type": "string" },
                            "role": { "type": "string", "enum": ["ADMIN", "STUDENT"] }
                        },
                        "required": ["userId", "userName", "role"]
                    },
                    "Session": {
                        "type": "object",
                        "properties": {
                            "token": { "type": "string" },
                            "expiresAt": { "type": "string", "format": "date-time" },
                            "principal": schema_ref("Principal")
                        },
                        "required": ["token", "expiresAt", "principal"]
                    }
                }
            }
        }))
    }
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<IssuedSession>, AppError> {
    let rejected = || AppError::unauthorized("invalid credentials").with_code("invalid_credentials");

    let user = state
        .store
        .read(|lib| lib.find_user(&body.user_id).cloned())
        .await
        .ok_or_else(rejected)?;

    if user.role == Role::Admin {
        let password = body.password.as_deref().unwrap_or_default();
        if password.is_empty() || !state.credential.verify(password).await {
            tracing::warn!(module = "auth", user_id = %user.id, "admin login rejected");
            return Err(rejected());
        }
    }

    let principal = Principal {
        user_id: user.id,
        user_name: user.name,
        role: user.role,
    };
    let session = state.sessions.issue(principal, Utc::now()).await;
    tracing::info!(
        module = "auth",
        user_id = %session.principal.user_id,
        role = ?session.principal.role,
        "session opened"
    );
    Ok(Json(session))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = header_token(&headers) {
        if state.sessions.revoke(token).await {
            tracing::info!(module = "auth", "session closed");
        }
    }
    StatusCode::NO_CONTENT
}

async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

/// Create a new instance of the auth module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(AuthModule::new(state))
}
