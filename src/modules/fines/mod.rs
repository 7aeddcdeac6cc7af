use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use circulation_authz::{AdminPrincipal, Principal};
use circulation_http::error::AppError;
use circulation_kernel::{InitCtx, Module};

use super::{
    array_of, bearer, error_response, json_content, ok_json, path_param, query_param, schema_ref,
};
use crate::{
    circulation::{Fine, FineStatus},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FineFilter {
    pub user_id: Option<String>,
    pub status: Option<FineStatus>,
}

impl FineFilter {
    fn matches(&self, fine: &Fine) -> bool {
        self.user_id.as_deref().map_or(true, |id| fine.user_id == id)
            && self.status.map_or(true, |status| fine.status == status)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateFine {
    pub status: FineStatus,
}

/// Fines raised at return time
pub struct FinesModule {
    state: AppState,
}

impl FinesModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for FinesModule {
    fn name(&self) -> &'static str {
        "fines"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let outstanding = self
            .state
            .store
            .read(|lib| {
                lib.fines
                    .iter()
                    .filter(|f| f.status == FineStatus::Pending)
                    .count()
            })
            .await;
        tracing::info!(module = self.name(), outstanding, "fines module initialized");
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/", get(list_fines))
                .route("/{id}", patch(update_fine))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let status_enum = json!({ "type": "string", "enum": ["PENDING", "PAID"] });
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List fines",
                        "tags": ["Fines"],
                        "security": bearer(),
                        "parameters": [
                            query_param("userId", json!({ "type": "string" })),
                            query_param("status", status_enum.clone())
                        ],
                        "responses": { "200": ok_json("Fines", array_of("Fine")) }
                    }
                },
                "/{id}": {
                    "patch": {
                        "summary": "Mark a fine paid",
                        "description": "Paying an already paid fine returns it unchanged.",
                        "tags": ["Fines"],
                        "security": bearer(),
                        "parameters": [path_param("id")],
                        "requestBody": {
                            "required": true,
                            "content": json_content(json!({
                                "type": "object",
                                "properties": { "status": { "type": "string", "enum": ["PAID"] } },
                                "required": ["status"]
                            }))
                        },
                        "responses": {
                            "200": ok_json("Fine", schema_ref("Fine")),
                            "404": error_response("Fine not found"),
                            "422": error_response("Fines cannot go back to PENDING")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Fine": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "userId": { "type": "string" },
                            "userName": { "type": "string" },
                            "bookId": { "type": "string" },
                            "bookTitle": { "type": "string" },
                            "historyId": { "type": "string" },
                            "amount": { "type": "number" },
                            "reason": { "type": "string" },
                            "status": status_enum,
                            "timestamp": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "userId", "amount", "status", "timestamp"]
                    }
                }
            }
        }))
    }
}

async fn list_fines(
    State(state): State<AppState>,
    principal: Principal,
    Query(mut filter): Query<FineFilter>,
) -> Json<Vec<Fine>> {
    // Students only see their own fines.
    if !principal.is_admin() {
        filter.user_id = Some(principal.user_id.clone());
    }
    let fines: Vec<Fine> = state
        .store
        .read(|lib| match filter.user_id.as_deref() {
            Some(user_id) => lib
                .fines_for_user(user_id)
                .filter(|f| filter.matches(f))
                .cloned()
                .collect(),
            None => lib
                .fines
                .iter()
                .filter(|f| filter.matches(f))
                .cloned()
                .collect(),
        })
        .await;
    Json(fines)
}

async fn update_fine(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    Json(body): Json<UpdateFine>,
) -> Result<Json<Fine>, AppError> {
    if body.status != FineStatus::Paid {
        return Err(AppError::validation(
            vec![json!({ "field": "status", "allowed": ["PAID"] })],
            "a fine can only be marked PAID",
        ));
    }
    let fine = state.transact(|lib| lib.pay_fine(&id)).await?;
    tracing::info!(module = "fines", fine_id = %fine.id, by = %admin.user_id, "fine settled");
    Ok(Json(fine))
}

/// Create a new instance of the fines module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(FinesModule::new(state))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn fine(user_id: &str, status: FineStatus) -> Fine {
        Fine {
            id: "f1".into(),
            user_id: user_id.into(),
            user_name: "Ana".into(),
            book_id: "b1".into(),
            book_title: "Dune".into(),
            history_id: "h1".into(),
            amount: 3.0,
            reason: "late".into(),
            status,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn filter_by_user_and_status() {
        let filter = FineFilter {
            user_id: Some("u1".into()),
            status: Some(FineStatus::Pending),
        };
        assert!(filter.matches(&fine("u1", FineStatus::Pending)));
        assert!(!filter.matches(&fine("u1", FineStatus::Paid)));
        assert!(!filter.matches(&fine("u2", FineStatus::Pending)));
    }

    #[test]
    fn update_body_uses_wire_status_names() {
        let body: UpdateFine = serde_json::from_str(r#"{"status":"PAID"}"#).unwrap();
        assert_eq!(body.status, FineStatus::Paid);
        assert!(serde_json::from_str::<UpdateFine>(r#"{"status":"paid"}"#).is_err());
    }
}
