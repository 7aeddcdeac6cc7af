use std::path::PathBuf;

use async_trait::async_trait;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::services::ServeDir;

use circulation_authz::AdminPrincipal;
use circulation_http::error::AppError;
use circulation_kernel::{InitCtx, Module};

use super::{bearer, error_response, ok_json, path_param, schema_ref};
use crate::{state::AppState, utils::new_id};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub url: String,
    pub name: String,
    pub size: usize,
    pub content_type: String,
}

/// Image uploads for covers and avatars
pub struct UploadModule {
    state: AppState,
}

impl UploadModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn dir(&self) -> PathBuf {
        self.state.settings.uploads.dir.clone()
    }
}

#[async_trait]
impl Module for UploadModule {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let dir = self.dir();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(
            module = self.name(),
            dir = %dir.display(),
            max_bytes = self.state.settings.uploads.max_bytes,
            "upload module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Option<Router> {
        let limit = self.state.settings.uploads.max_bytes + MULTIPART_OVERHEAD;
        Some(
            Router::new()
                .route("/", post(upload_image))
                .layer(DefaultBodyLimit::max(limit))
                .nest_service("/files", ServeDir::new(self.dir()))
                .with_state(self.state.clone()),
        )
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "post": {
                        "summary": "Upload an image and get back its public URL",
                        "tags": ["Upload"],
                        "security": bearer(),
                        "requestBody": {
                            "required": true,
                            "content": {
                                "multipart/form-data": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "file": { "type": "string", "format": "binary" } },
                                        "required": ["file"]
                                    }
                                }
                            }
                        },
                        "responses": {
                            "201": ok_json("Stored", schema_ref("StoredUpload")),
                            "400": error_response("Malformed multipart body or missing file field"),
                            "422": error_response("Not an image, or too large")
                        }
                    }
                },
                "/files/{name}": {
                    "get": {
                        "summary": "Download an uploaded image",
                        "tags": ["Upload"],
                        "parameters": [path_param("name")],
                        "responses": { "200": { "description": "Image bytes" } }
                    }
                }
            },
            "components": {
                "schemas": {
                    "StoredUpload": {
                        "type": "object",
                        "properties": {
                            "url": { "type": "string" },
                            "name": { "type": "string" },
                            "size": { "type": "integer" },
                            "contentType": { "type": "string" }
                        },
                        "required": ["url", "name", "size", "contentType"]
                    }
                }
            }
        }))
    }
}

async fn upload_image(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredUpload>), AppError> {
    let settings = &state.settings.uploads;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.to_string()).with_code("bad_multipart"))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::validation(
                vec![json!({ "field": "file", "contentType": content_type })],
                "only image uploads are accepted",
            )
            .with_code("unsupported_media"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(e.to_string()).with_code("bad_multipart"))?;
        if bytes.len() > settings.max_bytes {
            return Err(AppError::validation(
                vec![json!({ "field": "file", "size": bytes.len(), "max": settings.max_bytes })],
                "image is too large",
            )
            .with_code("file_too_large"));
        }

        let name = format!("{}.{}", new_id(), extension_for(&content_type));
        tokio::fs::write(settings.dir.join(&name), &bytes)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        let stored = StoredUpload {
            url: public_url(&settings.public_base_url, &name),
            name,
            size: bytes.len(),
            content_type,
        };
        tracing::info!(
            module = "upload",
            name = %stored.name,
            size = stored.size,
            by = %admin.user_id,
            "image stored"
        );
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(AppError::bad_request("multipart body has no 'file' field").with_code("missing_file"))
}

/// File extension derived from an `image/*` content type.
fn extension_for(content_type: &str) -> String {
    let subtype = content_type
        .split_once('/')
        .map(|(_, sub)| sub)
        .unwrap_or_default();
    let subtype = subtype.split(['+', ';']).next().unwrap_or_default();
    let ext: String = subtype
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match ext.as_str() {
        "" => "bin".to_string(),
        "jpeg" => "jpg".to_string(),
        _ => ext,
    }
}

fn public_url(base: &str, name: &str) -> String {
    format!("{}/api/upload/files/{}", base.trim_end_matches('/'), name)
}

/// Create a new instance of the upload module
pub fn create_module(state: AppState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(UploadModule::new(state))
}
