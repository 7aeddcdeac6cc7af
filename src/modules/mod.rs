pub mod auth;
pub mod books;
pub mod fines;
pub mod history;
pub mod requests;
pub mod upload;
pub mod users;

use serde::Serialize;
use serde_json::{json, Value};

use circulation_kernel::ModuleRegistry;

use crate::{circulation::Upserted, state::AppState};

/// Register all resource modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, state: &AppState) {
    registry.register_custom(auth::create_module(state.clone()));
    registry.register_custom(books::create_module(state.clone()));
    registry.register_custom(users::create_module(state.clone()));
    registry.register_custom(requests::create_module(state.clone()));
    registry.register_custom(history::create_module(state.clone()));
    registry.register_custom(fines::create_module(state.clone()));
    registry.register_custom(upload::create_module(state.clone()));
}

/// Response of the bulk upsert endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary<T> {
    pub inserted: usize,
    pub updated: usize,
    pub records: Vec<T>,
}

impl<T> From<Vec<Upserted<T>>> for BulkSummary<T> {
    fn from(upserted: Vec<Upserted<T>>) -> Self {
        let inserted = upserted.iter().filter(|u| u.created).count();
        Self {
            inserted,
            updated: upserted.len() - inserted,
            records: upserted.into_iter().map(|u| u.record).collect(),
        }
    }
}

// OpenAPI fragment helpers shared by the modules.

pub(crate) fn json_content(schema: Value) -> Value {
    json!({ "application/json": { "schema": schema } })
}

pub(crate) fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{}", name) })
}

pub(crate) fn array_of(name: &str) -> Value {
    json!({ "type": "array", "items": schema_ref(name) })
}

pub(crate) fn ok_json(description: &str, schema: Value) -> Value {
    json!({ "description": description, "content": json_content(schema) })
}

pub(crate) fn error_response(description: &str) -> Value {
    ok_json(description, schema_ref("ErrorResponse"))
}

pub(crate) fn path_param(name: &str) -> Value {
    json!({ "name": name, "in": "path", "required": true, "schema": { "type": "string" } })
}

pub(crate) fn query_param(name: &str, schema: Value) -> Value {
    json!({ "name": name, "in": "query", "required": false, "schema": schema })
}

pub(crate) fn bearer() -> Value {
    json!([{ "bearer": [] }])
}
