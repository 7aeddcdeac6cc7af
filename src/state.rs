use std::sync::Arc;

use axum::extract::FromRef;

use circulation_authz::{AdminCredential, SessionStore};
use circulation_db::DocumentStore;
use circulation_http::error::AppError;
use circulation_kernel::settings::Settings;

use crate::circulation::{self, Library};

/// Shared handles passed to every module router.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore<Library>>,
    pub sessions: Arc<SessionStore>,
    pub credential: Arc<AdminCredential>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let store = match settings.store.document_path() {
            Some(path) => DocumentStore::at_path(path),
            None => DocumentStore::in_memory(),
        };
        Self::with_store(settings, store)
    }

    pub fn with_store(settings: Settings, store: DocumentStore<Library>) -> Self {
        Self {
            store: Arc::new(store),
            sessions: Arc::new(SessionStore::new(settings.auth.session_ttl_secs)),
            credential: Arc::new(AdminCredential::new(
                settings.auth.admin_password_hash.clone(),
            )),
            settings: Arc::new(settings),
        }
    }

    /// Run one circulation command as a store transaction.
    pub async fn transact<R, F>(&self, command: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut Library) -> circulation::Result<R>,
    {
        self.store
            .transact(|library| command(library).map_err(AppError::from))
            .await
    }
}

impl FromRef<AppState> for Arc<SessionStore> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
