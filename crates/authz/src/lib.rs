//! Admin credential, bearer sessions and the axum guards built on them.

pub mod credential;
pub mod extract;
pub mod session;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, task::JoinHandle};

use circulation_kernel::{InitCtx, Module};

pub use credential::AdminCredential;
pub use extract::AdminPrincipal;
pub use session::{IssuedSession, Principal, Role, SessionStore};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// The `authz` core module: owns the session pruner.
pub struct AuthzModule {
    sessions: Arc<SessionStore>,
    credential: Arc<AdminCredential>,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

impl AuthzModule {
    pub fn new(sessions: Arc<SessionStore>, credential: Arc<AdminCredential>) -> Self {
        Self {
            sessions,
            credential,
            pruner: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Module for AuthzModule {
    fn name(&self) -> &'static str {
        "authz"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if self.credential.is_configured() {
            tracing::info!(
                module = self.name(),
                ttl_secs = ctx.settings.auth.session_ttl_secs,
                "admin login enabled"
            );
        } else {
            tracing::warn!(
                module = self.name(),
                "auth.admin_password_hash is not set, admin login is disabled"
            );
        }
        Ok(())
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let sessions = self.sessions.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                ticker.tick().await;
                let pruned = sessions.prune_expired(chrono::Utc::now()).await;
                if pruned > 0 {
                    tracing::debug!(target: "circulation-authz", pruned, "expired sessions removed");
                }
            }
        });
        *self.pruner.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.pruner.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}
