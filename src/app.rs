//! Registry wiring shared by the server binary and the integration tests.

use std::sync::Arc;

use circulation_authz::AuthzModule;
use circulation_db::StoreModule;
use circulation_kernel::{InitCtx, ModuleRegistry};

use crate::{modules, state::AppState};

/// Core modules (`db`, `authz`) plus every resource module.
pub fn build_registry(state: &AppState) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_core(Arc::new(StoreModule::new(state.store.clone())));
    registry.register_core(Arc::new(AuthzModule::new(
        state.sessions.clone(),
        state.credential.clone(),
    )));
    modules::register_all(&mut registry, state);
    registry
}

/// Run the init and start phases of every module.
pub async fn boot(registry: &ModuleRegistry, state: &AppState) -> anyhow::Result<()> {
    let ctx = InitCtx {
        settings: &state.settings,
    };
    registry.init_core_modules(&ctx).await?;
    registry.init_custom_modules(&ctx).await?;
    registry.start_core_modules(&ctx).await?;
    registry.start_custom_modules(&ctx).await?;
    Ok(())
}

pub async fn shutdown(registry: &ModuleRegistry) -> anyhow::Result<()> {
    registry.stop_custom_modules().await?;
    registry.stop_core_modules().await?;
    Ok(())
}
