use anyhow::Context;
use circulation_app::{app, AppState};
use circulation_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load circulation settings")?;
    circulation_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        store = ?settings.store.document_path(),
        "circulation-server bootstrap starting"
    );

    let state = AppState::new(settings.clone());
    let registry = app::build_registry(&state);
    app::boot(&registry, &state).await?;

    tracing::info!("circulation-server bootstrap complete");

    circulation_http::start_server(&registry, &settings, shutdown_signal()).await?;

    app::shutdown(&registry).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
