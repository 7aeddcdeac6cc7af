//! Tracing subscriber bootstrap shared by the server and the CLI.

use anyhow::Context;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use circulation_kernel::settings::{LogFormat, TelemetrySettings};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber writing to stdout.
///
/// Filter precedence: `telemetry.filter`, then `RUST_LOG`, then `info`.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    install(settings, std::io::stdout)
}

/// Same as [`init`] but logs go to stderr, leaving stdout to command output.
pub fn init_stderr(settings: &TelemetrySettings) -> anyhow::Result<()> {
    install(settings, std::io::stderr)
}

fn install<W>(settings: &TelemetrySettings, writer: W) -> anyhow::Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_filter(settings.filter.as_deref())?;
    let registry = Registry::default().with(filter);

    match settings.log_format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .try_init()
            .context("failed to install pretty subscriber")?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_writer(writer))
            .try_init()
            .context("failed to install json subscriber")?,
    }

    tracing::debug!(target: "circulation-telemetry", format = ?settings.log_format, "tracing initialized");
    Ok(())
}

fn build_filter(configured: Option<&str>) -> anyhow::Result<EnvFilter> {
    match configured {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter '{}'", directives)),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_wins() {
        let filter = build_filter(Some("circulation_app=debug,tower_http=warn")).unwrap();
        assert!(filter.to_string().contains("circulation_app=debug"));
    }

    #[test]
    fn malformed_filter_is_an_error() {
        assert!(build_filter(Some("circulation_app=loud")).is_err());
    }
}
