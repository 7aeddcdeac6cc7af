use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "CIRCULATION_ENV";
const CONFIG_DIR_ENV: &str = "CIRCULATION_CONFIG_DIR";
const ENV_PREFIX: &str = "CIRCULATION";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub uploads: UploadSettings,
    #[serde(default)]
    pub client: ClientSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    ///
    /// Environment variables use `CIRCULATION_<SECTION>__<KEY>`, e.g.
    /// `CIRCULATION_SERVER__PORT=9090`.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .map(|cwd| cwd.join("config"))
                .context("unable to resolve current directory")?,
        };

        let base_path = config_dir.join("base.toml");
        let environment_filename = format!("{}.toml", environment);
        let environment_path = config_dir.join(environment_filename);

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        settings.environment = parse_environment(&environment)?;

        Ok(settings)
    }
}

fn parse_environment(raw: &str) -> anyhow::Result<Environment> {
    match raw {
        "local" => Ok(Environment::Local),
        "staging" => Ok(Environment::Staging),
        "production" => Ok(Environment::Production),
        other => Err(anyhow!(
            "unsupported environment '{}'; expected local/staging/production",
            other
        )),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Where the document store keeps its snapshot.
///
/// With no `data_dir` the store lives in memory only.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "StoreSettings::default_file_name")]
    pub file_name: String,
}

impl StoreSettings {
    fn default_file_name() -> String {
        "library.json".to_string()
    }

    /// Full path of the snapshot document, if persistence is enabled.
    pub fn document_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(&self.file_name))
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: Self::default_file_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetrySettings {
    /// `EnvFilter` directives; `RUST_LOG` is used when unset.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "AuthSettings::default_admin_user_id")]
    pub admin_user_id: String,
    #[serde(default = "AuthSettings::default_admin_name")]
    pub admin_name: String,
    /// bcrypt hash of the shared admin secret. Admin login is refused when unset.
    #[serde(default)]
    pub admin_password_hash: Option<String>,
    #[serde(default = "AuthSettings::default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl AuthSettings {
    fn default_admin_user_id() -> String {
        "admin".to_string()
    }

    fn default_admin_name() -> String {
        "Librarian".to_string()
    }

    fn default_session_ttl_secs() -> u64 {
        8 * 60 * 60
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            admin_user_id: Self::default_admin_user_id(),
            admin_name: Self::default_admin_name(),
            admin_password_hash: None,
            session_ttl_secs: Self::default_session_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "UploadSettings::default_dir")]
    pub dir: PathBuf,
    #[serde(default = "UploadSettings::default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "UploadSettings::default_max_bytes")]
    pub max_bytes: usize,
}

impl UploadSettings {
    fn default_dir() -> PathBuf {
        PathBuf::from("uploads")
    }

    fn default_public_base_url() -> String {
        "http://127.0.0.1:8080".to_string()
    }

    fn default_max_bytes() -> usize {
        5 * 1024 * 1024
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            public_base_url: Self::default_public_base_url(),
            max_bytes: Self::default_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "ClientSettings::default_base_url")]
    pub base_url: String,
    #[serde(default = "ClientSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "ClientSettings::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "ClientSettings::default_fallback_dir")]
    pub fallback_dir: PathBuf,
}

impl ClientSettings {
    fn default_base_url() -> String {
        "http://127.0.0.1:8080".to_string()
    }

    fn default_timeout_ms() -> u64 {
        5000
    }

    fn default_poll_interval_secs() -> u64 {
        5
    }

    fn default_fallback_dir() -> PathBuf {
        PathBuf::from(".circulation-local")
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_ms: Self::default_timeout_ms(),
            poll_interval_secs: Self::default_poll_interval_secs(),
            fallback_dir: Self::default_fallback_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_store_is_memory_only() {
        let settings = Settings::default();
        assert!(settings.store.document_path().is_none());
    }

    #[test]
    fn document_path_joins_data_dir_and_file_name() {
        let store = StoreSettings {
            data_dir: Some(PathBuf::from("/var/lib/circulation")),
            ..StoreSettings::default()
        };
        assert_eq!(
            store.document_path(),
            Some(PathBuf::from("/var/lib/circulation/library.json"))
        );
    }

    #[test]
    fn clients_poll_every_five_seconds_by_default() {
        assert_eq!(Settings::default().client.poll_interval_secs, 5);
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!(parse_environment("qa").is_err());
        assert_eq!(parse_environment("staging").unwrap(), Environment::Staging);
    }
}
