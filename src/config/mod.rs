mod file_config;

pub use file_config::{BackendConfig, CatalogConfig, FileConfig, SessionConfig};

use crate::backend::BackendSettings;
use crate::catalog::DEFAULT_INCREMENTAL_THRESHOLD;
use crate::context::{ApiKey, ContextDefaults, FallbackContext};
use crate::server::RequestsLoggingLevel;
use crate::session::SessionSettings;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub bind_address: String,
    pub logging_level: RequestsLoggingLevel,
    pub stdio: bool,
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub backend_timeout_ms: Option<u64>,
    pub backend_max_retries: Option<u32>,
    pub tenant_id: Option<String>,
    pub catalog_file: Option<PathBuf>,
    pub read_only_catalog: bool,
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    /// Directory holding `catalog.db`. Without it the catalog lives in memory.
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub bind_address: String,
    pub logging_level: RequestsLoggingLevel,
    pub stdio: bool,

    // Context layers
    pub fallback_context: FallbackContext,
    pub context_defaults: ContextDefaults,

    // Feature configs (with defaults)
    pub backend: BackendSettings,
    pub catalog: CatalogSettings,
    pub session: SessionSettings,
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub import_file: Option<PathBuf>,
    pub read_only: bool,
    pub incremental_threshold: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            import_file: None,
            read_only: false,
            incremental_threshold: DEFAULT_INCREMENTAL_THRESHOLD,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file.db_dir.map(PathBuf::from).or_else(|| cli.db_dir.clone());
        if let Some(dir) = &db_dir {
            if !dir.exists() {
                bail!("Database directory does not exist: {:?}", dir);
            }
            if !dir.is_dir() {
                bail!("db_dir is not a directory: {:?}", dir);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let bind_address = file
            .bind_address
            .unwrap_or_else(|| cli.bind_address.clone());
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let stdio = file.stdio.unwrap_or(cli.stdio);

        // Backend: fallback context plus client settings
        let backend_file = file.backend.unwrap_or_default();
        let fallback_context = FallbackContext {
            backend_base_url: backend_file
                .base_url
                .clone()
                .or_else(|| cli.backend_url.clone()),
            backend_api_key: backend_file
                .api_key
                .clone()
                .or_else(|| cli.backend_api_key.clone())
                .filter(|k| !k.trim().is_empty())
                .map(ApiKey::new),
            timeout_ms: backend_file.timeout_ms.or(cli.backend_timeout_ms),
            max_retries: backend_file.max_retries.or(cli.backend_max_retries),
            tenant_id: backend_file
                .tenant_id
                .clone()
                .or_else(|| cli.tenant_id.clone()),
            metadata: Default::default(),
        };
        if fallback_context.timeout_ms == Some(0) {
            bail!("Backend timeout must be greater than zero");
        }

        let default_defaults = ContextDefaults::default();
        let context_defaults = ContextDefaults {
            require_api_key: backend_file
                .require_api_key
                .unwrap_or(default_defaults.require_api_key),
            ..default_defaults
        };

        let default_backend = BackendSettings::default();
        let backend = BackendSettings {
            auth_header: backend_file
                .auth_header
                .unwrap_or(default_backend.auth_header),
            api_prefix: backend_file.api_prefix.unwrap_or(default_backend.api_prefix),
            health_path: backend_file
                .health_path
                .unwrap_or(default_backend.health_path),
            version_probe_path: backend_file
                .version_probe_path
                .unwrap_or(default_backend.version_probe_path),
            max_in_flight: backend_file
                .max_in_flight
                .unwrap_or(default_backend.max_in_flight),
            retry_base_delay_ms: backend_file
                .retry_base_delay_ms
                .unwrap_or(default_backend.retry_base_delay_ms),
            retry_max_delay_ms: backend_file
                .retry_max_delay_ms
                .unwrap_or(default_backend.retry_max_delay_ms),
            connect_timeout_ms: backend_file
                .connect_timeout_ms
                .unwrap_or(default_backend.connect_timeout_ms),
            ..default_backend
        };
        if backend.max_in_flight == 0 {
            bail!("backend.max_in_flight must be at least 1");
        }

        // Catalog
        let catalog_file = file.catalog.unwrap_or_default();
        let catalog = CatalogSettings {
            import_file: catalog_file
                .import_file
                .map(PathBuf::from)
                .or_else(|| cli.catalog_file.clone()),
            read_only: catalog_file.read_only.unwrap_or(cli.read_only_catalog),
            incremental_threshold: catalog_file
                .incremental_threshold
                .unwrap_or(DEFAULT_INCREMENTAL_THRESHOLD),
        };
        if catalog.read_only && catalog.import_file.is_some() {
            bail!("A read-only catalog cannot import a catalog file");
        }

        // Session
        let session_file = file.session.unwrap_or_default();
        let default_session = SessionSettings::default();
        let session = SessionSettings {
            idle_timeout_secs: session_file
                .idle_timeout_secs
                .unwrap_or(default_session.idle_timeout_secs),
            drain_timeout_ms: session_file
                .drain_timeout_ms
                .unwrap_or(default_session.drain_timeout_ms),
            reap_interval_secs: session_file
                .reap_interval_secs
                .unwrap_or(default_session.reap_interval_secs),
        };
        let snapshot_path = session_file
            .snapshot_path
            .map(PathBuf::from)
            .or_else(|| cli.snapshot_path.clone());

        Ok(Self {
            db_dir,
            port,
            bind_address,
            logging_level,
            stdio,
            fallback_context,
            context_defaults,
            backend,
            catalog,
            session,
            snapshot_path,
        })
    }

    pub fn catalog_db_path(&self) -> Option<PathBuf> {
        self.db_dir.as_ref().map(|dir| dir.join("catalog.db"))
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
