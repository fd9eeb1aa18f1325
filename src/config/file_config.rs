use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub logging_level: Option<String>,
    pub stdio: Option<bool>,

    // Sections
    pub backend: Option<BackendConfig>,
    pub catalog: Option<CatalogConfig>,
    pub session: Option<SessionConfig>,
}

/// `[backend]`: process-level fallback context and client tuning.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub tenant_id: Option<String>,
    pub require_api_key: Option<bool>,
    pub auth_header: Option<String>,
    pub api_prefix: Option<String>,
    pub health_path: Option<String>,
    pub version_probe_path: Option<String>,
    pub max_in_flight: Option<usize>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

/// `[catalog]`
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file imported into the catalog at startup.
    pub import_file: Option<String>,
    pub read_only: Option<bool>,
    /// Refreshes touching fewer entries than this patch the index in place.
    pub incremental_threshold: Option<usize>,
}

/// `[session]`
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub reap_interval_secs: Option<u64>,
    pub snapshot_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
