use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use capability_bridge::backend::BackendClient;
use capability_bridge::bridge::Bridge;
use capability_bridge::catalog::{import_catalog_file, Catalog, SqliteCatalogStore};
use capability_bridge::config::{AppConfig, CliConfig, FileConfig};
use capability_bridge::context::ContextResolver;
use capability_bridge::server::{self, run_server, run_stdio, RequestsLoggingLevel, ServerConfig};
use capability_bridge::session::{read_snapshot, write_snapshot};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "MCP bridge between AI agents, a node catalog and a workflow backend")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding catalog.db. Without it the catalog is kept in memory.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The address to bind to.
    #[clap(long, default_value = "127.0.0.1")]
    pub bind_address: String,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Serve line-delimited JSON-RPC on stdin/stdout instead of HTTP.
    #[clap(long)]
    pub stdio: bool,

    /// Fallback backend base URL.
    #[clap(long, env = "BRIDGE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Fallback backend API key.
    #[clap(long, env = "BRIDGE_BACKEND_API_KEY", hide_env_values = true)]
    pub backend_api_key: Option<String>,

    /// Fallback per-call deadline in milliseconds.
    #[clap(long, env = "BRIDGE_BACKEND_TIMEOUT_MS")]
    pub backend_timeout_ms: Option<u64>,

    /// Fallback retry budget for backend calls.
    #[clap(long, env = "BRIDGE_BACKEND_MAX_RETRIES")]
    pub backend_max_retries: Option<u32>,

    #[clap(long, env = "BRIDGE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// JSON catalog file to import at startup.
    #[clap(long, value_parser = parse_path)]
    pub catalog_file: Option<PathBuf>,

    /// Open catalog.db read-only.
    #[clap(long)]
    pub read_only_catalog: bool,

    /// Where the session is saved on shutdown and restored from on start.
    #[clap(long, value_parser = parse_path)]
    pub snapshot_path: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            bind_address: self.bind_address.clone(),
            logging_level: self.logging_level.clone(),
            stdio: self.stdio,
            backend_url: self.backend_url.clone(),
            backend_api_key: self.backend_api_key.clone(),
            backend_timeout_ms: self.backend_timeout_ms,
            backend_max_retries: self.backend_max_retries,
            tenant_id: self.tenant_id.clone(),
            catalog_file: self.catalog_file.clone(),
            read_only_catalog: self.read_only_catalog,
            snapshot_path: self.snapshot_path.clone(),
        }
    }
}

fn open_catalog(config: &AppConfig) -> Result<Catalog> {
    let threshold = config.catalog.incremental_threshold;
    let catalog = match config.catalog_db_path() {
        Some(db_path) => {
            info!("Opening SQLite catalog database at {:?}...", db_path);
            let store = if config.catalog.read_only {
                SqliteCatalogStore::open_read_only(&db_path)?
            } else {
                SqliteCatalogStore::open(&db_path)?
            };
            Catalog::with_store(threshold, store)?
        }
        None => {
            info!("No database directory configured, catalog kept in memory");
            Catalog::new(threshold)
        }
    };

    if let Some(import_file) = &config.catalog.import_file {
        let report = import_catalog_file(&catalog, import_file)?;
        info!(
            "Imported catalog: nodes +{}/~{}/-{}, templates +{}/~{}/-{}, {} rejected, persisted: {}",
            report.nodes.added,
            report.nodes.updated,
            report.nodes.removed,
            report.templates.added,
            report.templates.updated,
            report.templates.removed,
            report.nodes.errors.len() + report.templates.errors.len(),
            report.persisted
        );
    }

    let (nodes, templates) = catalog.counts();
    info!("Catalog ready: {} nodes, {} templates", nodes, templates);
    Ok(catalog)
}

fn restore_session(bridge: &Bridge, snapshot_path: &Path) {
    match read_snapshot(snapshot_path) {
        Ok(None) => {}
        Ok(Some(snapshot)) => match bridge.sessions().restore_state(snapshot, bridge.resolver()) {
            Ok(info) => {
                info!("Restored session {} from {:?}", info.id, snapshot_path);
                if let Err(e) = std::fs::remove_file(snapshot_path) {
                    warn!("Failed to remove consumed snapshot {:?}: {}", snapshot_path, e);
                }
            }
            Err(e) => warn!("Not restoring session from {:?}: {}", snapshot_path, e),
        },
        Err(e) => warn!("{:#}", e),
    }
}

/// Save the session for the next start, then drain and close it.
async fn shutdown_session(bridge: &Bridge, snapshot_path: Option<&Path>) {
    let snapshot = snapshot_path.and_then(|_| bridge.sessions().export_state().ok());

    if bridge.sessions().is_bound() {
        match bridge.close_session(None).await {
            Ok(outcome) if !outcome.drained => warn!(
                "Session {} closed with {} calls still running",
                outcome.session_id, outcome.abandoned_calls
            ),
            Ok(outcome) => info!("Session {} drained", outcome.session_id),
            Err(e) => warn!("Failed to close session: {}", e),
        }
    }

    if let (Some(path), Some(snapshot)) = (snapshot_path, snapshot) {
        match write_snapshot(path, &snapshot) {
            Ok(()) => info!("Session {} saved to {:?}", snapshot.session_id, path),
            Err(e) => error!("Failed to save session: {:#}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Logs go to stderr so that stdio mode keeps stdout for frames.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let catalog = Arc::new(open_catalog(&config)?);
    let backend = Arc::new(BackendClient::new(config.backend.clone())?);
    let resolver = ContextResolver::new(
        config.fallback_context.clone(),
        config.context_defaults.clone(),
    );
    let bridge = Arc::new(Bridge::new(
        catalog,
        backend,
        resolver,
        config.session.clone(),
    )?);

    if let Some(path) = &config.snapshot_path {
        restore_session(&bridge, path);
    }

    let shutdown = CancellationToken::new();
    let reaper = bridge.sessions().spawn_reaper(shutdown.clone());

    let mut server = None;
    if config.stdio {
        tokio::select! {
            result = run_stdio(bridge.clone()) => result?,
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
    } else {
        let server_config = ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
            bind_address: config.bind_address.clone(),
        };
        let mut handle = tokio::spawn(run_server(server_config, bridge.clone(), shutdown.clone()));

        tokio::select! {
            joined = &mut handle => {
                // The server only stops on its own when it fails.
                joined.context("HTTP server task panicked")??;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutting down...");
                server = Some(handle);
            }
        }
    }

    shutdown.cancel();
    shutdown_session(&bridge, config.snapshot_path.as_deref()).await;
    if let Some(handle) = server {
        handle.await.context("HTTP server task panicked")??;
    }
    if let Err(e) = reaper.await {
        warn!("Session reaper failed: {}", e);
    }
    info!("Bye");
    Ok(())
}
