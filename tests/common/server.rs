//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated bridge with its own catalog database.

use super::constants::*;
use super::fixtures::create_test_catalog;
use capability_bridge::backend::{BackendClient, BackendSettings};
use capability_bridge::catalog::{
    import_catalog_file, Catalog, SqliteCatalogStore, DEFAULT_INCREMENTAL_THRESHOLD,
};
use capability_bridge::context::{ApiKey, ContextDefaults, ContextResolver, FallbackContext};
use capability_bridge::server::metrics;
use capability_bridge::session::SessionSettings;
use capability_bridge::{make_app, Bridge, RequestsLoggingLevel, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated catalog
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// The bridge behind the server, for direct state checks in tests
    pub bridge: Arc<Bridge>,

    // Private fields - keep resources alive until drop
    _temp_catalog_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a catalog-only test server on a random port
    pub async fn spawn() -> Self {
        Self::spawn_with_backend(None).await
    }

    /// Spawns a test server whose fallback context points at `backend_url`
    ///
    /// This function:
    /// 1. Writes the fixture catalog and imports it into a temporary SQLite store
    /// 2. Builds the backend client with short retry delays
    /// 3. Binds to a random port (127.0.0.1:0)
    /// 4. Spawns the server in a background task
    /// 5. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if any of the above fails.
    pub async fn spawn_with_backend(backend_url: Option<&str>) -> Self {
        let (temp_catalog_dir, catalog_file, db_path) =
            create_test_catalog().expect("Failed to create test catalog");

        let store = SqliteCatalogStore::open(&db_path).expect("Failed to open catalog store");
        let catalog = Catalog::with_store(DEFAULT_INCREMENTAL_THRESHOLD, store)
            .expect("Failed to load catalog");
        import_catalog_file(&catalog, &catalog_file).expect("Failed to import test catalog");

        let backend = BackendClient::new(BackendSettings {
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 50,
            ..BackendSettings::default()
        })
        .expect("Failed to build backend client");

        let resolver = ContextResolver::new(
            FallbackContext {
                backend_base_url: backend_url.map(str::to_string),
                backend_api_key: Some(ApiKey::new(TEST_API_KEY)),
                timeout_ms: Some(5_000),
                max_retries: Some(3),
                ..FallbackContext::default()
            },
            ContextDefaults::default(),
        );

        let bridge = Arc::new(
            Bridge::new(
                Arc::new(catalog),
                Arc::new(backend),
                resolver,
                SessionSettings::default(),
            )
            .expect("Failed to build bridge"),
        );

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            bind_address: "127.0.0.1".to_string(),
        };
        metrics::init_metrics();
        let app = make_app(config, bridge.clone());

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            bridge,
            _temp_catalog_dir: temp_catalog_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the /health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir is cleaned up automatically
    }
}
