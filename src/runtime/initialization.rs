//! # Initialization
//!
//! Controller start-up: rustls setup, tracing, metrics, the probe server,
//! the Kubernetes client and the backing store behind the creator.

use crate::aws;
use crate::config::Settings;
use crate::controller::Creator;
use crate::generator::RandomGenerator;
use crate::observability;
use crate::server::{start_server, ServerState};
use crate::storage::{DynamoDbStorageProvider, InMemoryStorageProvider, StorageProvider};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{api::Api, Client};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs.
pub struct InitializationResult {
    /// Pods in every namespace
    pub pods: Api<Pod>,
    /// Event handler shared by the watch tasks
    pub creator: Arc<Creator>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub settings: Settings,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Install ring as the rustls crypto provider.
///
/// Must run before anything opens a TLS connection. A provider installed
/// earlier is kept.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed, keeping it");
    }
}

/// Set up the `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secret_lease_controller=info".into()),
        )
        .try_init()
    {
        warn!("Tracing subscriber init returned error: {}", e);
    }
}

pub fn log_build_info(component: &str) {
    info!("Starting {}", component);
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Backing store and creator setup
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn initialize() -> Result<InitializationResult> {
    install_crypto_provider();
    init_tracing();
    log_build_info("secret lease controller");

    let settings = Settings::from_env();
    info!(?settings, "Loaded configuration");

    observability::metrics::register_metrics()?;

    // Readiness flips to true once the watch loop starts.
    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = settings.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let pods: Api<Pod> = Api::all(client);

    let store = build_store(&settings).await?;
    let creator = Arc::new(Creator::new(
        settings.annotation_domain.clone(),
        store,
        Arc::new(RandomGenerator),
        settings.dedup_cache_ttl(),
    ));

    info!(
        domain = %settings.annotation_domain,
        max_concurrent_events = settings.max_concurrent_events,
        "Controller initialized, starting watch loop..."
    );

    Ok(InitializationResult {
        pods,
        creator,
        server_state,
        settings,
    })
}

/// Backing store for the creator: DynamoDB, or in-memory with `LOCAL_STORE`.
async fn build_store(settings: &Settings) -> Result<Arc<dyn StorageProvider>> {
    if settings.local_store {
        warn!("LOCAL_STORE is set, values live only in this process");
        return Ok(Arc::new(InMemoryStorageProvider::new()));
    }

    let env_label = settings.require_env_label()?;
    let sdk_config = aws::load_sdk_config(settings).await;
    let store =
        DynamoDbStorageProvider::new(&sdk_config, env_label, settings.aws_endpoint.as_deref());
    info!(table = store.table(), "Using DynamoDB backing store");
    Ok(Arc::new(store))
}
