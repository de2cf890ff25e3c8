use anyhow::{Context, Result};
use around_service::config::{Config, IndexBackend, IndexConfig};
use around_service::{
    start_api_server, AppState, IngestionCoordinator, JwtIdentityResolver, MediaCategoryTable,
    MemorySearchIndex, PgSearchIndex, QueryService, RekognitionClassifier, S3MediaStore,
    SearchIndex,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Around Service"
    );

    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let index = init_index(&config.index).await?;

    let media_store = Arc::new(
        S3MediaStore::new(&config.s3)
            .await
            .context("Failed to initialize S3 media store")?,
    );

    let classifier = Arc::new(
        RekognitionClassifier::new(&config.classifier)
            .await
            .context("Failed to initialize content classifier")?,
    );

    let coordinator = IngestionCoordinator::new(
        media_store,
        classifier,
        index.clone(),
        MediaCategoryTable::default(),
    );

    let api_state = AppState {
        coordinator: Arc::new(coordinator),
        queries: Arc::new(QueryService::new(index)),
        identity: Arc::new(JwtIdentityResolver::new(&config.auth)),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    start_api_server(api_state, &config.api, shutdown).await?;

    info!("Around service stopped");

    Ok(())
}

/// Build the configured search index
async fn init_index(config: &IndexConfig) -> Result<Arc<dyn SearchIndex>> {
    match config.backend {
        IndexBackend::Postgres => {
            let index = PgSearchIndex::new(config)
                .await
                .context("Failed to initialize search index")?;

            if config.run_migrations {
                index
                    .run_migrations()
                    .await
                    .context("Failed to run database migrations")?;
            }

            Ok(Arc::new(index))
        }
        IndexBackend::Memory => {
            warn!("Using in-memory search index; records are lost on restart");
            Ok(Arc::new(MemorySearchIndex::new()))
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    shutdown.cancel();
}
