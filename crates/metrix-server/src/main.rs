use anyhow::{Context, Result};
use metrix_common::crypto::PayloadDecryptor;
use metrix_common::proto::metrics_server::MetricsServer;
use metrix_common::signing::Signer;
use metrix_common::MetricStore;
use metrix_server::app::build_http_app;
use metrix_server::config::ServerConfig;
use metrix_server::grpc::MetricsService;
use metrix_server::ingest::IngestPipeline;
use metrix_server::middleware::TrustedSubnet;
use metrix_server::state::AppState;
use metrix_storage::manager::PersistenceManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metrix=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    let signer = Signer::from_key(config.key.as_deref()).context("invalid signing key")?;
    let decryptor = config
        .crypto_key
        .as_deref()
        .map(PayloadDecryptor::from_file)
        .transpose()
        .context("failed to load crypto private key")?;
    let trusted_subnet = config
        .trusted_subnet
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<TrustedSubnet>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid trusted subnet: {e}"))?;

    let store = Arc::new(MetricStore::new());
    let backend = metrix_storage::open_backend(
        config.file_storage_path.as_deref(),
        config.database_dsn.as_deref(),
    )
    .context("failed to open snapshot storage")?;
    let persistence = backend.map(|b| {
        PersistenceManager::new(b, Arc::clone(&store), config.store_interval())
    });

    // Restore must finish before any request is accepted.
    if let Some(p) = &persistence {
        if config.restore {
            if let Err(e) = p.restore_into().await {
                tracing::error!(backend = p.backend_name(), error = %e, "Restore failed, starting empty");
            }
        }
    } else {
        tracing::info!("Persistence disabled");
    }

    let pipeline = IngestPipeline::new(Arc::clone(&store))
        .with_signer(signer)
        .with_decryptor(decryptor)
        .with_persistence(persistence.clone());
    let state = AppState::new(pipeline, trusted_subnet);
    let cancel = CancellationToken::new();

    let persistence_handle = persistence.map(|p| {
        let cancel = cancel.clone();
        tokio::spawn(async move { p.run(cancel).await })
    });

    let grpc_handle = match config.grpc_address.as_deref().filter(|a| !a.is_empty()) {
        Some(addr) => {
            let grpc_addr: SocketAddr = lookup_host(addr)
                .await
                .with_context(|| format!("cannot resolve gRPC address {addr}"))?
                .next()
                .with_context(|| format!("no address for {addr}"))?;
            let service = MetricsServer::new(MetricsService::new(
                Arc::clone(&state.pipeline),
                state.trusted_subnet.clone(),
            ));
            let shutdown = cancel.clone();
            tracing::info!(grpc = %grpc_addr, "gRPC ingest enabled");
            Some(tokio::spawn(async move {
                if let Err(e) = TonicServer::builder()
                    .add_service(service)
                    .serve_with_shutdown(grpc_addr, shutdown.cancelled_owned())
                    .await
                {
                    tracing::error!(error = %e, "gRPC server error");
                }
            }))
        }
        None => None,
    };

    let app = build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    tracing::info!(http = %config.address, "metrix-server started");

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down gracefully");
            }
            cancel.cancel();
        });
    }

    if let Err(e) = axum::serve(http_listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }
    cancel.cancel();

    if let Some(h) = grpc_handle {
        let _ = h.await;
    }
    if let Some(h) = persistence_handle {
        let _ = h.await;
    }
    tracing::info!("Server stopped");

    Ok(())
}
