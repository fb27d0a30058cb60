use anyhow::{Context, Result};
use metrix_agent::config::AgentConfig;
use metrix_agent::delivery::DeliveryClient;
use metrix_agent::scheduler::ReportScheduler;
use metrix_agent::transport::{outbound_ip, GrpcTransport, HttpTransport, Transport};
use metrix_collector::{default_collectors, Sampler};
use metrix_common::crypto::PayloadEncryptor;
use metrix_common::retry::RetryPolicy;
use metrix_common::signing::Signer;
use metrix_common::MetricStore;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

async fn build_transport(config: &AgentConfig) -> Result<Arc<dyn Transport>> {
    if let Some(endpoint) = config.grpc_endpoint() {
        let real_ip = outbound_ip(&endpoint).await;
        let transport = GrpcTransport::new(&endpoint, config.request_timeout())
            .with_context(|| format!("invalid gRPC endpoint {endpoint}"))?
            .with_real_ip(real_ip);
        tracing::info!(endpoint = %endpoint, "Delivering over gRPC");
        return Ok(Arc::new(transport));
    }

    let url = config.update_url();
    let real_ip = outbound_ip(&config.address).await;
    let transport = HttpTransport::new(url.clone(), config.request_timeout())
        .context("failed to build HTTP client")?
        .with_real_ip(real_ip);
    tracing::info!(url = %url, "Delivering over HTTP");
    Ok(Arc::new(transport))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metrix=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        address = %config.address,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        "metrix-agent starting"
    );

    let signer = Signer::from_key(config.key.as_deref()).context("invalid signing key")?;
    let encryptor = config
        .crypto_key
        .as_deref()
        .map(PayloadEncryptor::from_file)
        .transpose()
        .context("failed to load crypto public key")?;

    let store = Arc::new(MetricStore::new());
    let client = DeliveryClient::new(build_transport(&config).await?)
        .with_signer(signer)
        .with_encryptor(encryptor)
        .with_retry(RetryPolicy::new(config.max_attempts, RetryPolicy::delivery_delays()));

    let cancel = CancellationToken::new();
    let sampler = Sampler::new(Arc::clone(&store), default_collectors(), config.poll_interval());
    let scheduler = ReportScheduler::new(
        Arc::clone(&store),
        Arc::new(client),
        config.rate_limit,
        config.report_interval(),
        cancel.clone(),
    );

    let sampling = tokio::spawn(sampler.run(cancel.clone()));
    let reporting = tokio::spawn(async move { scheduler.run().await });

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("Shutting down gracefully");
    cancel.cancel();

    let _ = sampling.await;
    let _ = reporting.await;
    Ok(())
}
