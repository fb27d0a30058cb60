use crate::ingest::IngestPipeline;
use crate::middleware::{TrustedSubnet, REAL_IP_HEADER};
use metrix_common::proto::metrics_server::Metrics;
use metrix_common::proto::{MetricPayload, SaveMetricResponse, HASH_METADATA_KEY};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// `metrix.Metrics` service. Runs the same pipeline as `POST /update/`.
pub struct MetricsService {
    pipeline: Arc<IngestPipeline>,
    trusted_subnet: Option<Arc<TrustedSubnet>>,
}

impl MetricsService {
    pub fn new(pipeline: Arc<IngestPipeline>, trusted_subnet: Option<Arc<TrustedSubnet>>) -> Self {
        Self {
            pipeline,
            trusted_subnet,
        }
    }
}

#[tonic::async_trait]
impl Metrics for MetricsService {
    async fn save_metric(
        &self,
        request: Request<MetricPayload>,
    ) -> Result<Response<SaveMetricResponse>, Status> {
        let metadata = request.metadata();
        if let Some(subnet) = &self.trusted_subnet {
            let real_ip = metadata.get(REAL_IP_HEADER).and_then(|v| v.to_str().ok());
            if !subnet.allows(real_ip) {
                tracing::warn!(real_ip = real_ip.unwrap_or("-"), "gRPC request rejected: address outside trusted subnet");
                return Err(Status::permission_denied("address outside trusted subnet"));
            }
        }
        let signature = metadata
            .get(HASH_METADATA_KEY)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let payload = request.into_inner();
        let metric = self
            .pipeline
            .ingest_one(&payload.body, signature.as_deref())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "gRPC ingest refused");
                Status::from(e)
            })?;

        let result_json = serde_json::to_vec(&metric)
            .map_err(|e| Status::internal(format!("cannot encode result: {e}")))?;
        Ok(Response::new(SaveMetricResponse { result_json }))
    }
}
