use crate::ingest::IngestPipeline;
use crate::middleware::TrustedSubnet;
use metrix_common::MetricStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub trusted_subnet: Option<Arc<TrustedSubnet>>,
}

impl AppState {
    pub fn new(pipeline: IngestPipeline, trusted_subnet: Option<TrustedSubnet>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            trusted_subnet: trusted_subnet.map(Arc::new),
        }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        self.pipeline.store()
    }
}
