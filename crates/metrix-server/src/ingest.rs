//! Verify, decrypt, parse and merge: the ingest path shared by HTTP and gRPC.

use axum::http::StatusCode;
use metrix_common::crypto::{CryptoError, PayloadDecryptor};
use metrix_common::signing::{Signer, SigningError};
use metrix_common::{Metric, MetricError, MetricRequest, MetricStore};
use metrix_storage::manager::PersistenceManager;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Ingest: integrity check failed: {0}")]
    Integrity(#[from] SigningError),

    #[error("Ingest: cannot decrypt payload: {0}")]
    Decryption(#[from] CryptoError),

    #[error("Ingest: malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Ingest: {0}")]
    Metric(#[from] MetricError),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::Integrity(_) | IngestError::Decryption(_) | IngestError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Metric(MetricError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            IngestError::Metric(MetricError::NotImplemented(_)) => StatusCode::NOT_IMPLEMENTED,
            IngestError::Metric(MetricError::NotFound(_)) => StatusCode::NOT_FOUND,
        }
    }

    pub fn grpc_code(&self) -> tonic::Code {
        match self.status() {
            StatusCode::NOT_IMPLEMENTED => tonic::Code::Unimplemented,
            StatusCode::NOT_FOUND => tonic::Code::NotFound,
            StatusCode::BAD_REQUEST => tonic::Code::InvalidArgument,
            _ => tonic::Code::Internal,
        }
    }
}

impl From<IngestError> for tonic::Status {
    fn from(err: IngestError) -> Self {
        tonic::Status::new(err.grpc_code(), err.to_string())
    }
}

pub struct IngestPipeline {
    store: Arc<MetricStore>,
    signer: Option<Signer>,
    decryptor: Option<PayloadDecryptor>,
    persistence: Option<PersistenceManager>,
}

impl IngestPipeline {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self {
            store,
            signer: None,
            decryptor: None,
            persistence: None,
        }
    }

    pub fn with_signer(mut self, signer: Option<Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_decryptor(mut self, decryptor: Option<PayloadDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_persistence(mut self, persistence: Option<PersistenceManager>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn persistence(&self) -> Option<&PersistenceManager> {
        self.persistence.as_ref()
    }

    /// Checked only when both a key and a signature are present.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), IngestError> {
        match (&self.signer, signature) {
            (Some(signer), Some(sig)) if !sig.is_empty() => Ok(signer.verify(body, sig)?),
            _ => Ok(()),
        }
    }

    /// Verify the received bytes, then decrypt them when a private key is set.
    pub fn open(&self, body: &[u8], signature: Option<&str>) -> Result<Vec<u8>, IngestError> {
        self.verify(body, signature)?;
        match &self.decryptor {
            Some(dec) => Ok(dec.decrypt(body)?),
            None => Ok(body.to_vec()),
        }
    }

    async fn committed(&self) {
        if let Some(p) = &self.persistence {
            p.after_ingest().await;
        }
    }

    /// One `{id, type, delta?, value?}` record.
    pub async fn ingest_one(&self, body: &[u8], signature: Option<&str>) -> Result<Metric, IngestError> {
        let plain = self.open(body, signature)?;
        let request: MetricRequest = serde_json::from_slice(&plain)?;
        let metric = self.store.apply(&request)?;
        tracing::debug!(metric = metric.id(), value = metric.text_value(), "Metric ingested");
        self.committed().await;
        Ok(metric)
    }

    /// An array of records, applied in order. The first failure aborts the
    /// rest; entries before it stay committed.
    pub async fn ingest_batch(&self, body: &[u8], signature: Option<&str>) -> Result<Vec<Metric>, IngestError> {
        let plain = self.open(body, signature)?;
        let requests: Vec<MetricRequest> = serde_json::from_slice(&plain)?;

        let mut applied = Vec::with_capacity(requests.len());
        let mut outcome = Ok(());
        for request in &requests {
            match self.store.apply(request) {
                Ok(metric) => applied.push(metric),
                Err(e) => {
                    tracing::warn!(metric = %request.id, applied = applied.len(), error = %e, "Batch aborted");
                    outcome = Err(e);
                    break;
                }
            }
        }
        if !applied.is_empty() {
            self.committed().await;
        }
        outcome?;
        Ok(applied)
    }

    /// Plain-text path: `/update/{type}/{name}/{value}`.
    pub async fn ingest_raw(&self, kind: &str, id: &str, value: &str) -> Result<Metric, IngestError> {
        let metric = self.store.collect(id, kind, value)?;
        self.committed().await;
        Ok(metric)
    }

    /// Retrieval by `{id, type}`, echoed in the wire shape.
    pub fn lookup(&self, body: &[u8], signature: Option<&str>) -> Result<MetricRequest, IngestError> {
        self.verify(body, signature)?;
        let query: MetricRequest = serde_json::from_slice(body)?;
        let metric = self.store.get_typed(&query.id, &query.kind)?;
        Ok(MetricRequest::from(&metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrix_common::crypto::PayloadEncryptor;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(Arc::new(MetricStore::new()))
    }

    #[tokio::test]
    async fn single_update_merges_into_store() {
        let p = pipeline();
        p.ingest_one(br#"{"id":"Req","type":"counter","delta":5}"#, None).await.unwrap();
        let m = p.ingest_one(br#"{"id":"Req","type":"counter","delta":10}"#, None).await.unwrap();
        assert_eq!(m.counter_value(), Some(15));
    }

    #[tokio::test]
    async fn signature_checked_only_when_both_sides_have_it() {
        let signer = Signer::new("k").unwrap();
        let p = pipeline().with_signer(Some(signer.clone()));
        let body = br#"{"id":"T","type":"gauge","value":1.5}"#;

        p.ingest_one(body, None).await.unwrap();
        p.ingest_one(body, Some(&signer.sign(body))).await.unwrap();
        let err = p.ingest_one(body, Some(&Signer::new("other").unwrap().sign(body))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // no server key: any header is ignored
        pipeline().ingest_one(body, Some("deadbeef")).await.unwrap();
    }

    #[tokio::test]
    async fn encrypted_payload_is_decrypted() {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let enc = PayloadEncryptor::from_pem(
            &RsaPublicKey::from(&private).to_public_key_pem(LineEnding::LF).unwrap(),
        )
        .unwrap();
        let dec = PayloadDecryptor::from_pem(&private.to_pkcs8_pem(LineEnding::LF).unwrap()).unwrap();
        let p = pipeline().with_decryptor(Some(dec));

        let cipher = enc.encrypt(br#"{"id":"Alloc","type":"gauge","value":2.75}"#).unwrap();
        let m = p.ingest_one(&cipher, None).await.unwrap();
        assert_eq!(m.gauge_value(), Some(2.75));

        let err = p.ingest_one(br#"{"id":"x"}"#, None).await.unwrap_err();
        assert!(matches!(err, IngestError::Decryption(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn batch_keeps_entries_before_the_failure() {
        let p = pipeline();
        let body = br#"[
            {"id":"a","type":"counter","delta":1},
            {"id":"b","type":"histogram","value":1.0},
            {"id":"c","type":"gauge","value":3.0}
        ]"#;
        let err = p.ingest_batch(body, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(p.store().list(), vec!["a"]);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let err = pipeline().ingest_one(b"{not json", None).await.unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
        assert_eq!(err.grpc_code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn lookup_maps_missing_and_unknown() {
        let p = pipeline();
        p.ingest_raw("gauge", "Temp", "1.25").await.unwrap();

        let found = p.lookup(br#"{"id":"Temp","type":"gauge"}"#, None).unwrap();
        assert_eq!(found.value, Some(1.25));

        let err = p.lookup(br#"{"id":"Temp","type":"counter"}"#, None).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = p.lookup(br#"{"id":"Temp","type":"summary"}"#, None).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
