use crate::transport::Transport;
use metrix_common::crypto::{CryptoError, PayloadEncryptor};
use metrix_common::retry::{RetryError, RetryPolicy};
use metrix_common::signing::Signer;
use metrix_common::{Metric, MetricRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why one metric did not reach the server.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery: cannot serialize payload: {0}")]
    Serialization(String),

    #[error("Delivery: {0}")]
    Encryption(#[from] CryptoError),

    /// Connection failures, timeouts and 5xx answers. Retried.
    #[error("Delivery: network error: {0}")]
    Network(String),

    /// The server refused the payload itself. Not retried.
    #[error("Delivery: rejected by server with status {status}")]
    Rejected { status: u16 },

    #[error("Delivery: gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("Delivery: cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Network(_))
    }
}

impl From<RetryError<DeliveryError>> for DeliveryError {
    fn from(err: RetryError<DeliveryError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => DeliveryError::Exhausted {
                attempts,
                last: last.to_string(),
            },
            RetryError::Permanent(e) => e,
            RetryError::Cancelled { attempts } => DeliveryError::Cancelled { attempts },
        }
    }
}

/// Bytes ready for a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// JSON, or its RSA ciphertext when `encrypted`.
    pub body: Vec<u8>,
    /// Hex HMAC-SHA256 over `body`.
    pub signature: Option<String>,
    pub encrypted: bool,
}

/// Encodes one metric and pushes it through a transport under a bounded
/// retry policy.
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    signer: Option<Signer>,
    encryptor: Option<PayloadEncryptor>,
    retry: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            signer: None,
            encryptor: None,
            retry: RetryPolicy::delivery(),
        }
    }

    pub fn with_signer(mut self, signer: Option<Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Option<PayloadEncryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Serialize to the ingest wire shape, encrypt if a key is configured,
    /// then sign the exact bytes that will be sent.
    pub fn encode(&self, metric: &Metric) -> Result<Payload, DeliveryError> {
        let json = serde_json::to_vec(&MetricRequest::from(metric))
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let (body, encrypted) = match &self.encryptor {
            Some(enc) => (enc.encrypt(&json)?, true),
            None => (json, false),
        };
        let signature = self.signer.as_ref().map(|s| s.sign(&body));

        Ok(Payload {
            body,
            signature,
            encrypted,
        })
    }

    /// Encode once and transmit the same payload until it is accepted, the
    /// server rejects it, the attempt ceiling is hit or `cancel` fires.
    pub async fn send(&self, metric: &Metric, cancel: &CancellationToken) -> Result<(), DeliveryError> {
        let payload = self.encode(metric)?;
        let transport = self.transport.as_ref();

        self.retry
            .run(
                cancel,
                |attempt| {
                    let payload = &payload;
                    async move {
                        let res = transport.send(payload).await;
                        if let Err(e) = &res {
                            tracing::debug!(metric = metric.id(), attempt, transport = transport.name(), error = %e, "Send attempt failed");
                        }
                        res
                    }
                },
                DeliveryError::is_retryable,
            )
            .await
            .map_err(DeliveryError::from)
    }
}
