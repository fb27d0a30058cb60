//! Wire transports for encoded metric payloads.

use crate::delivery::{DeliveryError, Payload};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use metrix_common::proto::metrics_client::MetricsClient;
use metrix_common::proto::{MetricPayload, HASH_METADATA_KEY};
use metrix_common::signing::HASH_HEADER;
use std::io::Write;
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};

/// Header naming the agent's outbound address for trusted-subnet checks.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Moves one already-encoded payload to the server.
///
/// Implementations map receiver refusals to [`DeliveryError::Rejected`] and
/// everything worth retrying to [`DeliveryError::Network`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs (e.g., `"http"`, `"grpc"`).
    fn name(&self) -> &str;

    async fn send(&self, payload: &Payload) -> Result<(), DeliveryError>;
}

/// Statuses that say the payload itself is unacceptable. Retrying the same
/// bytes cannot succeed.
pub fn is_rejection(status: u16) -> bool {
    (400..500).contains(&status) || status == 501
}

/// Local address the OS would use to reach `target` (`host:port`).
/// No packet is sent.
pub async fn outbound_ip(target: &str) -> Option<String> {
    let authority = target
        .split("://")
        .last()
        .unwrap_or(target)
        .split('/')
        .next()
        .unwrap_or_default();
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(authority).await.ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

fn gzip(body: &[u8]) -> Result<Vec<u8>, DeliveryError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2 + 32), Compression::default());
    encoder
        .write_all(body)
        .map_err(|e| DeliveryError::Serialization(format!("gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| DeliveryError::Serialization(format!("gzip: {e}")))
}

/// `POST {address}/update/` with a gzip body.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    real_ip: Option<String>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            real_ip: None,
        })
    }

    pub fn with_real_ip(mut self, ip: Option<String>) -> Self {
        self.real_ip = ip;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let content_type = if payload.encrypted {
            "application/octet-stream"
        } else {
            "application/json"
        };
        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .header(reqwest::header::ACCEPT_ENCODING, "gzip")
            .body(gzip(&payload.body)?);
        if let Some(sig) = &payload.signature {
            req = req.header(HASH_HEADER, sig);
        }
        if let Some(ip) = &self.real_ip {
            req = req.header(REAL_IP_HEADER, ip);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        if resp.status().is_success() {
            Ok(())
        } else if is_rejection(status) {
            Err(DeliveryError::Rejected { status })
        } else {
            Err(DeliveryError::Network(format!("server answered {status}")))
        }
    }
}

/// `metrix.Metrics/SaveMetric` over a lazily connected channel.
pub struct GrpcTransport {
    client: MetricsClient<Channel>,
    real_ip: Option<String>,
}

impl GrpcTransport {
    /// The channel connects on first use, so an unreachable server surfaces
    /// as a retryable send failure rather than a startup error.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(endpoint.to_string())?
            .timeout(timeout)
            .connect_lazy();
        Ok(Self {
            client: MetricsClient::new(channel),
            real_ip: None,
        })
    }

    pub fn with_real_ip(mut self, ip: Option<String>) -> Self {
        self.real_ip = ip;
        self
    }
}

/// HTTP equivalent of a gRPC status code, for [`DeliveryError::Rejected`].
fn grpc_status_to_http(code: tonic::Code) -> u16 {
    use tonic::Code;
    match code {
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => 400,
        Code::Unauthenticated => 401,
        Code::PermissionDenied => 403,
        Code::NotFound => 404,
        Code::AlreadyExists | Code::Aborted => 409,
        Code::ResourceExhausted => 429,
        Code::Unimplemented => 501,
        Code::Unavailable => 503,
        Code::DeadlineExceeded => 504,
        _ => 500,
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &str {
        "grpc"
    }

    async fn send(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let mut request = tonic::Request::new(MetricPayload {
            body: payload.body.clone(),
        });
        if let Some(sig) = &payload.signature {
            let value = MetadataValue::try_from(sig.as_str())
                .map_err(|e| DeliveryError::Serialization(format!("signature metadata: {e}")))?;
            request.metadata_mut().insert(HASH_METADATA_KEY, value);
        }
        if let Some(ip) = &self.real_ip {
            if let Ok(value) = MetadataValue::try_from(ip.as_str()) {
                request.metadata_mut().insert("x-real-ip", value);
            }
        }

        let mut client = self.client.clone();
        match client.save_metric(request).await {
            Ok(_) => Ok(()),
            Err(status) => {
                let code = grpc_status_to_http(status.code());
                if is_rejection(code) {
                    Err(DeliveryError::Rejected { status: code })
                } else {
                    Err(DeliveryError::Network(format!(
                        "{:?}: {}",
                        status.code(),
                        status.message()
                    )))
                }
            }
        }
    }
}
