use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::IpAddr;

use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;

/// Header carrying the client's own address.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Lowercase form of the `HashSHA256` integrity header.
static HASH_HEADER_NAME: HeaderName = HeaderName::from_static("hashsha256");

/// An IPv4 or IPv6 network in CIDR form.
///
/// # Examples
///
/// ```
/// use metrix_server::middleware::TrustedSubnet;
///
/// let net: TrustedSubnet = "192.168.1.0/24".parse().unwrap();
/// assert!(net.contains(&"192.168.1.77".parse().unwrap()));
/// assert!(!net.contains(&"192.168.2.1".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpAddr,
    prefix: u8,
}

impl std::str::FromStr for TrustedSubnet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("{s:?} is not in CIDR form"))?;
        let network: IpAddr = addr.parse().map_err(|e| format!("{s:?}: {e}"))?;
        let prefix: u8 = prefix.parse().map_err(|e| format!("{s:?}: {e}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(format!("{s:?}: prefix longer than {max}"));
        }
        Ok(Self { network, prefix })
    }
}

impl TrustedSubnet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }

    /// Parse a header value and test membership. Missing or unparsable
    /// addresses are never trusted.
    pub fn allows(&self, real_ip: Option<&str>) -> bool {
        real_ip
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .is_some_and(|ip| self.contains(&ip))
    }
}

/// Rejects requests whose `X-Real-IP` is outside the trusted subnet with
/// 403. Passes everything through when no subnet is configured.
pub async fn trusted_subnet_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(subnet) = &state.trusted_subnet else {
        return next.run(req).await;
    };

    let real_ip = req
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok());
    if subnet.allows(real_ip) {
        return next.run(req).await;
    }

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();
    tracing::warn!(
        trace_id = %trace_id,
        real_ip = real_ip.unwrap_or("-"),
        "Request rejected: address outside trusted subnet"
    );
    error_response(StatusCode::FORBIDDEN, &trace_id, "untrusted_address")
}

/// Adds `HashSHA256` over the response body when the server has a key.
pub async fn sign_response_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    let Some(signer) = state.pipeline.signer() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer response for signing");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if let Ok(val) = HeaderValue::from_str(&signer.sign(&bytes)) {
        parts.headers.insert(HASH_HEADER_NAME.clone(), val);
    }
    Response::from_parts(parts, Body::from(bytes))
}
