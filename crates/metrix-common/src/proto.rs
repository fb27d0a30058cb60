//! gRPC messages for the `metrix.Metrics` service.
//!
//! The payload travels as opaque bytes so the gRPC path runs the exact same
//! verify, decrypt, parse and collect pipeline as the HTTP `/update/` route.

#![allow(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::default_trait_access)]

/// Metadata key carrying the hex HMAC of `MetricPayload::body`.
pub const HASH_METADATA_KEY: &str = "hashsha256";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricPayload {
    /// JSON-encoded `MetricRequest`, RSA-encrypted when the agent has a public key.
    #[prost(bytes = "vec", tag = "1")]
    pub body: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SaveMetricResponse {
    /// JSON echo of the stored metric after the merge.
    #[prost(bytes = "vec", tag = "1")]
    pub result_json: ::prost::alloc::vec::Vec<u8>,
}

include!(concat!(env!("OUT_DIR"), "/metrix.Metrics.rs"));
