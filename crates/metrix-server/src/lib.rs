//! The metrix server: ingest over HTTP and gRPC into one
//! [`MetricStore`](metrix_common::MetricStore), with optional snapshot
//! persistence.
//!
//! Both transports funnel into [`ingest::IngestPipeline`], which verifies
//! the integrity header, decrypts, parses and merges.

pub mod api;
pub mod app;
pub mod config;
pub mod grpc;
pub mod ingest;
pub mod logging;
pub mod middleware;
pub mod state;
