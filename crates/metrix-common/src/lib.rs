//! Shared building blocks of the metrix pipeline.
//!
//! [`store::MetricStore`] is the aggregation core used on both sides of the
//! wire: the agent samples into one, the server ingests into another. The
//! remaining modules carry what both processes must agree on: the metric
//! model and wire shape, the integrity header, payload encryption and the
//! bounded retry policy.

pub mod crypto;
pub mod error;
pub mod proto;
pub mod retry;
pub mod signing;
pub mod store;
pub mod types;

pub use error::MetricError;
pub use store::MetricStore;
pub use types::{Metric, MetricKind, MetricRequest, MetricValue};
