//! The metrix agent: sampling, rate-limited report sweeps and delivery.
//!
//! The binary wires these together around one shared
//! [`MetricStore`](metrix_common::MetricStore): the
//! [`Sampler`](metrix_collector::Sampler) writes into it, the
//! [`scheduler::ReportScheduler`] periodically snapshots it and fans out one
//! [`delivery::DeliveryClient::send`] per metric.

pub mod config;
pub mod delivery;
pub mod gate;
pub mod scheduler;
pub mod transport;
