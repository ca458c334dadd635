//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_exchanges_total` (counter): exchanges dispatched, by `kind`
//! - `gateway_exchange_errors_total` (counter): reported failures, by `phase`
//! - `gateway_active_exchanges` (gauge): exchanges currently being driven
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter is optional and owns its own listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const EXCHANGES_TOTAL: &str = "gateway_exchanges_total";
pub const EXCHANGE_ERRORS_TOTAL: &str = "gateway_exchange_errors_total";
pub const ACTIVE_EXCHANGES: &str = "gateway_active_exchanges";

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            metrics::describe_counter!(EXCHANGES_TOTAL, "Exchanges dispatched by scope kind");
            metrics::describe_counter!(EXCHANGE_ERRORS_TOTAL, "Exchange failures by phase");
            metrics::describe_gauge!(ACTIVE_EXCHANGES, "Exchanges currently being driven");
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

pub fn record_exchange(kind: &str) {
    metrics::counter!(EXCHANGES_TOTAL, "kind" => kind.to_owned()).increment(1);
}

pub fn record_exchange_error(phase: &'static str) {
    metrics::counter!(EXCHANGE_ERRORS_TOTAL, "phase" => phase).increment(1);
}

/// Tracks one exchange in the active gauge for as long as it lives.
pub struct ActiveExchange(());

impl ActiveExchange {
    pub fn start() -> Self {
        metrics::gauge!(ACTIVE_EXCHANGES).increment(1.0);
        Self(())
    }
}

impl Drop for ActiveExchange {
    fn drop(&mut self) {
        metrics::gauge!(ACTIVE_EXCHANGES).decrement(1.0);
    }
}
